#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blogdesk::auth::{hash_password, JwtKeys, Role};
use blogdesk::client::{ClientError, ClientResult, CmsApi, LocalFile, PageQuery};
use blogdesk::models::{Article, Category, CategorySummary, Id, NewArticle, NewUser, Paginated, Profile, UpdateArticle};
#[cfg(feature = "inmem-store")]
use blogdesk::repo::{inmem::InMemRepo, UserRepo};
use blogdesk::storage::FsImageStore;
use blogdesk::AppState;
use chrono::Utc;

pub const TEST_SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn keys() -> JwtKeys {
    JwtKeys::new(TEST_SECRET.as_bytes())
}

pub fn admin_token() -> String {
    keys().issue(1, "admin", vec![Role::Admin]).unwrap()
}

pub fn user_token() -> String {
    keys().issue(2, "reader", vec![Role::User]).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

/// Server state over an ephemeral repo and a temp upload dir.
#[cfg(feature = "inmem-store")]
pub fn state_with(repo: InMemRepo, uploads: &std::path::Path) -> AppState {
    AppState {
        repo: Arc::new(repo),
        image_store: Arc::new(FsImageStore::new(uploads.to_path_buf())),
        jwt: keys(),
        login_limiter: None,
    }
}

#[cfg(feature = "inmem-store")]
pub async fn seed_user(repo: &InMemRepo, username: &str, password: &str, role: Role) {
    repo.create_user(NewUser { username: username.into(), password_hash: hash_password(password).unwrap(), role })
        .await
        .unwrap();
}

// Minimal 1x1 PNG (transparent)
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

// Multipart body with a single `file` field
pub fn build_multipart(file_name: &str, bytes: &[u8], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let disp = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    );
    body.extend_from_slice(disp.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// ---------------- Mock CmsApi (client tests) ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { username: String, password: String },
    Profile(String),
    Register(String, Role),
    ListArticles(PageQuery),
    GetArticle(Id),
    CreateArticle { title: String, thumbnail: String },
    UpdateArticle { id: Id, image_url: Option<String> },
    DeleteArticle(Id),
    ListCategories(PageQuery),
    CreateCategory(String),
    UpdateCategory(Id, String),
    DeleteCategory(Id),
    Upload(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    next_id: Id,
    articles: Vec<Article>,
    categories: Vec<Category>,
    users: Vec<(String, String, Role)>,
    failures: HashMap<&'static str, (u16, Option<String>)>,
    delays: HashMap<String, Duration>,
}

/// In-memory stand-in for the server that records every call in order.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        let api = MockApi::default();
        api.state.lock().unwrap().next_id = 100;
        Arc::new(api)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn list_calls(&self) -> Vec<PageQuery> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ListArticles(q) | Call::ListCategories(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    /// Makes every later call of `op` fail with `status`.
    pub fn fail_on(&self, op: &'static str, status: u16, message: Option<&str>) {
        self.state.lock().unwrap().failures.insert(op, (status, message.map(str::to_string)));
    }

    pub fn recover(&self, op: &'static str) {
        self.state.lock().unwrap().failures.remove(op);
    }

    /// Article listings searching for `search` answer after `delay`.
    pub fn delay_search(&self, search: &str, delay: Duration) {
        self.state.lock().unwrap().delays.insert(search.to_string(), delay);
    }

    pub fn add_user(&self, username: &str, password: &str, role: Role) {
        self.state.lock().unwrap().users.push((username.into(), password.into(), role));
    }

    pub fn add_category(&self, id: Id, name: &str) -> Category {
        let c = Category { id, name: name.into(), created_at: Utc::now() };
        self.state.lock().unwrap().categories.push(c.clone());
        c
    }

    pub fn add_article(&self, id: Id, title: &str, category_id: Id) -> Article {
        let mut s = self.state.lock().unwrap();
        let category = s
            .categories
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| CategorySummary { id: c.id, name: c.name.clone() });
        let a = Article {
            id,
            title: title.into(),
            content: format!("<p>{title}</p>"),
            category_id,
            category,
            thumbnail: Some(format!("/uploads/{id:064x}")),
            created_by: "admin".into(),
            created_at: Utc::now(),
        };
        s.articles.push(a.clone());
        a
    }

    pub fn articles(&self) -> Vec<Article> {
        self.state.lock().unwrap().articles.clone()
    }

    fn record(&self, op: &'static str, call: Call) -> ClientResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(call);
        match s.failures.get(op) {
            Some((status, message)) => Err(ClientError::from_status(*status, message.clone())),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> Id {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        s.next_id
    }
}

fn page<T: Clone>(rows: Vec<T>, query: &PageQuery) -> Paginated<T> {
    let total = rows.len() as u64;
    let skip = ((query.page.max(1) - 1) * query.limit) as usize;
    let data = rows.into_iter().skip(skip).take(query.limit as usize).collect();
    Paginated { data, total, page: query.page, limit: query.limit }
}

fn matches_category(a: &Article, filter: &str) -> bool {
    match filter.parse::<Id>() {
        Ok(id) => a.category_id == id,
        Err(_) => a.category.as_ref().is_some_and(|c| c.name.eq_ignore_ascii_case(filter)),
    }
}

#[async_trait]
impl CmsApi for MockApi {
    async fn login(&self, username: &str, password: &str) -> ClientResult<String> {
        self.record("login", Call::Login { username: username.into(), password: password.into() })?;
        let s = self.state.lock().unwrap();
        s.users
            .iter()
            .find(|(u, p, _)| u == username && p == password)
            .map(|(u, _, _)| format!("token-{u}"))
            .ok_or(ClientError::Unauthorized(Some("invalid credentials".into())))
    }

    async fn profile(&self, token: &str) -> ClientResult<Profile> {
        self.record("profile", Call::Profile(token.into()))?;
        let s = self.state.lock().unwrap();
        s.users
            .iter()
            .enumerate()
            .find(|(_, (u, _, _))| format!("token-{u}") == token)
            .map(|(i, (u, _, role))| Profile { id: i as Id + 1, username: u.clone(), role: *role })
            .ok_or(ClientError::Unauthorized(None))
    }

    async fn register(&self, username: &str, password: &str, role: Role) -> ClientResult<Profile> {
        self.record("register", Call::Register(username.into(), role))?;
        let mut s = self.state.lock().unwrap();
        if s.users.iter().any(|(u, _, _)| u == username) {
            return Err(ClientError::Conflict(Some(format!("username '{username}' is taken"))));
        }
        s.users.push((username.into(), password.into(), role));
        Ok(Profile { id: s.users.len() as Id, username: username.into(), role })
    }

    async fn list_articles(&self, query: &PageQuery) -> ClientResult<Paginated<Article>> {
        self.record("list_articles", Call::ListArticles(query.clone()))?;
        let delay = self.state.lock().unwrap().delays.get(&query.search).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let s = self.state.lock().unwrap();
        let needle = query.search.to_lowercase();
        let rows: Vec<Article> = s
            .articles
            .iter()
            .filter(|a| a.title.to_lowercase().contains(&needle))
            .filter(|a| query.category.as_deref().map_or(true, |c| matches_category(a, c)))
            .cloned()
            .collect();
        Ok(page(rows, query))
    }

    async fn get_article(&self, id: Id) -> ClientResult<Article> {
        self.record("get_article", Call::GetArticle(id))?;
        self.state.lock().unwrap().articles.iter().find(|a| a.id == id).cloned().ok_or(ClientError::NotFound)
    }

    async fn create_article(&self, new: &NewArticle) -> ClientResult<Article> {
        self.record("create_article", Call::CreateArticle { title: new.title.clone(), thumbnail: new.thumbnail.clone() })?;
        let id = self.next_id();
        let mut created = self.add_article(id, &new.title, new.category_id);
        created.content = new.content.clone();
        created.thumbnail = Some(new.thumbnail.clone());
        let mut s = self.state.lock().unwrap();
        if let Some(stored) = s.articles.iter_mut().find(|a| a.id == id) {
            *stored = created.clone();
        }
        Ok(created)
    }

    async fn update_article(&self, id: Id, update: &UpdateArticle) -> ClientResult<Article> {
        self.record("update_article", Call::UpdateArticle { id, image_url: update.image_url.clone() })?;
        let mut s = self.state.lock().unwrap();
        let a = s.articles.iter_mut().find(|a| a.id == id).ok_or(ClientError::NotFound)?;
        a.title = update.title.clone();
        a.content = update.content.clone();
        a.category_id = update.category_id;
        if let Some(url) = &update.image_url {
            a.thumbnail = Some(url.clone());
        }
        Ok(a.clone())
    }

    async fn delete_article(&self, id: Id) -> ClientResult<()> {
        self.record("delete_article", Call::DeleteArticle(id))?;
        let mut s = self.state.lock().unwrap();
        let before = s.articles.len();
        s.articles.retain(|a| a.id != id);
        if s.articles.len() == before {
            return Err(ClientError::NotFound);
        }
        Ok(())
    }

    async fn list_categories(&self, query: &PageQuery) -> ClientResult<Paginated<Category>> {
        self.record("list_categories", Call::ListCategories(query.clone()))?;
        let s = self.state.lock().unwrap();
        let needle = query.search.to_lowercase();
        let rows: Vec<Category> =
            s.categories.iter().filter(|c| c.name.to_lowercase().contains(&needle)).cloned().collect();
        Ok(page(rows, query))
    }

    async fn create_category(&self, name: &str) -> ClientResult<Category> {
        self.record("create_category", Call::CreateCategory(name.into()))?;
        let id = self.next_id();
        Ok(self.add_category(id, name))
    }

    async fn update_category(&self, id: Id, name: &str) -> ClientResult<Category> {
        self.record("update_category", Call::UpdateCategory(id, name.into()))?;
        let mut s = self.state.lock().unwrap();
        let c = s.categories.iter_mut().find(|c| c.id == id).ok_or(ClientError::NotFound)?;
        c.name = name.into();
        Ok(c.clone())
    }

    async fn delete_category(&self, id: Id) -> ClientResult<()> {
        self.record("delete_category", Call::DeleteCategory(id))?;
        let mut s = self.state.lock().unwrap();
        if s.articles.iter().any(|a| a.category_id == id) {
            return Err(ClientError::Conflict(Some("category is still used by 1 article(s)".into())));
        }
        s.categories.retain(|c| c.id != id);
        Ok(())
    }

    async fn upload(&self, file: &LocalFile) -> ClientResult<String> {
        self.record("upload", Call::Upload(file.file_name.clone()))?;
        Ok(format!("/uploads/{:064x}", file.bytes.len()))
    }
}
