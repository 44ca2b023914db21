use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict: {0}")] Conflict(String),
    #[error("invalid: {0}")] Invalid(String),
    #[error("still referenced by {0} row(s)")] InUse(u64),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self, filter: &ListFilter) -> RepoResult<(Vec<Category>, u64)>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn update_category(&self, id: Id, upd: NewCategory) -> RepoResult<Category>;
    /// Refuses with [`RepoError::InUse`] while articles reference the category.
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ArticleRepo: Send + Sync {
    async fn list_articles(&self, filter: &ListFilter) -> RepoResult<(Vec<Article>, u64)>;
    async fn get_article(&self, id: Id) -> RepoResult<Article>;
    async fn create_article(&self, new: NewArticle, author: &str) -> RepoResult<Article>;
    /// A `None` image keeps the stored thumbnail.
    async fn update_article(&self, id: Id, upd: UpdateArticle) -> RepoResult<Article>;
    async fn delete_article(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
}

pub trait Repo: CategoryRepo + ArticleRepo + UserRepo {}

impl<T> Repo for T where T: CategoryRepo + ArticleRepo + UserRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        categories: HashMap<Id, Category>,
        articles: HashMap<Id, Article>,
        users: HashMap<Id, User>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn name_taken(&self, name: &str, except: Option<Id>) -> bool {
            self.categories
                .values()
                .any(|c| c.name.eq_ignore_ascii_case(name) && Some(c.id) != except)
        }

        /// Attach the current category label; renames show up on the next read.
        fn hydrate(&self, article: &Article) -> Article {
            let mut a = article.clone();
            a.category = self
                .categories
                .get(&a.category_id)
                .map(|c| CategorySummary { id: c.id, name: c.name.clone() });
            a
        }

        fn category_matches(&self, article: &Article, wanted: &str) -> bool {
            if let Ok(id) = wanted.parse::<Id>() {
                return article.category_id == id;
            }
            self.categories
                .get(&article.category_id)
                .map(|c| c.name.eq_ignore_ascii_case(wanted))
                .unwrap_or(false)
        }
    }

    fn contains_ci(haystack: &str, needle: &str) -> bool {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }

    fn window<T>(rows: Vec<T>, filter: &ListFilter) -> (Vec<T>, u64) {
        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit as usize)
            .collect();
        (rows, total)
    }

    /// Map-backed repository; optionally mirrors every mutation to a JSON snapshot.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Nothing is written to disk.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        /// Load `<data_dir>/state.json` if present and persist back to it. An
        /// existing snapshot that cannot be read or parsed is an error; the
        /// repo never starts empty over it.
        pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
            let path = data_dir.join("state.json");
            let state = Self::load_state_from(&path)?;
            Ok(Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            })
        }

        fn load_state_from(path: &Path) -> anyhow::Result<State> {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::info!("no snapshot at '{}'; starting empty", path.display());
                    return Ok(State::default());
                }
                Err(e) => return Err(anyhow::anyhow!("failed to read snapshot '{}': {e}", path.display())),
            };
            let state = serde_json::from_slice::<State>(&bytes)
                .map_err(|e| anyhow::anyhow!("snapshot '{}' is corrupt: {e}", path.display()))?;
            log::info!("loaded snapshot '{}'", path.display());
            Ok(state)
        }

        fn read(&self) -> RwLockReadGuard<'_, State> {
            self.state.read().unwrap_or_else(PoisonError::into_inner)
        }

        fn write(&self) -> RwLockWriteGuard<'_, State> {
            self.state.write().unwrap_or_else(PoisonError::into_inner)
        }

        /// Callers hold the write guard, so snapshots land in mutation order.
        fn persist(&self, state: &State) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            let bytes = match serde_json::to_vec_pretty(state) {
                Ok(b) => b,
                Err(e) => {
                    log::error!("failed to serialise snapshot: {e}");
                    return;
                }
            };
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let tmp = path.with_extension("json.tmp");
            let written = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path.as_ref()));
            if let Err(e) = written {
                log::error!("failed to write snapshot '{}': {e}", path.display());
            }
        }
    }

    #[async_trait]
    impl CategoryRepo for InMemRepo {
        async fn list_categories(&self, filter: &ListFilter) -> RepoResult<(Vec<Category>, u64)> {
            let s = self.read();
            let mut rows: Vec<Category> = s
                .categories
                .values()
                .filter(|c| filter.search.as_deref().map_or(true, |q| contains_ci(&c.name, q)))
                .cloned()
                .collect();
            rows.sort_by_key(|c| c.id);
            Ok(window(rows, filter))
        }
        async fn get_category(&self, id: Id) -> RepoResult<Category> {
            self.read().categories.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            let mut s = self.write();
            if s.name_taken(&new.name, None) {
                return Err(RepoError::Conflict(format!("category '{}' already exists", new.name)));
            }
            let id = s.next_id();
            let category = Category { id, name: new.name, created_at: Utc::now() };
            s.categories.insert(id, category.clone());
            self.persist(&s);
            Ok(category)
        }
        async fn update_category(&self, id: Id, upd: NewCategory) -> RepoResult<Category> {
            let mut s = self.write();
            // uniqueness check before the mutable borrow
            if s.name_taken(&upd.name, Some(id)) {
                return Err(RepoError::Conflict(format!("category '{}' already exists", upd.name)));
            }
            let category = s.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
            category.name = upd.name;
            let updated = category.clone();
            self.persist(&s);
            Ok(updated)
        }
        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write();
            if !s.categories.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            let refs = s.articles.values().filter(|a| a.category_id == id).count() as u64;
            if refs > 0 {
                return Err(RepoError::InUse(refs));
            }
            s.categories.remove(&id);
            self.persist(&s);
            Ok(())
        }
    }

    #[async_trait]
    impl ArticleRepo for InMemRepo {
        async fn list_articles(&self, filter: &ListFilter) -> RepoResult<(Vec<Article>, u64)> {
            let s = self.read();
            let mut rows: Vec<Article> = s
                .articles
                .values()
                .filter(|a| filter.search.as_deref().map_or(true, |q| contains_ci(&a.title, q)))
                .filter(|a| filter.category.as_deref().map_or(true, |c| s.category_matches(a, c)))
                .map(|a| s.hydrate(a))
                .collect();
            rows.sort_by_key(|a| a.id); // creation order
            Ok(window(rows, filter))
        }
        async fn get_article(&self, id: Id) -> RepoResult<Article> {
            let s = self.read();
            s.articles.get(&id).map(|a| s.hydrate(a)).ok_or(RepoError::NotFound)
        }
        async fn create_article(&self, new: NewArticle, author: &str) -> RepoResult<Article> {
            let mut s = self.write();
            if !s.categories.contains_key(&new.category_id) {
                return Err(RepoError::Invalid(format!("unknown category {}", new.category_id)));
            }
            let id = s.next_id();
            let article = Article {
                id,
                title: new.title,
                content: new.content,
                category_id: new.category_id,
                category: None,
                thumbnail: Some(new.thumbnail),
                created_by: author.to_string(),
                created_at: Utc::now(),
            };
            s.articles.insert(id, article.clone());
            let created = s.hydrate(&article);
            self.persist(&s);
            Ok(created)
        }
        async fn update_article(&self, id: Id, upd: UpdateArticle) -> RepoResult<Article> {
            let mut s = self.write();
            if !s.categories.contains_key(&upd.category_id) {
                return Err(RepoError::Invalid(format!("unknown category {}", upd.category_id)));
            }
            let article = s.articles.get_mut(&id).ok_or(RepoError::NotFound)?;
            article.title = upd.title;
            article.content = upd.content;
            article.category_id = upd.category_id;
            if let Some(url) = upd.image_url {
                article.thumbnail = Some(url);
            }
            let stored = article.clone();
            let updated = s.hydrate(&stored);
            self.persist(&s);
            Ok(updated)
        }
        async fn delete_article(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write();
            if s.articles.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            self.persist(&s);
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write();
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict(format!("username '{}' is taken", new.username)));
            }
            let id = s.next_id();
            let user = User {
                id,
                username: new.username,
                password_hash: new.password_hash,
                role: new.role,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            self.persist(&s);
            Ok(user)
        }
        async fn find_user(&self, username: &str) -> RepoResult<Option<User>> {
            Ok(self.read().users.values().find(|u| u.username == username).cloned())
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            self.read().users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::auth::Role;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> anyhow::Result<()> {
            sqlx::migrate!("./migrations").run(&self.pool).await?;
            Ok(())
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => RepoError::Conflict(db.message().to_string()),
                Some("23503") => RepoError::Invalid(db.message().to_string()),
                _ => RepoError::Internal(e.to_string()),
            },
            _ => RepoError::Internal(e.to_string()),
        }
    }

    fn search_pattern(filter: &ListFilter) -> Option<String> {
        filter.search.as_ref().map(|q| format!("%{}%", q.replace('%', "\\%").replace('_', "\\_")))
    }

    #[derive(sqlx::FromRow)]
    struct ArticleRow {
        id: Id,
        title: String,
        content: String,
        category_id: Id,
        category_name: Option<String>,
        thumbnail: Option<String>,
        created_by: String,
        created_at: DateTime<Utc>,
    }

    impl From<ArticleRow> for Article {
        fn from(r: ArticleRow) -> Self {
            Article {
                category: r.category_name.map(|name| CategorySummary { id: r.category_id, name }),
                id: r.id,
                title: r.title,
                content: r.content,
                category_id: r.category_id,
                thumbnail: r.thumbnail,
                created_by: r.created_by,
                created_at: r.created_at,
            }
        }
    }

    const ARTICLE_SELECT: &str = r#"
        SELECT a.id, a.title, a.content, a.category_id, c.name AS category_name,
               a.thumbnail, a.created_by, a.created_at
        FROM articles a
        LEFT JOIN categories c ON c.id = a.category_id
    "#;

    const ARTICLE_FILTER: &str = r#"
        WHERE ($1::text IS NULL OR a.title ILIKE $1)
          AND ($2::bigint IS NULL OR a.category_id = $2)
          AND ($3::text IS NULL OR lower(c.name) = lower($3))
    "#;

    #[derive(sqlx::FromRow)]
    struct UserRow {
        id: Id,
        username: String,
        password_hash: String,
        role: String,
        created_at: DateTime<Utc>,
    }

    impl From<UserRow> for User {
        fn from(r: UserRow) -> Self {
            User {
                id: r.id,
                username: r.username,
                password_hash: r.password_hash,
                role: Role::parse(&r.role).unwrap_or(Role::User),
                created_at: r.created_at,
            }
        }
    }

    #[async_trait]
    impl CategoryRepo for PgRepo {
        async fn list_categories(&self, filter: &ListFilter) -> RepoResult<(Vec<Category>, u64)> {
            let pattern = search_pattern(filter);
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE ($1::text IS NULL OR name ILIKE $1)")
                .bind(pattern.as_deref())
                .fetch_one(&self.pool).await.map_err(map_err)?;
            let rows = sqlx::query_as::<_, Category>(
                "SELECT id, name, created_at FROM categories WHERE ($1::text IS NULL OR name ILIKE $1) ORDER BY id LIMIT $2 OFFSET $3",
            )
            .bind(pattern.as_deref())
            .bind(filter.limit as i64)
            .bind(filter.offset() as i64)
            .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok((rows, total as u64))
        }
        async fn get_category(&self, id: Id) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>("INSERT INTO categories (name) VALUES ($1) RETURNING id, name, created_at")
                .bind(&new.name)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn update_category(&self, id: Id, upd: NewCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>("UPDATE categories SET name = $2 WHERE id = $1 RETURNING id, name, created_at")
                .bind(id)
                .bind(&upd.name)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let refs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE category_id = $1")
                .bind(id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            if refs > 0 {
                return Err(RepoError::InUse(refs as u64));
            }
            let done = sqlx::query("DELETE FROM categories WHERE id = $1")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(map_err)
        }
    }

    #[async_trait]
    impl ArticleRepo for PgRepo {
        async fn list_articles(&self, filter: &ListFilter) -> RepoResult<(Vec<Article>, u64)> {
            let pattern = search_pattern(filter);
            let by_id = filter.category.as_deref().and_then(|c| c.parse::<Id>().ok());
            let by_name = filter.category.as_deref().filter(|_| by_id.is_none());
            let count_sql = format!("SELECT COUNT(*) FROM articles a LEFT JOIN categories c ON c.id = a.category_id {ARTICLE_FILTER}");
            let total: i64 = sqlx::query_scalar(&count_sql)
                .bind(pattern.as_deref())
                .bind(by_id)
                .bind(by_name)
                .fetch_one(&self.pool).await.map_err(map_err)?;
            let list_sql = format!("{ARTICLE_SELECT} {ARTICLE_FILTER} ORDER BY a.id LIMIT $4 OFFSET $5");
            let rows = sqlx::query_as::<_, ArticleRow>(&list_sql)
                .bind(pattern.as_deref())
                .bind(by_id)
                .bind(by_name)
                .bind(filter.limit as i64)
                .bind(filter.offset() as i64)
                .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok((rows.into_iter().map(Article::from).collect(), total as u64))
        }
        async fn get_article(&self, id: Id) -> RepoResult<Article> {
            let sql = format!("{ARTICLE_SELECT} WHERE a.id = $1");
            let row = sqlx::query_as::<_, ArticleRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(row.into())
        }
        async fn create_article(&self, new: NewArticle, author: &str) -> RepoResult<Article> {
            let id: Id = sqlx::query_scalar(
                "INSERT INTO articles (title, content, category_id, thumbnail, created_by) VALUES ($1,$2,$3,$4,$5) RETURNING id",
            )
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.category_id)
            .bind(&new.thumbnail)
            .bind(author)
            .fetch_one(&self.pool).await.map_err(map_err)?;
            self.get_article(id).await
        }
        async fn update_article(&self, id: Id, upd: UpdateArticle) -> RepoResult<Article> {
            let done = sqlx::query(
                "UPDATE articles SET title = $2, content = $3, category_id = $4, thumbnail = COALESCE($5, thumbnail) WHERE id = $1",
            )
            .bind(id)
            .bind(&upd.title)
            .bind(&upd.content)
            .bind(upd.category_id)
            .bind(upd.image_url.as_deref())
            .execute(&self.pool).await.map_err(map_err)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            self.get_article(id).await
        }
        async fn delete_article(&self, id: Id) -> RepoResult<()> {
            let done = sqlx::query("DELETE FROM articles WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (username, password_hash, role) VALUES ($1,$2,$3) RETURNING id, username, password_hash, role, created_at",
            )
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(row.into())
        }
        async fn find_user(&self, username: &str) -> RepoResult<Option<User>> {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, username, password_hash, role, created_at FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&self.pool).await.map_err(map_err)?;
            Ok(row.map(User::from))
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, username, password_hash, role, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(row.into())
        }
    }
}
