use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::api::{CmsApi, LocalFile, PageQuery};
use super::session::Session;
use super::{ClientError, ClientResult};
use crate::auth::Role;
use crate::models::{Article, Category, Id, NewArticle, NewCategory, Paginated, Profile, UpdateArticle};

/// [`CmsApi`] over HTTP. The bearer token comes from the session it was built
/// with; there is no ambient token lookup.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    session: Option<Session>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Registration<'a> {
    username: &'a str,
    password: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Deserialize)]
struct UploadBody {
    url: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, session: None })
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(s) => req.bearer_auth(&s.token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        let resp = check(self.authed(req).send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> ClientResult<()> {
        check(self.authed(req).send().await?).await?;
        Ok(())
    }
}

/// Turns a non-2xx response into the matching [`ClientError`].
async fn check(resp: Response) -> ClientResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: ErrorBody = resp.json().await.unwrap_or_default();
    let message = body.message.or(body.error);
    tracing::debug!(status = status.as_u16(), ?message, "request failed");
    Err(ClientError::from_status(status.as_u16(), message))
}

#[async_trait]
impl CmsApi for HttpApi {
    async fn login(&self, username: &str, password: &str) -> ClientResult<String> {
        let req = self.client.post(self.url("/api/auth/login")).json(&Credentials { username, password });
        // login never carries a stale session token
        let resp = check(req.send().await?).await?;
        Ok(resp.json::<TokenBody>().await?.token)
    }

    async fn profile(&self, token: &str) -> ClientResult<Profile> {
        let resp = check(self.client.get(self.url("/api/auth/profile")).bearer_auth(token).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn register(&self, username: &str, password: &str, role: Role) -> ClientResult<Profile> {
        let body = Registration { username, password, role: role.as_str() };
        let resp = check(self.client.post(self.url("/api/auth/register")).json(&body).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn list_articles(&self, query: &PageQuery) -> ClientResult<Paginated<Article>> {
        self.send(self.client.get(self.url("/api/articles")).query(query)).await
    }

    async fn get_article(&self, id: Id) -> ClientResult<Article> {
        self.send(self.client.get(self.url(&format!("/api/articles/{id}")))).await
    }

    async fn create_article(&self, new: &NewArticle) -> ClientResult<Article> {
        self.send(self.client.post(self.url("/api/articles")).json(new)).await
    }

    async fn update_article(&self, id: Id, update: &UpdateArticle) -> ClientResult<Article> {
        self.send(self.client.put(self.url(&format!("/api/articles/{id}"))).json(update)).await
    }

    async fn delete_article(&self, id: Id) -> ClientResult<()> {
        self.send_empty(self.client.delete(self.url(&format!("/api/articles/{id}")))).await
    }

    async fn list_categories(&self, query: &PageQuery) -> ClientResult<Paginated<Category>> {
        self.send(self.client.get(self.url("/api/categories")).query(query)).await
    }

    async fn create_category(&self, name: &str) -> ClientResult<Category> {
        let body = NewCategory { name: name.to_string() };
        self.send(self.client.post(self.url("/api/categories")).json(&body)).await
    }

    async fn update_category(&self, id: Id, name: &str) -> ClientResult<Category> {
        let body = NewCategory { name: name.to_string() };
        self.send(self.client.put(self.url(&format!("/api/categories/{id}"))).json(&body)).await
    }

    async fn delete_category(&self, id: Id) -> ClientResult<()> {
        self.send_empty(self.client.delete(self.url(&format!("/api/categories/{id}")))).await
    }

    async fn upload(&self, file: &LocalFile) -> ClientResult<String> {
        let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        let form = Form::new().part("file", part);
        let body: UploadBody = self.send(self.client.post(self.url("/api/upload")).multipart(form)).await?;
        Ok(body.url)
    }
}
