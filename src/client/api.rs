use async_trait::async_trait;
use serde::Serialize;

use super::ClientResult;
use crate::auth::Role;
use crate::models::{Article, Category, Id, NewArticle, Paginated, Profile, UpdateArticle};

/// Query string of a paginated listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageQuery {
    pub search: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub page: u32,
    pub limit: u32,
}

/// A file picked on the client, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    preview_ref: String,
}

impl LocalFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), bytes, preview_ref: format!("blob:{}", uuid::Uuid::new_v4()) }
    }

    /// Transient reference for showing the picked image before upload.
    pub fn preview_ref(&self) -> &str {
        &self.preview_ref
    }
}

/// Everything the admin console asks of the server.
#[async_trait]
pub trait CmsApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> ClientResult<String>;
    /// Profile for an explicit token; used before a session exists.
    async fn profile(&self, token: &str) -> ClientResult<Profile>;
    async fn register(&self, username: &str, password: &str, role: Role) -> ClientResult<Profile>;

    async fn list_articles(&self, query: &PageQuery) -> ClientResult<Paginated<Article>>;
    async fn get_article(&self, id: Id) -> ClientResult<Article>;
    async fn create_article(&self, new: &NewArticle) -> ClientResult<Article>;
    async fn update_article(&self, id: Id, update: &UpdateArticle) -> ClientResult<Article>;
    async fn delete_article(&self, id: Id) -> ClientResult<()>;

    async fn list_categories(&self, query: &PageQuery) -> ClientResult<Paginated<Category>>;
    async fn create_category(&self, name: &str) -> ClientResult<Category>;
    async fn update_category(&self, id: Id, name: &str) -> ClientResult<Category>;
    async fn delete_category(&self, id: Id) -> ClientResult<()>;

    /// Uploads an image and returns the URL the server stored it under.
    async fn upload(&self, file: &LocalFile) -> ClientResult<String>;
}
