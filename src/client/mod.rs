//! Admin-console side of the CMS: UI-agnostic controllers for the article and
//! category workflows, talking to the server through [`CmsApi`].
//!
//! Controllers never render or navigate themselves. Navigation is expressed as
//! a returned [`Route`], toasts as [`Notice`]s handed to a [`Notifier`].

pub mod api;
pub mod confirm;
pub mod draft;
pub mod form;
pub mod http;
pub mod listing;
pub mod preview;
pub mod reader;
pub mod session;
pub mod store;

use std::sync::{Mutex, PoisonError};

use crate::models::Id;

pub use api::{CmsApi, LocalFile, PageQuery};
pub use http::HttpApi;

pub type ClientResult<T> = Result<T, ClientError>;

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error("wrong username or password")]
    Unauthorized(Option<String>),
    #[error("not allowed")]
    Forbidden(Option<String>),
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict(Option<String>),
    #[error("server returned {status}")]
    Server { status: u16, message: Option<String> },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("local storage: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 => ClientError::Unauthorized(message),
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound,
            409 => ClientError::Conflict(message),
            _ => ClientError::Server { status, message },
        }
    }

    /// Text the server attached to the failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Unauthorized(m) | ClientError::Forbidden(m) | ClientError::Conflict(m) => m.as_deref(),
            ClientError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// What a toast should say: the server's message, else a generic line.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Unauthorized(_) => "Wrong username or password.".to_string(),
            ClientError::NotFound => "The requested item no longer exists.".to_string(),
            other => other.server_message().unwrap_or(GENERIC_FAILURE).to_string(),
        }
    }
}

/// Screens a controller can send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    PublicArticles,
    ArticleList,
    ArticleCreate,
    ArticleEdit(Id),
    ArticlePreview,
    CategoryList,
    ArticleDetail(Id),
    Profile,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn success(title: &str, description: &str) -> Self {
        Self { level: NoticeLevel::Success, title: title.into(), description: Some(description.into()) }
    }

    pub fn error(title: &str, description: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, title: title.into(), description: Some(description.into()) }
    }
}

/// Sink for user-visible toasts.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log; for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(title = %notice.title, description = ?notice.description, "notice"),
            NoticeLevel::Error => tracing::warn!(title = %notice.title, description = ?notice.description, "notice"),
        }
    }
}

/// Keeps every notice in order; front-ends drain it each frame.
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).push(notice);
    }
}
