use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::api::{CmsApi, PageQuery};
use super::store::{load_json, save_json, LocalStore, PREVIEW_KEY};
use super::{ClientResult, Route};
use crate::models::{Article, Id};

/// Shown when neither a picked nor a stored thumbnail exists.
pub const PLACEHOLDER_IMAGE: &str = "/assets/placeholder-thumbnail.png";
pub const RELATED_LIMIT: usize = 3;

/// Read-only rendering of the form as it would be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewArticle {
    pub title: String,
    pub content: String,
    pub image: String,
    pub category_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

pub fn stage(store: &dyn LocalStore, preview: &PreviewArticle) -> ClientResult<()> {
    save_json(store, PREVIEW_KEY, preview)
}

/// The staged preview, or the screen to fall back to when nothing is staged.
pub fn open(store: &dyn LocalStore) -> Result<PreviewArticle, Route> {
    load_json(store, PREVIEW_KEY).ok_or(Route::ArticleCreate)
}

pub fn discard(store: &dyn LocalStore) {
    if let Err(e) = store.remove(PREVIEW_KEY) {
        tracing::warn!(error = %e, "failed to discard preview");
    }
}

/// Up to three newest-listed articles other than the one being previewed.
/// Lookup failures just yield an empty sidebar.
pub async fn related(api: &dyn CmsApi, preview: &PreviewArticle) -> Vec<Article> {
    let query = PageQuery { search: String::new(), category: None, page: 1, limit: RELATED_LIMIT as u32 + 1 };
    match api.list_articles(&query).await {
        Ok(page) => page.data.into_iter().filter(|a| a.title != preview.title).take(RELATED_LIMIT).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "related articles unavailable");
            Vec::new()
        }
    }
}
