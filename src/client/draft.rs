use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::store::{load_json, save_json, LocalStore, DRAFT_KEY};
use crate::models::Id;

/// Unsaved create-form values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub title: String,
    pub content: String,
    pub category_id: Option<Id>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.content.is_empty() && self.category_id.is_none()
    }
}

/// Single-slot draft cache. Write failures are logged and swallowed; the
/// draft is a convenience, never a source of truth.
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn LocalStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Option<Draft> {
        load_json(self.store.as_ref(), DRAFT_KEY)
    }

    pub fn save(&self, draft: &Draft) {
        if let Err(e) = save_json(self.store.as_ref(), DRAFT_KEY, draft) {
            tracing::warn!(error = %e, "failed to save draft");
        }
    }

    /// The backing store; the preview slot lives beside the draft.
    pub fn local(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(DRAFT_KEY) {
            tracing::warn!(error = %e, "failed to clear draft");
        }
    }
}
