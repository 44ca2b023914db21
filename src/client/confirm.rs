use super::api::CmsApi;
use super::listing::{ListController, ListSource};
use super::{Notice, Notifier};
use crate::models::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteKind {
    Article,
    Category,
}

impl DeleteKind {
    fn label(self) -> &'static str {
        match self {
            DeleteKind::Article => "Article",
            DeleteKind::Category => "Category",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Confirm pressed with no pending target.
    Nothing,
    Deleted(Id),
    Failed { id: Id, message: String },
}

/// Two-step delete: `request` opens the dialog, `confirm` sends exactly one
/// delete for the held target.
#[derive(Debug)]
pub struct DeleteConfirmation {
    kind: DeleteKind,
    target: Option<Id>,
}

impl DeleteConfirmation {
    pub fn new(kind: DeleteKind) -> Self {
        Self { kind, target: None }
    }

    pub fn request(&mut self, id: Id) {
        self.target = Some(id);
    }

    pub fn pending(&self) -> Option<Id> {
        self.target
    }

    pub fn is_open(&self) -> bool {
        self.target.is_some()
    }

    pub fn cancel(&mut self) {
        self.target = None;
    }

    pub async fn confirm<S: ListSource>(
        &mut self,
        api: &dyn CmsApi,
        list: &ListController<S>,
        notifier: &dyn Notifier,
    ) -> DeleteOutcome {
        let Some(id) = self.target.take() else {
            return DeleteOutcome::Nothing;
        };
        let result = match self.kind {
            DeleteKind::Article => api.delete_article(id).await,
            DeleteKind::Category => api.delete_category(id).await,
        };
        match result {
            Ok(()) => {
                tracing::info!(id, kind = self.kind.label(), "deleted");
                notifier.notify(Notice::success("Deleted", &format!("{} {id} was deleted", self.kind.label())));
                let _ = list.refresh().await;
                DeleteOutcome::Deleted(id)
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "delete failed");
                let message = e.user_message();
                notifier.notify(Notice::error("Delete failed", message.clone()));
                DeleteOutcome::Failed { id, message }
            }
        }
    }
}
