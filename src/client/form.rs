//! Article and category form controllers.

use std::sync::Arc;

use chrono::Utc;

use super::api::{CmsApi, LocalFile};
use super::draft::{Draft, DraftStore};
use super::listing::{ListController, ListSource};
use super::preview::{self, PreviewArticle, PLACEHOLDER_IMAGE};
use super::store::LocalStore;
use super::{ClientError, ClientResult, Notice, Notifier, Route};
use crate::models::{Article, Category, Id, NewArticle, UpdateArticle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(Id),
}

/// `Empty -> Editing -> (Preview <-> Editing) -> Submitting -> Published`,
/// with a failed submit falling back to `Editing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthoringState {
    Empty,
    Editing,
    Preview,
    Submitting,
    Published,
}

#[derive(Debug)]
pub enum SubmitOutcome<T> {
    Saved { entity: T, route: Route },
    /// Required fields left blank; nothing was sent.
    Invalid(Vec<&'static str>),
    Failed(String),
    /// A submit is in flight or the form is already published.
    Busy,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub struct ArticleForm {
    mode: FormMode,
    title: String,
    content: String,
    category_id: Option<Id>,
    stored_thumbnail: Option<String>,
    selected: Option<LocalFile>,
    state: AuthoringState,
    drafts: DraftStore,
}

impl ArticleForm {
    /// Blank create form, pre-filled from a saved draft if one exists.
    pub fn create(drafts: DraftStore) -> Self {
        let draft = drafts.load().unwrap_or_default();
        let state = if draft.is_empty() { AuthoringState::Empty } else { AuthoringState::Editing };
        Self {
            mode: FormMode::Create,
            title: draft.title,
            content: draft.content,
            category_id: draft.category_id,
            stored_thumbnail: None,
            selected: None,
            state,
            drafts,
        }
    }

    /// Loads an article for editing. Any load failure notifies and yields the
    /// list route instead of a form. Edits never touch the saved draft.
    pub async fn load_for_edit(
        api: &dyn CmsApi,
        id: Id,
        local: Arc<dyn LocalStore>,
        notifier: &dyn Notifier,
    ) -> Result<Self, Route> {
        match api.get_article(id).await {
            Ok(a) => Ok(Self {
                mode: FormMode::Edit(id),
                title: a.title,
                content: a.content,
                category_id: Some(a.category_id),
                stored_thumbnail: a.thumbnail.filter(|t| !blank(t)),
                selected: None,
                state: AuthoringState::Editing,
                drafts: DraftStore::new(local),
            }),
            Err(e) => {
                tracing::warn!(id, error = %e, "could not load article for editing");
                let notice = match e {
                    ClientError::NotFound => Notice::error("Article not found", format!("Article {id} does not exist")),
                    other => Notice::error("Could not load article", other.user_message()),
                };
                notifier.notify(notice);
                Err(Route::ArticleList)
            }
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn state(&self) -> AuthoringState {
        self.state
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn category_id(&self) -> Option<Id> {
        self.category_id
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touched();
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.touched();
    }

    pub fn set_category(&mut self, category_id: Option<Id>) {
        self.category_id = category_id;
        self.touched();
    }

    pub fn select_thumbnail(&mut self, file: LocalFile) {
        self.selected = Some(file);
        if matches!(self.state, AuthoringState::Empty) {
            self.state = AuthoringState::Editing;
        }
    }

    /// Drops the picked file; an edited article falls back to its stored image.
    pub fn clear_thumbnail(&mut self) {
        self.selected = None;
        if self.mode == FormMode::Create {
            self.stored_thumbnail = None;
        }
    }

    /// What the thumbnail slot should display.
    pub fn thumbnail_ref(&self) -> Option<&str> {
        match &self.selected {
            Some(file) => Some(file.preview_ref()),
            None => self.stored_thumbnail.as_deref(),
        }
    }

    fn touched(&mut self) {
        if matches!(self.state, AuthoringState::Empty | AuthoringState::Editing | AuthoringState::Preview) {
            self.state = AuthoringState::Editing;
        }
        if self.mode == FormMode::Create {
            self.drafts.save(&Draft {
                title: self.title.clone(),
                content: self.content.clone(),
                category_id: self.category_id,
            });
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(&self.title) {
            missing.push("title");
        }
        if blank(&self.content) {
            missing.push("content");
        }
        if self.category_id.is_none() {
            missing.push("category");
        }
        if self.mode == FormMode::Create && self.thumbnail_ref().is_none() {
            missing.push("thumbnail");
        }
        missing
    }

    /// Stages the form for the read-only preview page.
    pub fn stage_preview(&mut self, notifier: &dyn Notifier) -> Option<Route> {
        if matches!(self.state, AuthoringState::Submitting | AuthoringState::Published) {
            return None;
        }
        if blank(&self.title) || blank(&self.content) {
            notifier.notify(Notice::error("Nothing to preview", "Add a title and content first"));
            return None;
        }
        let staged = PreviewArticle {
            title: self.title.clone(),
            content: self.content.clone(),
            image: self.thumbnail_ref().unwrap_or(PLACEHOLDER_IMAGE).to_string(),
            category_id: self.category_id,
            created_at: Utc::now(),
        };
        if let Err(e) = preview::stage(self.drafts.local(), &staged) {
            notifier.notify(Notice::error("Preview unavailable", e.user_message()));
            return None;
        }
        self.state = AuthoringState::Preview;
        Some(Route::ArticlePreview)
    }

    pub fn return_from_preview(&mut self) {
        if self.state == AuthoringState::Preview {
            self.state = AuthoringState::Editing;
        }
    }

    /// Uploads a newly picked thumbnail, then creates or updates the article.
    pub async fn submit(&mut self, api: &dyn CmsApi, notifier: &dyn Notifier) -> SubmitOutcome<Article> {
        if matches!(self.state, AuthoringState::Submitting | AuthoringState::Published) {
            return SubmitOutcome::Busy;
        }
        let missing = self.missing_fields();
        if !missing.is_empty() {
            notifier.notify(Notice::error("Missing fields", format!("Please fill in: {}", missing.join(", "))));
            return SubmitOutcome::Invalid(missing);
        }

        self.state = AuthoringState::Submitting;
        match self.send(api).await {
            Ok(article) => {
                self.state = AuthoringState::Published;
                if self.mode == FormMode::Create {
                    self.drafts.clear();
                }
                preview::discard(self.drafts.local());
                let verb = if self.mode == FormMode::Create { "published" } else { "updated" };
                tracing::info!(id = article.id, "article {verb}");
                notifier.notify(Notice::success("Saved", &format!("\"{}\" was {verb}", article.title)));
                SubmitOutcome::Saved { entity: article, route: Route::ArticleList }
            }
            Err(e) => {
                self.state = AuthoringState::Editing;
                tracing::warn!(error = %e, mode = ?self.mode, "article submit failed");
                let msg = e.user_message();
                notifier.notify(Notice::error("Could not save article", msg.clone()));
                SubmitOutcome::Failed(msg)
            }
        }
    }

    async fn send(&mut self, api: &dyn CmsApi) -> ClientResult<Article> {
        if let Some(file) = &self.selected {
            let url = api.upload(file).await?;
            // a retry after a failed save reuses the uploaded image
            self.stored_thumbnail = Some(url);
            self.selected = None;
        }
        let category_id = self.category_id.ok_or_else(|| ClientError::Validation("Category is required".into()))?;
        match self.mode {
            FormMode::Create => {
                let thumbnail =
                    self.stored_thumbnail.clone().ok_or_else(|| ClientError::Validation("Thumbnail is required".into()))?;
                let new = NewArticle {
                    title: self.title.trim().to_string(),
                    content: self.content.clone(),
                    category_id,
                    thumbnail,
                };
                api.create_article(&new).await
            }
            FormMode::Edit(id) => {
                let update = UpdateArticle {
                    title: self.title.trim().to_string(),
                    content: self.content.clone(),
                    category_id,
                    image_url: self.stored_thumbnail.clone(),
                };
                api.update_article(id, &update).await
            }
        }
    }
}

/// Single-field dialog for creating or renaming a category.
pub struct CategoryForm {
    mode: FormMode,
    name: String,
    submitting: bool,
}

impl CategoryForm {
    pub fn create() -> Self {
        Self { mode: FormMode::Create, name: String::new(), submitting: false }
    }

    pub fn edit(category: &Category) -> Self {
        Self { mode: FormMode::Edit(category.id), name: category.name.clone(), submitting: false }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Saves and refreshes `list` on success. The dialog keeps its input on failure.
    pub async fn submit<S: ListSource>(
        &mut self,
        api: &dyn CmsApi,
        list: &ListController<S>,
        notifier: &dyn Notifier,
    ) -> SubmitOutcome<Category> {
        if self.submitting {
            return SubmitOutcome::Busy;
        }
        let name = self.name.trim().to_string();
        if name.is_empty() {
            notifier.notify(Notice::error("Missing fields", "Please fill in: name"));
            return SubmitOutcome::Invalid(vec!["name"]);
        }

        self.submitting = true;
        let result = match self.mode {
            FormMode::Create => api.create_category(&name).await,
            FormMode::Edit(id) => api.update_category(id, &name).await,
        };
        self.submitting = false;

        match result {
            Ok(category) => {
                notifier.notify(Notice::success("Saved", &format!("Category \"{}\" saved", category.name)));
                let _ = list.refresh().await;
                SubmitOutcome::Saved { entity: category, route: Route::CategoryList }
            }
            Err(e) => {
                tracing::warn!(error = %e, "category submit failed");
                let msg = e.user_message();
                notifier.notify(Notice::error("Could not save category", msg.clone()));
                SubmitOutcome::Failed(msg)
            }
        }
    }
}
