//! Screens of the public reading site: one article with its sidebar, and the
//! signed-in user's profile.

use super::api::{CmsApi, PageQuery};
use super::session::Session;
use super::{ClientError, Notice, Notifier, Route};
use crate::models::{Article, Id, Profile};

/// Sidebar length under an article.
pub const OTHER_ARTICLES: usize = 3;

/// Loads an article and a few others to read next. A missing or unreadable
/// article yields [`Route::NotFound`]; a failed sidebar lookup only empties
/// the sidebar.
pub async fn open_article(
    api: &dyn CmsApi,
    id: Id,
    notifier: &dyn Notifier,
) -> Result<(Article, Vec<Article>), Route> {
    let article = match api.get_article(id).await {
        Ok(a) => a,
        Err(ClientError::NotFound) => return Err(Route::NotFound),
        Err(e) => {
            tracing::warn!(id, error = %e, "article unavailable");
            notifier.notify(Notice::error("Could not load article", e.user_message()));
            return Err(Route::NotFound);
        }
    };

    let query = PageQuery { search: String::new(), category: None, page: 1, limit: OTHER_ARTICLES as u32 + 1 };
    let others = match api.list_articles(&query).await {
        Ok(page) => page.data.into_iter().filter(|a| a.id != article.id).take(OTHER_ARTICLES).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "other articles unavailable");
            Vec::new()
        }
    };
    Ok((article, others))
}

/// Fetches the profile for the signed-in user. No session, or a token the
/// server no longer accepts, sends the user to the login screen.
pub async fn load_profile(
    api: &dyn CmsApi,
    session: Option<&Session>,
    notifier: &dyn Notifier,
) -> Result<Profile, Route> {
    let Some(session) = session else {
        notifier.notify(Notice::error("Not signed in", "Please log in to see your profile"));
        return Err(Route::Login);
    };
    match api.profile(&session.token).await {
        Ok(profile) => Ok(profile),
        Err(ClientError::Unauthorized(_)) => {
            notifier.notify(Notice::error("Session expired", "Please log in again"));
            Err(Route::Login)
        }
        Err(e) => {
            tracing::warn!(error = %e, "profile unavailable");
            notifier.notify(Notice::error("Could not load profile", e.user_message()));
            Err(session.home())
        }
    }
}
