use serde::{Deserialize, Serialize};

use super::api::CmsApi;
use super::store::{LocalStore, LEGACY_PASSWORD_KEY, ROLE_KEY, TOKEN_KEY, USERNAME_KEY};
use super::{ClientError, ClientResult, Notice, Notifier, Route};
use crate::auth::Role;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Who is signed in. Holds the bearer token, never the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Screen to land on after signing in.
    pub fn home(&self) -> Route {
        if self.is_admin() {
            Route::ArticleList
        } else {
            Route::PublicArticles
        }
    }

    /// Rebuilds the session persisted by a previous login.
    pub fn restore(store: &dyn LocalStore) -> Option<Session> {
        let token = store.get(TOKEN_KEY).filter(|t| !t.is_empty())?;
        let username = store.get(USERNAME_KEY)?;
        let role = Role::parse(&store.get(ROLE_KEY)?)?;
        Some(Session { token, username, role })
    }

    pub fn persist(&self, store: &dyn LocalStore) -> ClientResult<()> {
        store.set(TOKEN_KEY, self.token.clone())?;
        store.set(USERNAME_KEY, self.username.clone())?;
        store.set(ROLE_KEY, self.role.as_str().to_string())?;
        store.remove(LEGACY_PASSWORD_KEY)
    }

    pub fn clear(store: &dyn LocalStore) -> ClientResult<()> {
        for key in [TOKEN_KEY, USERNAME_KEY, ROLE_KEY, LEGACY_PASSWORD_KEY] {
            store.remove(key)?;
        }
        Ok(())
    }
}

/// Field problems for a login or register form, in display order.
pub fn credential_errors(username: &str, password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if username.trim().chars().count() < MIN_USERNAME_LEN {
        errors.push(format!("Username must be at least {MIN_USERNAME_LEN} characters"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!("Password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    errors
}

fn validate(username: &str, password: &str, notifier: &dyn Notifier) -> ClientResult<()> {
    let errors = credential_errors(username, password);
    if errors.is_empty() {
        return Ok(());
    }
    let msg = errors.join(". ");
    notifier.notify(Notice::error("Invalid input", msg.clone()));
    Err(ClientError::Validation(msg))
}

/// Signs in, fetches the profile and persists the session. Returns the
/// session together with the screen to show next.
pub async fn login(
    api: &dyn CmsApi,
    store: &dyn LocalStore,
    notifier: &dyn Notifier,
    username: &str,
    password: &str,
) -> ClientResult<(Session, Route)> {
    validate(username, password, notifier)?;
    let username = username.trim();

    let outcome = async {
        let token = api.login(username, password).await?;
        let profile = api.profile(&token).await?;
        Ok::<_, ClientError>(Session { token, username: profile.username, role: profile.role })
    }
    .await;

    let session = match outcome {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(username, error = %e, "login failed");
            notifier.notify(Notice::error("Login failed", e.user_message()));
            return Err(e);
        }
    };
    session.persist(store)?;
    tracing::info!(username = %session.username, role = session.role.as_str(), "signed in");
    notifier.notify(Notice::success("Welcome back", &format!("Signed in as {}", session.username)));
    let route = session.home();
    Ok((session, route))
}

/// Creates an account. On success the user is sent to the login screen.
pub async fn register(
    api: &dyn CmsApi,
    notifier: &dyn Notifier,
    username: &str,
    password: &str,
    role: Role,
) -> ClientResult<Route> {
    validate(username, password, notifier)?;
    match api.register(username.trim(), password, role).await {
        Ok(profile) => {
            notifier.notify(Notice::success("Account created", &format!("You can now sign in as {}", profile.username)));
            Ok(Route::Login)
        }
        Err(e) => {
            notifier.notify(Notice::error("Registration failed", e.user_message()));
            Err(e)
        }
    }
}

pub fn logout(store: &dyn LocalStore) -> Route {
    if let Err(e) = Session::clear(store) {
        tracing::warn!(error = %e, "failed to clear session");
    }
    Route::Login
}
