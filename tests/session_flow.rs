mod common;

use blogdesk::auth::Role;
use blogdesk::client::session::{self, Session};
use blogdesk::client::store::{LocalStore, MemoryStore};
use blogdesk::client::{ClientError, NoticeLevel, NoticeLog, Route};
use common::{Call, MockApi};

#[tokio::test]
async fn admin_login_persists_session_without_password() {
    let api = MockApi::new();
    api.add_user("editor", "s3cret!", Role::Admin);
    let store = MemoryStore::new();
    let notices = NoticeLog::default();

    let (session, route) = session::login(api.as_ref(), &store, &notices, " editor ", "s3cret!").await.unwrap();
    assert_eq!(route, Route::ArticleList);
    assert_eq!(session.username, "editor");
    assert!(session.is_admin());
    assert_eq!(
        api.calls(),
        vec![
            Call::Login { username: "editor".into(), password: "s3cret!".into() },
            Call::Profile("token-editor".into()),
        ]
    );

    assert_eq!(store.get("token").as_deref(), Some("token-editor"));
    assert_eq!(store.get("role").as_deref(), Some("admin"));
    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, ["role", "token", "username"]);
    assert_eq!(Session::restore(&store), Some(session));
}

#[tokio::test]
async fn reader_lands_on_public_articles() {
    let api = MockApi::new();
    api.add_user("reader", "letmein", Role::User);
    let store = MemoryStore::new();
    let (_, route) = session::login(api.as_ref(), &store, &NoticeLog::default(), "reader", "letmein").await.unwrap();
    assert_eq!(route, Route::PublicArticles);
}

#[tokio::test]
async fn wrong_credentials_store_nothing() {
    let api = MockApi::new();
    api.add_user("editor", "s3cret!", Role::Admin);
    let store = MemoryStore::new();
    let notices = NoticeLog::default();

    let err = session::login(api.as_ref(), &store, &notices, "editor", "wrong-one").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert!(store.keys().is_empty());
    let notice = notices.last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.description.as_deref(), Some("Wrong username or password."));
}

#[tokio::test]
async fn short_credentials_are_rejected_locally() {
    let api = MockApi::new();
    let store = MemoryStore::new();
    let notices = NoticeLog::default();

    let err = session::login(api.as_ref(), &store, &notices, "ed", "12345").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(api.calls().is_empty());
    assert!(notices.last().unwrap().description.unwrap().contains("Username"));

    let err = session::register(api.as_ref(), &notices, "newbie", "123", Role::User).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn register_routes_to_login_and_reports_conflicts() {
    let api = MockApi::new();
    let notices = NoticeLog::default();

    let route = session::register(api.as_ref(), &notices, "newbie", "longenough", Role::Admin).await.unwrap();
    assert_eq!(route, Route::Login);
    assert_eq!(api.calls(), vec![Call::Register("newbie".into(), Role::Admin)]);

    let err = session::register(api.as_ref(), &notices, "newbie", "longenough", Role::User).await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));
    assert_eq!(notices.last().unwrap().description.as_deref(), Some("username 'newbie' is taken"));
}

#[tokio::test]
async fn logout_forgets_everything() {
    let api = MockApi::new();
    api.add_user("editor", "s3cret!", Role::Admin);
    let store = MemoryStore::new();
    session::login(api.as_ref(), &store, &NoticeLog::default(), "editor", "s3cret!").await.unwrap();

    assert_eq!(session::logout(&store), Route::Login);
    assert!(Session::restore(&store).is_none());
    assert!(store.keys().is_empty());
}
