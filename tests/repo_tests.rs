#![cfg(feature = "inmem-store")]

use blogdesk::auth::Role;
use blogdesk::models::{ListFilter, NewArticle, NewCategory, NewUser, UpdateArticle};
use blogdesk::repo::inmem::InMemRepo;
use blogdesk::repo::{ArticleRepo, CategoryRepo, RepoError, UserRepo};

fn filter(search: Option<&str>, category: Option<&str>, page: u32, limit: u32) -> ListFilter {
    ListFilter { search: search.map(Into::into), category: category.map(Into::into), page, limit }
}

fn new_article(title: &str, category_id: i64) -> NewArticle {
    NewArticle { title: title.into(), content: "<p>x</p>".into(), category_id, thumbnail: "/uploads/a".into() }
}

#[tokio::test]
async fn category_crud_and_conflicts() {
    let r = InMemRepo::ephemeral();
    let (rows, total) = r.list_categories(&filter(None, None, 1, 10)).await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(total, 0);

    let tech = r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
    let life = r.create_category(NewCategory { name: "Life".into() }).await.unwrap();

    let err = r.create_category(NewCategory { name: "TECH".into() }).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
    let err = r.update_category(life.id, NewCategory { name: "tech".into() }).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    // renaming to a different case of its own name is fine
    let renamed = r.update_category(tech.id, NewCategory { name: "TECH".into() }).await.unwrap();
    assert_eq!(renamed.name, "TECH");

    assert!(matches!(r.get_category(9999).await, Err(RepoError::NotFound)));
    r.delete_category(life.id).await.unwrap();
    assert!(matches!(r.delete_category(life.id).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn referenced_category_is_restricted() {
    let r = InMemRepo::ephemeral();
    let tech = r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
    let a = r.create_article(new_article("One", tech.id), "admin").await.unwrap();
    r.create_article(new_article("Two", tech.id), "admin").await.unwrap();

    assert!(matches!(r.delete_category(tech.id).await, Err(RepoError::InUse(2))));
    r.delete_article(a.id).await.unwrap();
    assert!(matches!(r.delete_category(tech.id).await, Err(RepoError::InUse(1))));
}

#[tokio::test]
async fn articles_filter_in_creation_order() {
    let r = InMemRepo::ephemeral();
    let tech = r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
    let life = r.create_category(NewCategory { name: "Life".into() }).await.unwrap();
    for title in ["Rust design", "Garden design", "Rust async", "Cooking"] {
        let cat = if title.starts_with("Rust") { tech.id } else { life.id };
        r.create_article(new_article(title, cat), "admin").await.unwrap();
    }

    let (rows, total) = r.list_articles(&filter(Some("DESIGN"), None, 1, 10)).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows[0].title, "Rust design");
    assert_eq!(rows[1].title, "Garden design");

    let (rows, _) = r.list_articles(&filter(None, Some("tech"), 1, 10)).await.unwrap();
    assert_eq!(rows.iter().map(|a| a.title.as_str()).collect::<Vec<_>>(), ["Rust design", "Rust async"]);
    assert_eq!(rows[0].category.as_ref().unwrap().name, "Tech");

    let (rows, total) = r.list_articles(&filter(None, Some(&life.id.to_string()), 2, 1)).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Cooking");

    let err = r.create_article(new_article("Orphan", 9999), "admin").await.unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));
}

#[tokio::test]
async fn update_keeps_thumbnail_unless_replaced() {
    let r = InMemRepo::ephemeral();
    let tech = r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
    let a = r.create_article(new_article("One", tech.id), "admin").await.unwrap();

    let upd = |image_url: Option<&str>| UpdateArticle {
        title: "One v2".into(),
        content: "<p>y</p>".into(),
        category_id: tech.id,
        image_url: image_url.map(Into::into),
    };
    let kept = r.update_article(a.id, upd(None)).await.unwrap();
    assert_eq!(kept.thumbnail.as_deref(), Some("/uploads/a"));
    assert_eq!(kept.created_by, "admin");
    let replaced = r.update_article(a.id, upd(Some("/uploads/b"))).await.unwrap();
    assert_eq!(replaced.thumbnail.as_deref(), Some("/uploads/b"));
    assert!(matches!(r.update_article(9999, upd(None)).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let r = InMemRepo::open(dir.path()).unwrap();
        let tech = r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
        r.create_article(new_article("Persisted", tech.id), "admin").await.unwrap();
        r.create_user(NewUser { username: "ann".into(), password_hash: "s$h".into(), role: Role::Admin })
            .await
            .unwrap();
    }
    assert!(dir.path().join("state.json").exists());

    let r = InMemRepo::open(dir.path()).unwrap();
    let (rows, _) = r.list_articles(&filter(None, None, 1, 10)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Persisted");
    let user = r.find_user("ann").await.unwrap().unwrap();
    assert_eq!(user.password_hash, "s$h");
    assert_eq!(user.role, Role::Admin);

    // ids keep counting after reload
    let next = r.create_category(NewCategory { name: "Life".into() }).await.unwrap();
    assert!(next.id > rows[0].id);
}

#[tokio::test]
async fn corrupt_snapshot_refuses_to_open_and_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    {
        let r = InMemRepo::open(dir.path()).unwrap();
        r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
    }
    let path = dir.path().join("state.json");
    let full = std::fs::read(&path).unwrap();
    let truncated = &full[..full.len() / 2];
    std::fs::write(&path, truncated).unwrap();

    let err = InMemRepo::open(dir.path()).err().expect("corrupt snapshot must not open");
    assert!(err.to_string().contains("corrupt"), "{err}");
    assert_eq!(std::fs::read(&path).unwrap(), truncated);
}

#[tokio::test]
async fn snapshot_is_replaced_whole() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::open(dir.path()).unwrap();
    let tech = r.create_category(NewCategory { name: "Tech".into() }).await.unwrap();
    for i in 0..5 {
        r.create_article(new_article(&format!("post {i}"), tech.id), "admin").await.unwrap();
    }
    r.delete_article(tech.id + 1).await.unwrap();

    assert!(!dir.path().join("state.json.tmp").exists());
    let reopened = InMemRepo::open(dir.path()).unwrap();
    let (rows, total) = reopened.list_articles(&filter(None, None, 1, 10)).await.unwrap();
    assert_eq!(total, 4);
    assert!(rows.iter().all(|a| a.id != tech.id + 1));
}

#[tokio::test]
async fn usernames_are_unique() {
    let r = InMemRepo::ephemeral();
    let new = || NewUser { username: "ann".into(), password_hash: "x$y".into(), role: Role::User };
    let u = r.create_user(new()).await.unwrap();
    assert!(matches!(r.create_user(new()).await, Err(RepoError::Conflict(_))));
    assert_eq!(r.get_user(u.id).await.unwrap().username, "ann");
    assert!(r.find_user("bob").await.unwrap().is_none());
}
