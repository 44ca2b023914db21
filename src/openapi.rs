use crate::auth::Role;
use crate::error::ApiErrorBody;
use crate::models::{Article, Category, CategorySummary, NewArticle, NewCategory, Profile, UpdateArticle};
use crate::routes::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse, UploadResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::login,
        crate::routes::register,
        crate::routes::profile,
        crate::routes::list_articles,
        crate::routes::get_article,
        crate::routes::create_article,
        crate::routes::update_article,
        crate::routes::delete_article,
        crate::routes::list_categories,
        crate::routes::create_category,
        crate::routes::update_category,
        crate::routes::delete_category,
        crate::routes::upload_image,
    ),
    components(schemas(
        Article, NewArticle, UpdateArticle, Category, CategorySummary, NewCategory,
        Profile, Role, LoginRequest, RegisterRequest, TokenResponse, UploadResponse,
        MessageResponse, ApiErrorBody
    )),
    tags(
        (name = "auth", description = "Login, registration and profile"),
        (name = "articles", description = "Article catalogue"),
        (name = "categories", description = "Category catalogue"),
    )
)]
pub struct ApiDoc;
