use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{hash_password, verify_password, Auth, JwtKeys, Role};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::*;
use crate::rate_limit::LoginLimiter;
use crate::repo::Repo;
use crate::require_role;
use crate::storage::{ImageStore, ImageStoreError};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/profile").route(web::get().to(profile)))
            .service(
                web::resource("/articles")
                    .route(web::get().to(list_articles))
                    .route(web::post().to(create_article)),
            )
            .service(
                web::resource("/articles/{id}")
                    .route(web::get().to(get_article))
                    .route(web::put().to(update_article))
                    .route(web::delete().to(delete_article)),
            )
            .service(
                web::resource("/categories")
                    .route(web::get().to(list_categories))
                    .route(web::post().to(create_category)),
            )
            .service(
                web::resource("/categories/{id}")
                    .route(web::get().to(get_category))
                    .route(web::put().to(update_category))
                    .route(web::delete().to(delete_category)),
            )
            .service(web::resource("/upload").route(web::post().to(upload_image))),
    );
    // outside /api so stored thumbnail URLs work directly in <img src>
    cfg.route("/uploads/{hash}", web::get().to(get_upload));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub jwt: JwtKeys,
    pub login_limiter: Option<LoginLimiter>,
}

// ---------------- Auth -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: String, // "user" | "admin", case-insensitive
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> MessageResponse {
    MessageResponse { message: text.to_string() }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Wrong credentials", body = ApiErrorBody),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(limiter) = &data.login_limiter {
        let ip = req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
        if !limiter.allow(&ip) {
            tracing::warn!(%ip, "login rate limited");
            return Err(ApiError::TooManyRequests);
        }
    }
    let LoginRequest { username, password } = payload.into_inner();
    if username.trim().is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("username and password are required".into()));
    }
    let user = data.repo.find_user(username.trim()).await?;
    let Some(user) = user.filter(|u| verify_password(&password, &u.password_hash)) else {
        tracing::info!(username = %username.trim(), "login rejected");
        return Err(ApiError::Unauthorized);
    };
    let token = data.jwt.issue(user.id, &user.username, vec![user.role]).map_err(|e| {
        tracing::error!(error = %e, "token signing failed");
        ApiError::Internal
    })?;
    tracing::info!(username = %user.username, role = user.role.as_str(), "login ok");
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = Profile),
        (status = 400, description = "Invalid input", body = ApiErrorBody),
        (status = 409, description = "Username taken", body = ApiErrorBody)
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let RegisterRequest { username, password, role } = payload.into_inner();
    let username = username.trim().to_string();
    if username.chars().count() < 3 {
        return Err(ApiError::BadRequest("username must be at least 3 characters".into()));
    }
    if password.chars().count() < 6 {
        return Err(ApiError::BadRequest("password must be at least 6 characters".into()));
    }
    let role = Role::parse(&role).ok_or_else(|| ApiError::BadRequest(format!("unknown role '{role}'")))?;
    let password_hash = hash_password(&password)?;
    let user = data
        .repo
        .create_user(NewUser { username, password_hash, role })
        .await?;
    tracing::info!(username = %user.username, role = role.as_str(), "account registered");
    Ok(HttpResponse::Created().json(Profile::from(&user)))
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current user", body = Profile),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn profile(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let id: Id = auth.0.sub.parse().map_err(|_| ApiError::Unauthorized)?;
    let user = data.repo.get_user(id).await.map_err(|_| ApiError::Unauthorized)?;
    Ok(HttpResponse::Ok().json(Profile::from(&user)))
}

// ---------------- Listing ----------------------------------------------

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring of the title (articles) or name (categories).
    pub search: Option<String>,
    /// Category id, or category name (articles only).
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    /// Blank parameters mean "no filter"; clients send `search=` while the box is empty.
    fn into_filter(self) -> ListFilter {
        fn non_blank(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        ListFilter {
            search: non_blank(self.search),
            category: non_blank(self.category),
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

fn page_of<T>(data: Vec<T>, total: u64, filter: &ListFilter) -> Paginated<T> {
    Paginated { data, total, page: filter.page, limit: filter.limit }
}

// ---------------- Articles ---------------------------------------------

fn require_text(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/articles",
    params(ListQuery),
    responses((status = 200, description = "One page of articles in creation order"))
)]
pub async fn list_articles(data: web::Data<AppState>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let filter = query.into_inner().into_filter();
    let (rows, total) = data.repo.list_articles(&filter).await?;
    Ok(HttpResponse::Ok().json(page_of(rows, total, &filter)))
}

#[utoipa::path(
    get,
    path = "/api/articles/{id}",
    params(("id" = Id, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article", body = Article),
        (status = 404, description = "Article not found", body = ApiErrorBody)
    )
)]
pub async fn get_article(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let article = data.repo.get_article(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(article))
}

#[utoipa::path(
    post,
    path = "/api/articles",
    request_body = NewArticle,
    responses(
        (status = 201, description = "Article created", body = Article),
        (status = 400, description = "Missing field or unknown category", body = ApiErrorBody),
        (status = 403, description = "Admins only")
    )
)]
pub async fn create_article(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewArticle>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let new = payload.into_inner();
    require_text(&new.title, "title")?;
    require_text(&new.content, "content")?;
    require_text(&new.thumbnail, "thumbnail")?;
    let article = data.repo.create_article(new, &auth.0.username).await?;
    tracing::info!(id = article.id, by = %auth.0.username, "article created");
    Ok(HttpResponse::Created().json(article))
}

#[utoipa::path(
    put,
    path = "/api/articles/{id}",
    request_body = UpdateArticle,
    params(("id" = Id, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article updated", body = Article),
        (status = 404, description = "Article not found", body = ApiErrorBody),
        (status = 403, description = "Admins only")
    )
)]
pub async fn update_article(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateArticle>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let mut upd = payload.into_inner();
    require_text(&upd.title, "title")?;
    require_text(&upd.content, "content")?;
    upd.image_url = upd.image_url.filter(|u| !u.trim().is_empty());
    let article = data.repo.update_article(path.into_inner(), upd).await?;
    tracing::info!(id = article.id, by = %auth.0.username, "article updated");
    Ok(HttpResponse::Ok().json(article))
}

#[utoipa::path(
    delete,
    path = "/api/articles/{id}",
    params(("id" = Id, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article deleted", body = MessageResponse),
        (status = 404, description = "Article not found", body = ApiErrorBody)
    )
)]
pub async fn delete_article(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let id = path.into_inner();
    data.repo.delete_article(id).await?;
    tracing::info!(id, by = %auth.0.username, "article deleted");
    Ok(HttpResponse::Ok().json(message("article deleted")))
}

// ---------------- Categories -------------------------------------------

fn clean_category(payload: web::Json<NewCategory>) -> Result<NewCategory, ApiError> {
    let name = payload.into_inner().name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("category name is required".into()));
    }
    Ok(NewCategory { name })
}

#[utoipa::path(
    get,
    path = "/api/categories",
    params(ListQuery),
    responses((status = 200, description = "One page of categories in creation order"))
)]
pub async fn list_categories(data: web::Data<AppState>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let filter = query.into_inner().into_filter();
    let (rows, total) = data.repo.list_categories(&filter).await?;
    Ok(HttpResponse::Ok().json(page_of(rows, total, &filter)))
}

pub async fn get_category(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.get_category(path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 409, description = "Name already used", body = ApiErrorBody)
    )
)]
pub async fn create_category(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewCategory>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let category = data.repo.create_category(clean_category(payload)?).await?;
    Ok(HttpResponse::Created().json(category))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    request_body = NewCategory,
    params(("id" = Id, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category renamed", body = Category),
        (status = 404, description = "Category not found", body = ApiErrorBody),
        (status = 409, description = "Name already used", body = ApiErrorBody)
    )
)]
pub async fn update_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewCategory>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let category = data.repo.update_category(path.into_inner(), clean_category(payload)?).await?;
    Ok(HttpResponse::Ok().json(category))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(("id" = Id, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category deleted", body = MessageResponse),
        (status = 409, description = "Category still used by articles", body = ApiErrorBody)
    )
)]
pub async fn delete_category(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let id = path.into_inner();
    data.repo.delete_category(id).await?;
    tracing::info!(id, by = %auth.0.username, "category deleted");
    Ok(HttpResponse::Ok().json(message("category deleted")))
}

// ---------------- Uploads ----------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
}

pub const UPLOAD_SIZE_LIMIT: usize = 5 * 1024 * 1024;

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[utoipa::path(
    post,
    path = "/api/upload",
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 200, description = "Identical image already stored", body = UploadResponse),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_image(auth: Auth, data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    require_role!(auth, Role::Admin);
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart body".into())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut bytes: Vec<u8> = Vec::new();
        let mut hasher = Sha256::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > UPLOAD_SIZE_LIMIT {
                return Err(ApiError::PayloadTooLarge);
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let mime = infer::get(&bytes).map(|t| t.mime_type()).unwrap_or("application/octet-stream");
        if !ALLOWED_MIME.contains(&mime) {
            return Err(ApiError::UnsupportedMediaType);
        }
        let hash = format!("{:x}", hasher.finalize());
        let status = match data.image_store.save(&hash, &bytes).await {
            Ok(()) => StatusCode::CREATED,
            Err(ImageStoreError::Duplicate) => StatusCode::OK,
            Err(e) => {
                log::error!("image_store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        tracing::info!(%hash, mime, size = bytes.len(), "thumbnail uploaded");
        return Ok(HttpResponse::build(status).json(UploadResponse { url: format!("/uploads/{hash}") }));
    }
    Err(ApiError::BadRequest("multipart field 'file' is required".into()))
}

pub async fn get_upload(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    match data.image_store.load(&path.into_inner()).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
            .body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("image_store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}
