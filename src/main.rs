use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use blogdesk::auth::{hash_password, JwtKeys, Role};
use blogdesk::models::NewUser;
use blogdesk::openapi::ApiDoc;
use blogdesk::rate_limit::{InMemoryRateLimiter, LoginLimiter};
use blogdesk::repo::{Repo, UserRepo};
use blogdesk::settings::ServerConfig;
use blogdesk::storage::FsImageStore;
use blogdesk::{config, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is only honoured in debug builds; production sets variables externally
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = ServerConfig::from_env()?;
    info!("Bootstrapping blogdesk server");
    info!(data_dir = %cfg.data_dir.display(), uploads = %cfg.upload_dir.display(), "storage locations");

    let repo = build_repo(&cfg).await?;
    if let Some((username, password)) = &cfg.bootstrap_admin {
        ensure_admin(repo.as_ref(), username, password).await?;
    }

    let state = AppState {
        repo,
        image_store: Arc::new(FsImageStore::new(cfg.upload_dir.clone())),
        jwt: JwtKeys::new(cfg.jwt_secret.as_bytes()),
        login_limiter: Some(LoginLimiter::new(InMemoryRateLimiter::new(true), cfg.login_limit.clone())),
    };
    let openapi = ApiDoc::openapi();
    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            // local dev servers
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .max_age(3600);
        if let Some(front) = &frontend_url {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&cfg.bind_addr)?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await?;
    Ok(())
}

#[cfg(not(feature = "postgres-store"))]
async fn build_repo(cfg: &ServerConfig) -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(blogdesk::repo::inmem::InMemRepo::open(&cfg.data_dir)?))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &ServerConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use anyhow::Context;
    use sqlx::postgres::PgPoolOptions;

    let db_url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new().max_connections(5).connect(db_url).await?;
    let repo = blogdesk::repo::pg::PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

async fn ensure_admin(repo: &dyn Repo, username: &str, password: &str) -> anyhow::Result<()> {
    if repo.find_user(username).await?.is_some() {
        return Ok(());
    }
    let new = NewUser { username: username.to_string(), password_hash: hash_password(password)?, role: Role::Admin };
    match repo.create_user(new).await {
        Ok(user) => info!(username = %user.username, "bootstrap admin created"),
        Err(e) => error!(error = %e, "failed to create bootstrap admin"),
    }
    Ok(())
}
