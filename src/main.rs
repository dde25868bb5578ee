use actix_web::{App, HttpServer, middleware::Compress};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod conversation;
mod error;
#[cfg(feature = "sqlite-store")]
mod migrate;
mod models;
mod openapi;
mod rate_limit;
mod repo;
mod routes;
mod security;
mod topics;

#[cfg(all(feature = "inmem-store", not(feature = "sqlite-store")))]
use repo::inmem::InMemRepo;
use openapi::ApiDoc;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use repo::{IdentityRepo, Repo, RepoError};
use routes::{config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, etc.)
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping mobius server");

    let admin_handle = std::env::var("ADMIN_HANDLE").unwrap_or_else(|_| "admin".to_string());
    info!("Admin handle: {admin_handle}");

    #[cfg(all(feature = "inmem-store", not(feature = "sqlite-store")))]
    let repo: Arc<dyn Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(InMemRepo::new())
    };

    #[cfg(feature = "sqlite-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::sqlite::SqlitePoolOptions;
        let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for sqlite-store");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .expect("Failed to open sqlite database");
        migrate::run(&pool).await.expect("Schema migration failed");
        info!("Using sqlite repository backend");
        Arc::new(repo::sqlite::SqliteRepo::new(pool))
    };

    seed_admin(repo.as_ref(), &admin_handle).await;

    let rate = RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env());
    let app_state = AppState { repo, admin_handle, rate };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(app_state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Register the admin identity on first start when ADMIN_PASSWORD is set.
/// Admin authority itself is just handle equality, so a missing seed only
/// means the admin logs in like anyone else once registered.
async fn seed_admin(repo: &dyn Repo, admin_handle: &str) {
    let password = match std::env::var("ADMIN_PASSWORD") {
        Ok(p) if !p.trim().is_empty() => p,
        _ => return,
    };
    match IdentityRepo::get_identity(repo, admin_handle).await {
        Ok(_) => return,
        Err(RepoError::NotFound) => {}
        Err(e) => {
            warn!("admin lookup failed: {e}");
            return;
        }
    }
    let digest = match auth::hash_password(password.trim()) {
        Ok(d) => d,
        Err(e) => {
            warn!("admin seeding failed: {e}");
            return;
        }
    };
    match IdentityRepo::create_identity(repo, admin_handle, &digest).await {
        Ok(_) => info!("Seeded admin identity '{admin_handle}'"),
        // lost a race with a concurrent start; the row exists, which is all we need
        Err(RepoError::Conflict) => {}
        Err(e) => warn!("admin seeding failed: {e}"),
    }
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    for var in ["JWT_SECRET"] {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    if env::var("ADMIN_PASSWORD").is_err() {
        eprintln!("Warning: ADMIN_PASSWORD not set; the admin identity will not be seeded");
    }
}
