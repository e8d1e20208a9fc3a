use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod feed;
mod models;
mod openapi;
mod rate_limit;
mod repo;
mod routes;
mod security;
mod session;
mod storage;

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use repo::inmem::InMemRepo;

use openapi::ApiDoc;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use routes::{config, install_metrics, AppState};
use security::SecurityHeaders;
use session::SessionHub;
use std::sync::Arc;
use storage::build_file_store;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

// Vite dev server and the containerized nginx frontend.
const DEV_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Configuration comes from the environment (shell, systemd, Docker).
    // A .env file is honored in debug builds only.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping classlink server");
    info!(
        "File store backend: {}",
        std::env::var("FILE_STORE").unwrap_or_else(|_| "fs".to_string())
    );
    info!(
        "Frontend URL: {}",
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string())
    );

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory document store");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool_size = std::env::var("PG_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect_lazy(&db_url)
            .expect("could not configure Postgres pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("database migrations failed");
        info!("Using Postgres document store");
        crate::repo::pg::PgRepo::new(pool)
    };

    // Global Prometheus recorder for the /metrics endpoint
    install_metrics();

    let openapi = ApiDoc::openapi();
    let file_store = build_file_store().await; // FS or S3 depending on env
    let sessions = SessionHub::new();
    let limiter = RateLimiterFacade::new(
        InMemoryRateLimiter::new(rate_limit_enabled()),
        RateLimitConfig::from_env(),
    );

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            for origin in DEV_ORIGINS {
                c = c.allowed_origin(origin);
            }
            // A deployed frontend announces itself through FRONTEND_URL.
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
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                file_store: file_store.clone(),
                sessions: sessions.clone(),
                limiter: limiter.clone(),
            }))
    })
    .bind(("0.0.0.0", 8080))?; // all interfaces so a frontend container can reach us

    info!("Listening on 0.0.0.0:8080");

    server.run().await
}

fn rate_limit_enabled() -> bool {
    std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

/// Refuses to start on configuration that would only fail later.
fn validate_env_vars() {
    use std::env;

    match env::var("JWT_SECRET") {
        Err(_) => {
            eprintln!("JWT_SECRET is not set");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
        Ok(secret) if secret.len() < 32 => {
            eprintln!("JWT_SECRET must be at least 32 bytes");
            std::process::exit(1);
        }
        Ok(_) => {}
    }

    // S3 without an endpoint fails on the first upload, so say it now.
    if env::var("FILE_STORE").as_deref() == Ok("s3") && env::var("S3_ENDPOINT").is_err() {
        eprintln!("Warning: FILE_STORE=s3 but S3_ENDPOINT is not set");
        eprintln!("File uploads will fail until the S3/MinIO endpoint is configured");
    }
}
