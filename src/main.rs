//! Librain Server - Library Loan Management System

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use librain_server::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Librain Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let repository = Repository::new(pool);
    let services = Services::new(
        repository,
        config.auth.clone(),
        config.email.clone(),
        &config.loans,
    );

    tracing::info!(
        loan_period_days = config.loans.loan_period_days,
        max_active_loans = config.loans.max_active_loans,
        require_approval = config.loans.require_approval,
        email = config.email.enabled,
        "Loan policy loaded"
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Console output (pretty or JSON), plus daily rotated files when a directory is set
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("librain_server={},tower_http=debug", logging.level).into());

    let console = if logging.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (file, guard) = match logging.directory.as_deref() {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "librain.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/me", get(api::auth::me))
        // Books
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route("/books/genres", get(api::books::list_genres))
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        // Reader workflow
        .route(
            "/books/:id/loan",
            get(api::loans::get_book_loan)
                .post(api::loans::request_loan)
                .delete(api::loans::cancel_request),
        )
        .route("/books/:id/return", post(api::loans::request_return))
        .route("/books/:id/renew", post(api::loans::renew_loan))
        .route(
            "/books/:id/queue",
            get(api::loans::get_book_queue)
                .post(api::loans::join_queue)
                .delete(api::loans::leave_queue),
        )
        // Reviews
        .route(
            "/books/:id/reviews",
            get(api::reviews::list_reviews).put(api::reviews::upsert_review),
        )
        .route("/books/:id/rating", get(api::reviews::get_rating))
        .route("/reviews/:id", delete(api::reviews::delete_review))
        // Admin workflow
        .route("/admin/books/:id/approve-request", post(api::loans::approve_request))
        .route("/admin/books/:id/pickup", post(api::loans::confirm_pickup))
        .route("/admin/books/:id/approve-return", post(api::loans::approve_return))
        .route("/loans", get(api::loans::list_loans))
        // Users
        .route("/users", get(api::users::list_users))
        .route("/users/me", put(api::users::update_my_profile))
        .route("/users/me/favorites", get(api::users::list_favorites))
        .route(
            "/users/me/favorites/:book_id",
            put(api::users::add_favorite).delete(api::users::remove_favorite),
        )
        .route("/users/:id", get(api::users::get_user))
        .route("/users/:id/role", put(api::users::update_role))
        .route("/users/:id/loans", get(api::loans::get_user_loans))
        .route("/users/:id/history", get(api::loans::get_user_history))
        .route("/users/:id/queue", get(api::loans::get_user_queue))
        // Shelves
        .route("/shelves", get(api::shelves::list_shelves).post(api::shelves::create_shelf))
        .route(
            "/shelves/:id",
            get(api::shelves::get_shelf)
                .put(api::shelves::rename_shelf)
                .delete(api::shelves::delete_shelf),
        )
        .route("/shelves/:id/books", post(api::shelves::add_shelf_book))
        .route("/shelves/:id/books/:book_id", delete(api::shelves::remove_shelf_book))
        // Notifications
        .route("/notifications", get(api::notifications::list_notifications))
        .route("/notifications/unread-count", get(api::notifications::unread_count))
        .route("/notifications/read-all", post(api::notifications::mark_all_read))
        .route("/notifications/stream", get(api::notifications::stream))
        .route("/notifications/:id/read", post(api::notifications::mark_read))
        // Statistics
        .route("/stats", get(api::stats::get_stats))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use librain_server::config::{
        AuthConfig, DatabaseConfig, EmailConfig, LoansConfig, ServerConfig,
    };
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            email: EmailConfig::default(),
            loans: LoansConfig::default(),
        };
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .expect("lazy pool");
        let services = Services::new(
            Repository::new(pool),
            config.auth.clone(),
            config.email.clone(),
            &config.loans,
        );

        create_router(AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = test_app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_workflow_routes_require_token() {
        for (method, uri) in [
            ("POST", "/api/v1/books/1/loan"),
            ("DELETE", "/api/v1/books/1/loan"),
            ("POST", "/api/v1/books/1/queue"),
            ("POST", "/api/v1/books/1/return"),
            ("POST", "/api/v1/notifications/read-all"),
        ] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = test_app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_malformed_authorization_header() {
        let request = Request::post("/api/v1/books/1/loan")
            .header("Authorization", "Token abc")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = test_app()
            .oneshot(Request::get("/api/v1/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
