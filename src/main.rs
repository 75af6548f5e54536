// DWD Warnings v0.1
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use dwd_warnings::config::AppConfig;
use dwd_warnings::{errors, models, routes, services, Warning};

/// DWD Warnings OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "DWD Warnings",
        version = "0.1.0",
        description = "Polls the weather warning feed of the Deutscher Wetterdienst and \
            reports warnings for the configured locations.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Poller", description = "Background warning poller"),
        (name = "Warnings", description = "Current warnings for the configured locations"),
    ),
    paths(
        routes::health::health_check,
        routes::poller::get_poller_status,
        routes::poller::refresh_poller,
        routes::warnings::get_current_warnings,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::poller::PollerStatus,
            services::poller::PollStats,
            models::Warning,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dwd_warnings=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let poller = match config.build_poller() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Cannot create warning client: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Watching {} location patterns: {:?}",
        config.locations.len(),
        config.locations
    );

    let warnings = poller
        .start()
        .await
        .expect("Freshly built poller must be idle");
    let consumer = tokio::spawn(announce_warnings(warnings));

    // CORS: status API, GET for reads and POST for refresh
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/poller/status",
            get(routes::poller::get_poller_status),
        )
        .route(
            "/api/v1/poller/refresh",
            post(routes::poller::refresh_poller),
        )
        .route(
            "/api/v1/warnings",
            get(routes::warnings::get_current_warnings),
        )
        .with_state(poller.clone())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server terminated unexpectedly");

    tracing::info!("Shutting down poller");
    if let Err(e) = poller.stop().await {
        tracing::error!("Failed to stop poller: {}", e);
    }
    if let Err(e) = consumer.await {
        tracing::error!("Warning consumer ended abnormally: {}", e);
    }
}

/// Log every warning once per `unique_id` until it expires.
async fn announce_warnings(mut rx: mpsc::Receiver<Warning>) {
    let mut announced: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();

    while let Some(w) = rx.recv().await {
        let now = Utc::now();
        announced.retain(|_, end| end.map_or(true, |e| e > now));

        let key = w.unique_id();
        if announced.contains_key(&key) {
            tracing::debug!("Already announced {}", key);
            continue;
        }

        let until = w
            .end
            .map(|e| e.format("%d.%m. %H:%M").to_string())
            .unwrap_or_else(|| "further notice".to_string());
        tracing::info!(
            category = w.category_id,
            level = w.level,
            "{}: {} (from {} until {})",
            w.location,
            w.headline,
            w.start.format("%d.%m. %H:%M"),
            until
        );

        announced.insert(key, w.end);
    }

    tracing::info!("Warning queue closed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
