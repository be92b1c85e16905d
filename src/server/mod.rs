//! HTTP server.
//!
//! Routes:
//! - `GET  /healthz`
//! - `GET  /api/health`
//! - `POST /api/forms`
//! - `GET  /api/forms/{id}`
//! - `PUT  /api/forms/{id}`
//! - `POST /api/forms/{id}/responses`
//! - `GET  /api/forms/{id}/analytics`
//! - `GET  /api/forms/{id}/analytics/stream` (Server-Sent Events)
//! - `POST /api/seed`

mod error;
mod routes;
mod stream;

use crate::config::ServerConfig;
use crate::live::LiveAnalytics;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub live: LiveAnalytics,
    pub started: Instant,
    pub keep_alive: Duration,
    pub seed_responses: usize,
}

impl AppState {
    pub fn new(live: LiveAnalytics, keep_alive: Duration, seed_responses: usize) -> Self {
        Self {
            live,
            started: Instant::now(),
            keep_alive,
            seed_responses,
        }
    }
}

/// CORS policy admitting only the configured dashboard origin.
fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid allowed origin: {}", origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT]))
}

/// Build the application router.
pub fn build_router(state: AppState, config: &ServerConfig) -> Result<Router> {
    let api = Router::new()
        .route("/health", get(routes::api_health))
        .route("/forms", post(routes::create_form))
        .route("/forms/{id}", get(routes::get_form).put(routes::update_form))
        .route("/forms/{id}/responses", post(routes::submit_response))
        .route("/forms/{id}/analytics", get(routes::get_analytics))
        .route("/forms/{id}/analytics/stream", get(stream::analytics_stream))
        .route("/seed", post(routes::seed_demo));

    Ok(Router::new()
        .route("/healthz", get(routes::healthz))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors_layer(&config.allowed_origin)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// Open analytics streams must be ended by the caller as part of
/// `shutdown`, otherwise graceful shutdown waits on them.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
