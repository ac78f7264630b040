//! HTTP wiring for the start coordinator
//!
//! `GET /getToken` issues the next [`StartToken`]; `GET /health` reports how
//! many tokens have gone out. Browsers may call both from any origin.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Method};
use axum::routing::get;
use axum::{Json, Router};
use connbench_core::StartToken;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::CoordinatorError;
use crate::service::{CoordinatorConfig, StartCoordinator};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Token issuer
    pub coordinator: Arc<StartCoordinator>,
}

/// `GET /health` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Always `ok` while the service answers
    pub status: String,
    /// Tokens issued since start
    pub issued: u64,
}

/// Build the coordinator router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/getToken", get(get_token))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_token(State(state): State<AppState>) -> Result<Json<StartToken>, CoordinatorError> {
    let token = state.coordinator.issue()?;
    tracing::info!(
        client_start = token.client_start,
        time_start = token.time_start,
        "Issued start token"
    );
    Ok(Json(token))
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        issued: state.coordinator.issued(),
    })
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(config: &CoordinatorConfig, shutdown: F) -> Result<(), CoordinatorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| CoordinatorError::Bind {
            addr: config.bind,
            source,
        })?;
    let coordinator = Arc::new(StartCoordinator::new(config));

    serve_on(listener, coordinator, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_on<F>(
    listener: TcpListener,
    coordinator: Arc<StartCoordinator>,
    shutdown: F,
) -> Result<(), CoordinatorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Start coordinator listening");

    let app = build_router(AppState { coordinator });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Start coordinator stopped");
    Ok(())
}
