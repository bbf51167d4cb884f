//! HTTP front for the review snapshot.
//!
//! `GET /api/critiques` answers from an in-memory cache. A stale cache is
//! still served while a single background refresh runs; an empty cache is
//! filled from the store, or by crawling inline as a last resort.
mod state;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use critique_reviews::Snapshot;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub use state::{AppState, CachedSnapshot, RefreshPolicy};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/critiques", get(critiques))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(target: "api.server", %addr, "server.listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Scrape(String),
    Unavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Scrape(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Erreur lors du scraping",
                    message: Some(message),
                },
            ),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "Aucune donnée disponible",
                    message: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

async fn critiques(State(state): State<AppState>) -> Result<Json<Arc<Snapshot>>, ApiError> {
    if let Some(cached) = state.cached().await {
        if !cached.is_fresh(state.policy().ttl) {
            state.spawn_refresh();
        }
        return Ok(Json(cached.snapshot.clone()));
    }

    if let Some(cached) = state.preload().await {
        return Ok(Json(cached.snapshot.clone()));
    }

    info!(target: "api.critiques", "cache.empty.scraping");
    match state.refresh().await {
        Ok(Some(cached)) => Ok(Json(cached.snapshot.clone())),
        // Another request is already crawling.
        Ok(None) => Err(ApiError::Unavailable),
        Err(err) => {
            warn!(target: "api.critiques", error = %err, "scrape.failed");
            Err(ApiError::Scrape(err.to_string()))
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cached = state.cached().await;
    let ttl = state.policy().ttl;
    Json(json!({
        "status": "ok",
        "cache_valid": cached.as_ref().is_some_and(|c| c.is_fresh(ttl)),
        "total_reviews": cached.as_ref().map_or(0, |c| c.snapshot.count()),
    }))
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "message": "API SensCritique",
        "endpoints": {
            "/api/critiques": "GET - Récupère toutes les critiques",
            "/api/health": "GET - Vérifie l'état de l'API",
        },
    }))
}
