//! HTTP API Server
//!
//! Serves the sync protocol to peer instances plus a few status endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::sync::{Page, SyncCoordinator, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Shared application state
pub struct AppState {
    /// Replication coordinator
    pub coordinator: Arc<SyncCoordinator>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, coordinator: Arc<SyncCoordinator>) -> Self {
        let state = Arc::new(AppState { coordinator });
        Self { config, state }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/api/sync", get(handle_sync_info))
            .route("/api/sync/:table", get(handle_sync))
            .route("/health", get(handle_health))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Query string of a sync request
#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub last: String,
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_take")]
    pub take: u64,
}

fn default_take() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Sync overview response
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncInfoResponse {
    pub enabled: bool,
    pub tables: Vec<String>,
    pub sources: Vec<String>,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub sync_enabled: bool,
}

// ============ Handlers ============

async fn handle_sync(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(query): Query<SyncQuery>,
) -> Response {
    // Callers advance skip by their own take, so a page is never shortened
    if query.take == 0 || query.take > MAX_PAGE_SIZE {
        let message = format!("take must be between 1 and {}, got {}", MAX_PAGE_SIZE, query.take);
        return (StatusCode::BAD_REQUEST, Json(Page::failure(message))).into_response();
    }
    if i64::try_from(query.skip).is_err() {
        let message = format!("skip {} is out of range", query.skip);
        return (StatusCode::BAD_REQUEST, Json(Page::failure(message))).into_response();
    }

    match state
        .coordinator
        .retrieve(&table, &query.last, query.skip, query.take)
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            let status = match e {
                Error::SyncDisabled => StatusCode::SERVICE_UNAVAILABLE,
                Error::TableNotRegistered(_) => StatusCode::NOT_FOUND,
                _ => {
                    tracing::error!("Sync request for {} failed: {}", table, e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Json(Page::failure(e.to_string()))).into_response()
        }
    }
}

async fn handle_sync_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SyncInfoResponse {
        enabled: state.coordinator.is_enabled(),
        tables: state.coordinator.tables().to_vec(),
        sources: state.coordinator.registered_sources(),
    })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        sync_enabled: state.coordinator.is_enabled(),
    })
}
