//! Pairing relay HTTP server.
//!
//! Decouples pairing-code generation from the bot's own runtime so a
//! separate web UI can request and poll codes. Built on axum with a
//! permissive CORS layer, since the UI is served from another origin.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::RelayConfig;
use crate::pairing::{PairingError, PairingRegistry, PairingStatus};

/// How often the background sweep purges expired codes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Shared state for the relay request handlers.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<PairingRegistry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PairingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub code: String,
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub active_pairings: usize,
}

/// Build the relay router.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/api/generate-code", post(generate_code))
        .route("/api/check-status/{code}", get(check_status))
        .route("/api/complete-pairing", post(complete_pairing))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn generate_code(
    State(state): State<RelayState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    match state.registry.generate(&request.phone_number) {
        Ok(code) => {
            log::info!("generated pairing code for {}", request.phone_number);
            (
                StatusCode::OK,
                Json(GenerateResponse {
                    success: true,
                    code: Some(code),
                    message: "Pairing code generated successfully".into(),
                }),
            )
                .into_response()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(GenerateResponse {
                success: false,
                code: None,
                message: err.to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn check_status(
    State(state): State<RelayState>,
    Path(code): Path<String>,
) -> Response {
    match state.registry.check_status(&code) {
        Ok((status, phone_number)) => (
            StatusCode::OK,
            Json(StatusResponse {
                success: true,
                status: Some(status),
                phone_number: Some(phone_number),
                message: "Pairing code is valid".into(),
            }),
        )
            .into_response(),
        Err(err) => {
            let status = match err {
                PairingError::Expired => StatusCode::GONE,
                _ => StatusCode::NOT_FOUND,
            };
            (
                status,
                Json(StatusResponse {
                    success: false,
                    status: None,
                    phone_number: None,
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn complete_pairing(
    State(state): State<RelayState>,
    Json(request): Json<CompleteRequest>,
) -> Response {
    match state.registry.complete(&request.code, &request.phone_number) {
        Ok(()) => {
            log::info!("pairing completed for {}", request.phone_number);
            (
                StatusCode::OK,
                Json(CompleteResponse {
                    success: true,
                    message: "Pairing completed successfully".into(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            let status = match err {
                PairingError::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(CompleteResponse {
                    success: false,
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn health(State(state): State<RelayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        timestamp: Utc::now().to_rfc3339(),
        active_pairings: state.registry.active_count(),
    })
}

/// Spawn the periodic expiry sweep for the lifetime of the process.
pub fn spawn_sweep_task(registry: Arc<PairingRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = registry.purge_expired();
            if removed > 0 {
                log::info!("purged {removed} expired pairing codes");
            }
        }
    })
}

/// Bind and serve the relay until the process exits.
pub async fn serve(config: &RelayConfig, registry: Arc<PairingRegistry>) -> Result<(), RelayError> {
    spawn_sweep_task(Arc::clone(&registry));

    let app = router(RelayState { registry });
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;

    log::info!("pairing relay listening on {addr}");
    axum::serve(listener, app).await.map_err(RelayError::Serve)
}
