//! HTTP ingest server for the mode detector.
//!
//! This module provides an HTTP server that:
//! - Accepts motion samples, GPS speed and pressure from a phone client
//! - Feeds them through a running [`ModeDetector`]
//! - Serves the latest smoothed prediction and session statistics
//!
//! # Architecture
//!
//! ```text
//! Phone ──→ POST /samples, /speed, /pressure ──→ ModeDetector
//!                                                     ↓
//! Phone ←── GET /prediction, /stats ←──────── [latest event]
//! ```

use crate::collector::types::SensorReading;
use crate::config::Config;
use crate::detector::{DetectorState, ModeDetector, PredictionEvent};
use crate::stats::{create_shared_stats_with_persistence, StatsSnapshot};
use crate::DecisionTreeClassifier;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Detector settings
    pub detector: Config,
}

impl ServerConfig {
    pub fn new(port: u16, detector: Config) -> Self {
        Self { port, detector }
    }
}

/// Shared server state
pub struct ServerState {
    detector: ModeDetector,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        let stats = create_shared_stats_with_persistence(config.detector.stats_path());
        let detector = ModeDetector::with_parts(
            config.detector.clone(),
            Arc::new(DecisionTreeClassifier::default()),
            stats,
        );
        Self { detector }
    }

    fn shutdown(&self) {
        self.detector.cleanup();
        if let Err(e) = self.detector.stats().save() {
            tracing::warn!("Failed to save detection stats: {}", e);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedUpdate {
    /// GPS speed in m/s
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureUpdate {
    pub hpa: f64,
}

/// Response from ingest endpoints
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub accepted: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub detector: DetectorState,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub state: DetectorState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub stats: StatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_running() -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Detector is not running".to_string(),
            code: "NOT_RUNNING".to_string(),
        }),
    )
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        detector: state.detector.state(),
    })
}

/// POST /samples
///
/// Accepts a batch of motion readings in arrival order.
async fn samples(
    State(state): State<Arc<ServerState>>,
    Json(readings): Json<Vec<SensorReading>>,
) -> Result<Json<IngestResponse>, ApiError> {
    if !state.detector.is_running() {
        return Err(not_running());
    }

    let accepted = readings.len();
    for reading in readings {
        state.detector.submit_sample(reading);
    }
    tracing::debug!("Accepted {} samples", accepted);

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        accepted,
    }))
}

/// POST /speed
async fn speed(
    State(state): State<Arc<ServerState>>,
    Json(update): Json<SpeedUpdate>,
) -> Json<IngestResponse> {
    state.detector.update_location_speed(update.speed);
    Json(IngestResponse {
        status: "ok".to_string(),
        accepted: 1,
    })
}

/// POST /pressure
async fn pressure(
    State(state): State<Arc<ServerState>>,
    Json(update): Json<PressureUpdate>,
) -> Json<IngestResponse> {
    state.detector.update_pressure(update.hpa);
    Json(IngestResponse {
        status: "ok".to_string(),
        accepted: 1,
    })
}

/// GET /prediction
async fn prediction(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<PredictionEvent>, ApiError> {
    state.detector.latest().map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No window has completed yet".to_string(),
                code: "NO_PREDICTION".to_string(),
            }),
        )
    })
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        state: state.detector.state(),
        session_id: state.detector.session_id(),
        stats: state.detector.stats().snapshot(),
        fault: state.detector.fault().map(|e| e.to_string()),
    })
}

/// Run the HTTP server
///
/// Starts a detector that lives until the returned sender fires.
pub async fn run(config: ServerConfig) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config));
    state.detector.start()?;

    let app = Router::new()
        .route("/health", get(health))
        .route("/samples", post(samples))
        .route("/speed", post(speed))
        .route("/pressure", post(pressure))
        .route("/prediction", get(prediction))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Mode detector server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
        state.shutdown();
    });

    Ok((actual_addr, shutdown_tx))
}
