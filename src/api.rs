// src/api.rs
//! Control surface: read the alert feed, trigger a cycle, inspect status, register devices.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::coordinator::{AnalysisCoordinator, CycleStatus, Provenance, TriggerOutcome};
use crate::model::AlertRecord;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<AnalysisCoordinator>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(coordinator: Arc<AnalysisCoordinator>) -> Self {
        Self {
            coordinator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/alerts", get(get_alerts))
        .route("/refresh", post(refresh))
        .route("/status", get(status))
        .route("/devices", post(register_device))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"message": "Market Impact Alerts API is running"}))
}

async fn get_alerts(State(state): State<AppState>) -> Json<Vec<AlertRecord>> {
    let alerts = state.coordinator.alerts();
    tracing::debug!(target: "api", count = alerts.len(), "returning alerts");
    Json(alerts.as_ref().clone())
}

/// Runs a USER REQUESTED cycle and returns the feed afterwards. A cycle that failed
/// internally still answers 200 with the (unchanged) feed; only a concurrent cycle is
/// reported, as 409.
async fn refresh(State(state): State<AppState>) -> Response {
    tracing::info!(target: "api", "user refresh requested");
    match state.coordinator.trigger(Provenance::UserRequested).await {
        TriggerOutcome::Accepted(report) => {
            tracing::info!(target: "api", outcome = ?report.outcome, admitted = report.admitted, "refresh finished");
            Json(state.coordinator.alerts().as_ref().clone()).into_response()
        }
        TriggerOutcome::Busy => (StatusCode::CONFLICT, Json(json!({"status": "busy"}))).into_response(),
    }
}

async fn status(State(state): State<AppState>) -> Json<CycleStatus> {
    Json(state.coordinator.status())
}

#[derive(Deserialize)]
struct DeviceReq {
    #[serde(alias = "token", alias = "device_token")]
    device_id: String,
}

#[derive(Serialize)]
struct DeviceResp {
    status: &'static str,
    devices: usize,
}

async fn register_device(State(state): State<AppState>, Json(body): Json<DeviceReq>) -> Response {
    let devices = state.coordinator.devices();
    let mut set = devices.lock().await;
    match set.register(&body.device_id) {
        Ok(added) => {
            tracing::info!(target: "api", added, devices = set.len(), "device registration");
            let status = if added { "registered" } else { "already_registered" };
            (StatusCode::OK, Json(DeviceResp { status, devices: set.len() })).into_response()
        }
        Err(e) if e.is_invalid() => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response()
        }
        Err(e) => {
            tracing::error!(target: "api", error = %e, "device registry write failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "device registry unavailable"})))
                .into_response()
        }
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
