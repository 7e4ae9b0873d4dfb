//! REST API endpoints

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::capture::CameraFacing;
use crate::config::TrackerBackend;
use crate::{AppState, StatsSnapshot};

use super::sse;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub camera: CameraFacing,
    pub tracker: TrackerBackend,
    pub uptime_secs: u64,
    pub stats: StatsSnapshot,
}

/// Get current status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await;
    let camera = config.capture.facing;
    let tracker = config.tracker.backend;
    drop(config);

    ApiResponse::success(StatusResponse {
        version: crate::VERSION.to_string(),
        camera,
        tracker,
        uptime_secs: state.started_at.elapsed().as_secs(),
        stats: state.stats.snapshot(),
    })
}

/// Get the most recently applied pose, `null` before the first one
pub async fn get_pose(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ApiResponse::success(state.latest_pose())
}

/// Get current configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(config.clone())
}

/// SSE stream of applied poses
pub async fn pose_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    sse::create_pose_stream(state)
}
