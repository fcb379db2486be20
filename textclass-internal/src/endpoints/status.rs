use axum::debug_handler;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::gateway_util::{AppState, AppStateData};

pub const TEXTCLASS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A handler for a simple liveness check
#[debug_handler(state = AppStateData)]
pub async fn status_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": TEXTCLASS_VERSION }))
}

/// A handler for a readiness check. The classifier is loaded before the server binds,
/// so any running gateway reports it as available.
#[debug_handler(state = AppStateData)]
pub async fn health_handler(State(app_state): AppState) -> Json<Value> {
    Json(json!({ "gateway": "ok", "classifier": app_state.classifier.describe() }))
}
