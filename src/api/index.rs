//! Unauthenticated entry point

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::AppState;

/// GET /
///
/// Exposes the configured client id, e.g. for a client-side login button.
pub async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "client_id": state.config.oauth.client_id,
    }))
}
