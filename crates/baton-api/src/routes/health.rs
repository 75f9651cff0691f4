use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_runs: usize,
    pub services: HashMap<String, String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Health check endpoint
///
/// Reports "degraded" rather than failing when the store is unreachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut services = HashMap::new();

    let status = match state.store.health_check().await {
        Ok(()) => {
            services.insert("store".to_string(), "connected".to_string());
            "healthy"
        }
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            services.insert("store".to_string(), "disconnected".to_string());
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: state.lifecycle.active_runs(),
        services,
        checked_at: chrono::Utc::now(),
    })
}
