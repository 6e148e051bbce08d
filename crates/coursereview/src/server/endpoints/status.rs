use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::types::AppState;

/// GET /health
///
/// Reports whether the database answers, plus cache store statistics.
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /health");

    let stats = s.store.stats();
    match s.db.count_reviews() {
        Ok(reviews) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "reviews": reviews,
                "store": stats,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "error": e.to_string(),
                "store": stats,
            })),
        )
            .into_response(),
    }
}
