use axum::{extract::State, http::StatusCode, response::Json};
use diesel::{sql_query, RunQueryDsl};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// Liveness plus a database round trip.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.db() {
        Ok(mut conn) => match sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => "ok",
            Err(err) => {
                warn!(error = %err, "health check query failed");
                "unavailable"
            }
        },
        Err(err) => {
            warn!(error = %err, "health check could not reach the pool");
            "unavailable"
        }
    };

    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "status": database, "database": database })))
}
