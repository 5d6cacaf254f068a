use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;

use crate::dispatch::{DispatchRequest, PassReport};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const DISPATCH_SECRET_HEADER: &str = "x-dispatch-secret";

/// Trigger for an external scheduler. Disabled (404) when no secret is
/// configured.
pub async fn run_scheduled(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<DispatchRequest>>,
) -> AppResult<Json<PassReport>> {
    let expected = state.dispatch_secret.as_deref().ok_or_else(AppError::not_found)?;
    let provided = headers
        .get(DISPATCH_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(AppError::unauthorized)?;
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(AppError::unauthorized());
    }

    let request = payload.map(|Json(value)| value).unwrap_or_default();
    let report = state.dispatcher.run(request, Utc::now()).await?;
    Ok(Json(report))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
