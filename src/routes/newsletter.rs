use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub first_name: Option<String>,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    state
        .mailing_list
        .subscribe(&payload.email, payload.first_name.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(json!({ "status": "subscribed" }))))
}
