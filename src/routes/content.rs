use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::generation::ContentArtifact;
use crate::preferences::ContentOverrides;
use crate::render::{render_preview, RenderedDelivery};
use crate::state::AppState;
use crate::template::Template;
use crate::tone::Tone;

#[derive(Serialize)]
pub struct SendNowResponse {
    pub content: ContentArtifact,
}

pub async fn send_now(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<ContentOverrides>>,
) -> AppResult<Json<SendNowResponse>> {
    let overrides = payload.map(|Json(value)| value).unwrap_or_default();
    let now = Utc::now();

    let stored = state.preferences.get(&user.user_id).await?;
    let record = overrides.resolve(stored, &user.user_id, &user.email, now.naive_utc())?;
    state.require_entitlement(&record.email).await?;

    let content = state.dispatcher.send_now(&record, now).await?;
    Ok(Json(SendNowResponse { content }))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub template: Option<String>,
    pub tone: Option<String>,
    pub industry: String,
}

pub async fn preview(Json(payload): Json<PreviewRequest>) -> AppResult<Json<RenderedDelivery>> {
    let industry = payload.industry.trim();
    if industry.is_empty() {
        return Err(AppError::bad_request("industry is required"));
    }
    let template = match payload.template.as_deref() {
        Some(raw) => Template::parse_legacy(raw).map_err(|err| AppError::bad_request(err.to_string()))?,
        None => Template::default(),
    };
    let tone = payload
        .tone
        .as_deref()
        .and_then(Tone::parse)
        .unwrap_or(Tone::Professional);

    Ok(Json(render_preview(
        template,
        &tone,
        industry,
        Utc::now().date_naive(),
    )?))
}
