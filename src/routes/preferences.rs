use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::auth::AuthenticatedUser;
use crate::dispatch::DispatchRequest;
use crate::error::{AppError, AppResult};
use crate::preferences::{PreferenceDraft, PreferenceRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SavePreferencesRequest {
    #[serde(flatten)]
    pub draft: PreferenceDraft,
    #[serde(default)]
    pub force_send_today: bool,
}

pub async fn get_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<PreferenceRecord>> {
    let record = state
        .preferences
        .get(&user.user_id)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(record))
}

pub async fn save_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SavePreferencesRequest>,
) -> AppResult<Json<PreferenceRecord>> {
    let record = payload
        .draft
        .into_record(&user.user_id, &user.email, Utc::now().naive_utc())?;
    state.require_entitlement(&record.email).await?;

    let saved = state.preferences.upsert(record).await?;
    info!(user_id = %saved.user_id, auto_generate = saved.auto_generate, "saved preferences");

    if payload.force_send_today {
        let dispatcher = state.dispatcher.clone();
        let user_id = saved.user_id.clone();
        tokio::spawn(async move {
            let request = DispatchRequest {
                user_ids: Some(vec![user_id.clone()]),
                force_send_today: true,
            };
            match dispatcher.run(request, Utc::now()).await {
                Ok(report) => info!(
                    %user_id,
                    processed = report.processed,
                    already_delivered = report.already_delivered,
                    failed = report.failed.len(),
                    "forced dispatch finished"
                ),
                Err(err) => error!(%user_id, error = %err, "forced dispatch failed"),
            }
        });
    }

    Ok(Json(saved))
}
