use anyhow::Context;
use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod content;
pub mod dispatch;
pub mod health;
pub mod history;
pub mod newsletter;
pub mod preferences;

pub fn create_router(state: AppState) -> Router<()> {
    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route(
            "/api/preferences",
            get(preferences::get_preferences).put(preferences::save_preferences),
        )
        .route("/api/content/send-now", post(content::send_now))
        .route("/api/content/preview", post(content::preview))
        .route("/api/history", get(history::list_history))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/newsletter/subscribe", post(newsletter::subscribe))
        .route("/api/dispatch/scheduled", post(dispatch::run_scheduled))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 64))
}

/// Restricts CORS to the comma-separated origin list, or mirrors the request
/// origin when none is configured.
pub fn cors_layer(allowed_origins: Option<&str>) -> anyhow::Result<CorsLayer> {
    let allow_origin = match allowed_origins {
        Some(origins) => {
            let headers = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| {
                    value
                        .parse::<HeaderValue>()
                        .with_context(|| format!("invalid CORS allowed origin `{value}`"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}
