use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;

use crate::{
    audience::AudienceError,
    db::StoreError,
    dispatch::{DeliveryError, DispatchError},
    generation::GenerationError,
    mailer::TransportError,
    preferences::ValidationError,
    render::RenderError,
};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn bad_gateway<E: Display>(error: E) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, error.to_string())
    }

    pub fn internal<E: Display>(error: E) -> Self {
        error!(error = %error, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Database(diesel::result::Error::NotFound) => AppError::not_found(),
            other => AppError::internal(other),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(value: GenerationError) -> Self {
        AppError::bad_gateway(value)
    }
}

impl From<TransportError> for AppError {
    fn from(value: TransportError) -> Self {
        AppError::bad_gateway(value)
    }
}

impl From<AudienceError> for AppError {
    fn from(value: AudienceError) -> Self {
        match value {
            AudienceError::Validation(err) => err.into(),
            other => AppError::bad_gateway(other),
        }
    }
}

impl From<RenderError> for AppError {
    fn from(value: RenderError) -> Self {
        AppError::internal(value)
    }
}

impl From<DeliveryError> for AppError {
    fn from(value: DeliveryError) -> Self {
        match value {
            DeliveryError::Generation(err) => err.into(),
            DeliveryError::Transport(err) => err.into(),
            DeliveryError::Render(err) => err.into(),
            DeliveryError::Store(err) | DeliveryError::Unrecorded(err) => err.into(),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Preferences(err) => err.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}
