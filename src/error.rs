use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::api_connection::ApiConnectionError;
use crate::recipe_provider::ProviderError;

pub const QUOTA_MESSAGE: &str = "The recipe service has reached its daily request limit. Please try again tomorrow or contact support for assistance.";
pub const RATE_LIMIT_MESSAGE: &str = "The service rate limit was exceeded. Please try again later.";
pub const CONFIGURATION_MESSAGE: &str = "AI service API key is missing. Please contact the administrator.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", QUOTA_MESSAGE)]
    ProviderQuota,

    #[error("{}", RATE_LIMIT_MESSAGE)]
    ProviderRateLimit,

    /// Any other upstream failure, with the user-facing "try again" text.
    #[error("{0}")]
    Provider(&'static str),

    #[error("{}", CONFIGURATION_MESSAGE)]
    Configuration,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classifies a recipe provider failure, logging it with its context.
    pub fn from_provider(err: &ProviderError, fallback: &'static str) -> Self {
        error!(operation = err.operation(), status = ?err.status(), "recipe provider failure: {err}");

        if err.is_quota_exceeded() {
            Self::ProviderQuota
        } else if err.is_rate_limited() {
            Self::ProviderRateLimit
        } else {
            Self::Provider(fallback)
        }
    }

    /// Classifies an AI provider failure, logging it with its context.
    pub fn from_assistant(provider: &str, err: &ApiConnectionError, fallback: &'static str) -> Self {
        error!(provider, status = ?err.status(), "AI provider failure: {err}");

        match err {
            ApiConnectionError::MissingApiKey(_) => Self::Configuration,
            _ if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) => Self::ProviderRateLimit,
            ApiConnectionError::ApiError { error_body, .. }
                if error_body.to_lowercase().contains("rate limit") =>
            {
                Self::ProviderRateLimit
            }
            _ if err.status() == Some(StatusCode::PAYMENT_REQUIRED) => Self::ProviderQuota,
            _ => Self::Provider(fallback),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderQuota => StatusCode::PAYMENT_REQUIRED,
            AppError::ProviderRateLimit => StatusCode::TOO_MANY_REQUESTS,
            AppError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
