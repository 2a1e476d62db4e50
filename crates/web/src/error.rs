//! HTTP error envelope
//!
//! Every failure leaves the API as `{success: false, error, details?}` with a
//! status chosen by the error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use testdeck_runner::RunnerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    NotFound {
        message: String,
        searched: Vec<String>,
    },

    #[error("{0}")]
    Busy(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{message}")]
    Upstream {
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            searched: Vec::new(),
        }
    }

    pub fn upstream(message: impl Into<String>, details: impl ToString) -> Self {
        ApiError::Upstream {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn internal(message: impl Into<String>, details: impl ToString) -> Self {
        ApiError::Internal {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Busy(_) | ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream { .. } | ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let mut body = json!({
            "success": false,
            "error": self.to_string(),
        });
        match &self {
            ApiError::NotFound { searched, .. } if !searched.is_empty() => {
                body["searchedLocations"] = json!(searched);
            }
            ApiError::Upstream { details: Some(details), .. }
            | ApiError::Internal { details: Some(details), .. } => {
                body["details"] = json!(details);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

impl From<RunnerError> for ApiError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::TestNotFound { path, searched } => ApiError::NotFound {
                message: format!("Test file not found: {}", path),
                searched: searched
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect(),
            },
            e @ (RunnerError::BaselineNotFound(_)
            | RunnerError::UnknownCheck(_)
            | RunnerError::VisualRegression(_)) => ApiError::not_found(e.to_string()),
            RunnerError::InvalidRequest(message) => ApiError::BadRequest(message),
            e @ RunnerError::Busy { .. } => ApiError::Busy(e.to_string()),
            e @ (RunnerError::Spawn { .. }
            | RunnerError::Playwright(_)
            | RunnerError::NoResult(_)
            | RunnerError::Cancelled) => ApiError::Upstream {
                message: e.to_string(),
                details: None,
            },
            e @ (RunnerError::Io(_) | RunnerError::Json(_) | RunnerError::Image(_)) => {
                ApiError::internal("Internal error", e)
            }
        }
    }
}

impl From<testdeck_common::Error> for ApiError {
    fn from(err: testdeck_common::Error) -> Self {
        ApiError::internal("Internal error", err)
    }
}
