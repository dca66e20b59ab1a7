//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a store failure, prefixing execution errors with what was attempted
    /// (e.g. "Failed to add rule").
    pub fn from_store(err: StoreError, attempted: &str) -> Self {
        match err {
            StoreError::RuleNotFound(_) | StoreError::RouteNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::Invalid(msg) => ApiError::BadRequest(msg),
            StoreError::Exec(e) => ApiError::Internal(format!("{attempted}: {e}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
