use log::error;
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Errors surfaced by the API handlers, each mapped to one status code
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing caller input
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(AuthError),
    /// The resource already exists
    #[error("{0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Anything unexpected; the source is logged, never returned
    #[error("Internal server error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => 400,
            ApiError::Auth(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> ApiResponse {
        if let ApiError::Internal(source) = &self {
            error!("internal error: {source}");
        }

        ApiResponse::error(self.status(), self.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Hash(_) => ApiError::Internal(Box::new(err)),
            err => ApiError::Auth(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(Box::new(err))
    }
}

/// Status plus JSON body, as handed back to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn created(body: Value) -> Self {
        Self::new(201, body)
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": message.into() }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `error` field of a failed response
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

impl From<Result<ApiResponse, ApiError>> for ApiResponse {
    fn from(result: Result<ApiResponse, ApiError>) -> Self {
        result.unwrap_or_else(ApiError::into_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(ApiError::validation("bad").status(), 400);
        assert_eq!(ApiError::Conflict("dup".into()).status(), 400);
        assert_eq!(ApiError::from(AuthError::Expired).status(), 401);
        assert_eq!(ApiError::NotFound("user").status(), 404);
        assert_eq!(ApiError::from(AuthError::Hash("boom".into())).status(), 500);
    }

    #[test]
    fn test_internal_details_not_surfaced() {
        let err = ApiError::Internal("disk on fire".into());
        let response = err.into_response();

        assert_eq!(response.status, 500);
        assert_eq!(response.error_message(), Some("Internal server error"));
    }

    #[test]
    fn test_auth_messages() {
        let response = ApiError::from(AuthError::Missing).into_response();
        assert_eq!(response.error_message(), Some("Unauthorized"));

        let response = ApiError::from(AuthError::BadSignature).into_response();
        assert_eq!(response.error_message(), Some("Invalid token"));
    }
}
