use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::core::GeneratorError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// The body did not deserialize into the route's request type.
    #[error("{}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Generator(GeneratorError::UnknownGenerator(_)) => StatusCode::NOT_FOUND,
            ApiError::Generator(GeneratorError::UnsupportedOperation { .. }) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody(rejection) => rejection.status(),
            ApiError::Generator(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Generator(GeneratorError::UnknownGenerator(_)) => "not_found_error",
            ApiError::Generator(GeneratorError::UnsupportedOperation { .. }) | ApiError::InvalidBody(_) => {
                "invalid_request_error"
            }
            _ => "server_error",
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Generator(GeneratorError::UnknownGenerator(_)) => "model_not_found",
            ApiError::Generator(GeneratorError::NotLoaded(_)) => "model_not_loaded",
            ApiError::Generator(GeneratorError::BackendInitialization { .. }) => "model_load_failed",
            ApiError::Generator(GeneratorError::UnsupportedOperation { .. }) => "unsupported_operation",
            ApiError::Generator(GeneratorError::Backend(_)) => "generation_failed",
            ApiError::InvalidBody(_) => "invalid_request_body",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
            "The server failed to process the request".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": {
                "message": message,
                "type": self.error_type(),
                "code": self.code(),
            }
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GeneratorError::UnknownGenerator("x".into()), StatusCode::NOT_FOUND),
            (GeneratorError::NotLoaded("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                GeneratorError::BackendInitialization {
                    checkpoint: "x".into(),
                    source: anyhow::anyhow!("boom"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GeneratorError::UnsupportedOperation {
                    operation: "embeddings",
                    checkpoint: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (GeneratorError::Backend(anyhow::anyhow!("oom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.is_client_error(), status.is_client_error());
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(ApiError::Internal("join".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
