//! HTTP mapping of core errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use hms_core::HmsError;

/// Wire shape of every error body: a stable category plus human detail.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

/// Wrapper giving [`HmsError`] an HTTP rendering.
#[derive(Debug)]
pub struct ApiError(HmsError);

impl From<HmsError> for ApiError {
    fn from(err: HmsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, category) = match &self.0 {
            HmsError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            HmsError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            HmsError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            HmsError::InvalidTransition { .. } => (StatusCode::BAD_REQUEST, "invalid_transition"),
            HmsError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            HmsError::Files(hms_files::FilesError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            HmsError::Files(hms_files::FilesError::InvalidName(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_argument")
            }
            HmsError::Storage(_) | HmsError::Files(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        }
        let body = ErrorBody {
            error: category.to_string(),
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (HmsError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (HmsError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                HmsError::InvalidArgument("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                HmsError::InvalidTransition {
                    from: "dispensed".into(),
                    to: "draft".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (HmsError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
