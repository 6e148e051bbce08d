use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_macros::FromRequest;
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;
use crate::db::DbError;
use crate::external::ExternalError;

/// An error returned to API clients as `{"error": message}`.
///
/// `details` never reaches the client; server errors log it.
#[derive(Debug)]
pub struct ApiErrorType {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiErrorType {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(details: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An unexpected error occurred".to_string(),
            details: Some(details.to_string()),
        }
    }
}

impl<M: Into<String>> From<(StatusCode, M, Option<String>)> for ApiErrorType {
    fn from((status, message, details): (StatusCode, M, Option<String>)) -> Self {
        Self {
            status,
            message: message.into(),
            details,
        }
    }
}

impl From<AuthError> for ApiErrorType {
    fn from(err: AuthError) -> Self {
        Self {
            status: err.status_code(),
            message: err.public_message(),
            details: Some(err.to_string()),
        }
    }
}

impl From<ExternalError> for ApiErrorType {
    fn from(err: ExternalError) -> Self {
        Self {
            status: err.status_code(),
            message: err.public_message(),
            details: Some(err.to_string()),
        }
    }
}

impl From<DbError> for ApiErrorType {
    fn from(err: DbError) -> Self {
        let status = match err {
            DbError::InvalidVoteValue(_) => StatusCode::BAD_REQUEST,
            DbError::CourseNotFound | DbError::ReviewNotFound | DbError::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            DbError::DuplicateReview => StatusCode::FORBIDDEN,
            _ => return Self::internal(err),
        };
        Self::new(status, err.to_string())
    }
}

/// A JSON request body. Malformed bodies are rejected with a 400 and an
/// `{"error": message}` body like every other API error.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiErrorType))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiErrorType {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body".to_string(),
            JsonRejection::JsonDataError(_) => "Invalid request body".to_string(),
            JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".to_string(),
            _ => "Unable to read request body".to_string(),
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
            details: Some(rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                status = self.status.as_u16(),
                details = self.details.as_deref().unwrap_or(""),
                "{}",
                self.message
            );
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_client_statuses() {
        assert_eq!(
            ApiErrorType::from(DbError::InvalidVoteValue(9)).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiErrorType::from(DbError::CourseNotFound).status,
            StatusCode::NOT_FOUND
        );

        let hidden = ApiErrorType::from(DbError::Poisoned);
        assert_eq!(hidden.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hidden.message, "An unexpected error occurred");
    }

    #[test]
    fn test_auth_errors_keep_their_status() {
        let err = ApiErrorType::from(AuthError::TooManyAttempts);
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.message, "Too many verification attempts");

        let timeout = ApiErrorType::from(AuthError::External(ExternalError::Timeout {
            service: "Turnstile verification",
        }));
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);
    }
}
