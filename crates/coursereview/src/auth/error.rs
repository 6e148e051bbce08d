//! Error types for the OTP handshake.

use axum::http::StatusCode;
use thiserror::Error;

use super::password::PasswordError;
use crate::external::ExternalError;
use crate::store::StoreError;

/// Reasons a handshake step can fail. The client restarts the handshake
/// after any of these; nothing is retried server-side.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    MissingFields(&'static str),

    #[error("Invalid action")]
    InvalidAction,

    #[error("No temp_token found")]
    NoTempToken,

    #[error("Temp token state not found or expired")]
    StateNotFound,

    #[error("Invalid temp token state data")]
    InvalidStateData,

    /// State exists but is not in the status this step expects
    #[error("Invalid temp token state")]
    InvalidState,

    /// Password step attempted before verification or for another action
    #[error("Invalid temp token state")]
    StateNotVerified,

    #[error("Action mismatch")]
    ActionMismatch,

    #[error("Too many verification attempts")]
    TooManyAttempts,

    #[error("Answer ID mismatch")]
    AnswerIdMismatch,

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("Invalid OTP data format")]
    InvalidOtpData,

    #[error("Invalid temp_token")]
    TempTokenMismatch,

    #[error("Submission timestamp outside validity window")]
    OutsideWindow,

    #[error("Invalid submission timestamp")]
    InvalidTimestamp,

    #[error("No account in verified state")]
    NoAccount,

    #[error("Something went wrong when fetching the survey URL")]
    SurveyUrlMissing,

    #[error("{0}")]
    WeakPassword(#[from] PasswordError),

    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error("Failed to encode handshake record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingFields(_) | AuthError::InvalidAction | AuthError::WeakPassword(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::NoTempToken
            | AuthError::StateNotFound
            | AuthError::InvalidStateData
            | AuthError::InvalidState
            | AuthError::InvalidOtp
            | AuthError::InvalidOtpData
            | AuthError::TempTokenMismatch
            | AuthError::OutsideWindow
            | AuthError::InvalidTimestamp
            | AuthError::NoAccount => StatusCode::UNAUTHORIZED,
            AuthError::StateNotVerified
            | AuthError::ActionMismatch
            | AuthError::AnswerIdMismatch => StatusCode::FORBIDDEN,
            AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AuthError::SurveyUrlMissing
            | AuthError::Hashing(_)
            | AuthError::Encode(_)
            | AuthError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthError::External(e) => e.status_code(),
        }
    }

    /// Message safe to show to API clients.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::External(e) => e.public_message(),
            AuthError::Hashing(_) | AuthError::Encode(_) | AuthError::Store(_) => {
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}
