//! Error types for calls to third-party services.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to the bot-check or questionnaire APIs.
#[derive(Debug, Error, Clone)]
pub enum ExternalError {
    /// The request did not finish within the configured timeout
    #[error("{service} timed out")]
    Timeout { service: &'static str },

    /// Network/HTTP request failed
    #[error("Failed to query {service}: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    /// Server returned something we could not interpret
    #[error("Unexpected response from {service}: {message}")]
    UnexpectedResponse {
        service: &'static str,
        message: String,
    },

    /// The bot-check service said the token is not valid
    #[error("Turnstile verification failed")]
    BotCheckRejected,

    /// No API key is configured for the requested questionnaire
    #[error("Invalid action")]
    UnknownSurvey,

    /// Required server-side setting is missing
    #[error("Configuration error: {what}")]
    NotConfigured { what: &'static str },

    /// The latest submission lacks fields the handshake needs
    #[error("Missing required field(s) in questionnaire response")]
    IncompleteSubmission,

    /// The questionnaire has no submission for the account
    #[error("No questionnaire submission found or submission invalid")]
    NoSubmission,

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    UrlError { message: String },
}

impl ExternalError {
    /// Classifies a reqwest failure, keeping timeouts distinct.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExternalError::Timeout { service }
        } else if err.is_decode() {
            ExternalError::UnexpectedResponse {
                service,
                message: err.to_string(),
            }
        } else {
            ExternalError::Network {
                service,
                message: err.to_string(),
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ExternalError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ExternalError::BotCheckRejected | ExternalError::NoSubmission => StatusCode::FORBIDDEN,
            ExternalError::UnknownSurvey | ExternalError::IncompleteSubmission => {
                StatusCode::BAD_REQUEST
            }
            ExternalError::UnexpectedResponse { .. } => StatusCode::BAD_GATEWAY,
            ExternalError::Network { .. }
            | ExternalError::NotConfigured { .. }
            | ExternalError::UrlError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to API clients.
    pub fn public_message(&self) -> String {
        match self {
            ExternalError::Network { service, .. } => format!("Failed to query {service}"),
            ExternalError::UnexpectedResponse { service, .. } => {
                format!("Unexpected response from {service}")
            }
            ExternalError::UrlError { .. } => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<url::ParseError> for ExternalError {
    fn from(err: url::ParseError) -> Self {
        ExternalError::UrlError {
            message: err.to_string(),
        }
    }
}
