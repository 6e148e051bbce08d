//! Clients for the third-party services the auth handshake depends on.
//!
//! Both services sit behind traits so the handshake can be exercised
//! against in-process fakes.

mod error;
mod questionnaire;
mod turnstile;

pub use error::ExternalError;
pub use questionnaire::{extract_submission, ExportResponse, QuestionnaireClient, Submission};
pub use turnstile::TurnstileClient;

use crate::auth::Action;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Verifies a bot-check (Turnstile) token.
#[async_trait]
pub trait BotVerifier: Send + Sync {
    /// Returns `Ok(())` when the token is accepted.
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<(), ExternalError>;
}

/// Looks up questionnaire submissions.
#[async_trait]
pub trait QuestionnaireApi: Send + Sync {
    /// Fetches the most recent submission `account` made to the questionnaire
    /// for `action`.
    async fn latest_submission(
        &self,
        action: Action,
        account: &str,
    ) -> Result<Submission, ExternalError>;
}

/// Builds the shared HTTP client used for outbound calls.
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, ExternalError> {
    Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
        .map_err(|e| ExternalError::Network {
            service: "HTTP client",
            message: format!("Failed to build HTTP client: {}", e),
        })
}
