use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{build_http_client, BotVerifier, ExternalError};

const SERVICE: &str = "Turnstile verification";

/// Response body of the siteverify endpoint.
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Cloudflare Turnstile siteverify client.
pub struct TurnstileClient {
    client: Client,
    verify_url: String,
    secret: Option<String>,
}

impl TurnstileClient {
    pub fn new(
        verify_url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExternalError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            verify_url: verify_url.into(),
            secret,
        })
    }
}

#[async_trait]
impl BotVerifier for TurnstileClient {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<(), ExternalError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(ExternalError::NotConfigured {
                what: "turnstile secret key",
            })?;

        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        let body: SiteverifyResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        if !body.success {
            warn!(error_codes = ?body.error_codes, "Turnstile rejected token");
            return Err(ExternalError::BotCheckRejected);
        }

        info!("Turnstile token accepted");
        Ok(())
    }
}
