//! Client for the questionnaire platform's public export API.
//!
//! The export endpoint lives at `{base_url}/{api_key}/json` and takes two
//! JSON-encoded query parameters: `params` (filter + paging) and `sort`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{build_http_client, ExternalError, QuestionnaireApi};
use crate::auth::Action;
use crate::config::QuestConfig;

const SERVICE: &str = "Questionnaire API";

/// The fields of a submission the handshake cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub submitted_at: String,
    pub account: String,
    /// Answer to the verification-code question
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportResponse {
    #[serde(default)]
    success: bool,
    data: Option<ExportData>,
}

#[derive(Debug, Deserialize)]
struct ExportData {
    #[serde(default)]
    rows: Vec<ExportRow>,
}

#[derive(Debug, Deserialize)]
struct ExportRow {
    id: Option<Value>,
    submitted_at: Option<String>,
    user: Option<ExportUser>,
    #[serde(default)]
    answers: Vec<ExportAnswer>,
}

#[derive(Debug, Deserialize)]
struct ExportUser {
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportAnswer {
    question: Option<ExportQuestion>,
    answer: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExportQuestion {
    id: Option<Value>,
}

/// Renders a JSON scalar the way it would be compared as text.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Picks the newest row out of an export response and pulls the OTP from the
/// answer to `question_id`.
pub fn extract_submission(
    response: ExportResponse,
    question_id: &str,
) -> Result<Submission, ExternalError> {
    if !response.success {
        return Err(ExternalError::NoSubmission);
    }

    let row = response
        .data
        .and_then(|data| data.rows.into_iter().next())
        .ok_or(ExternalError::NoSubmission)?;

    let otp = row
        .answers
        .iter()
        .find(|ans| {
            ans.question
                .as_ref()
                .and_then(|q| q.id.as_ref())
                .and_then(scalar_to_string)
                .is_some_and(|id| id == question_id)
        })
        .and_then(|ans| ans.answer.as_ref())
        .and_then(scalar_to_string);

    let id = row.id.as_ref().and_then(scalar_to_string);
    let account = row.user.and_then(|u| u.account);

    match (id, row.submitted_at, account, otp) {
        (Some(id), Some(submitted_at), Some(account), Some(otp)) => Ok(Submission {
            id,
            submitted_at,
            account,
            otp,
        }),
        _ => {
            warn!("Missing required field(s) in questionnaire response");
            Err(ExternalError::IncompleteSubmission)
        }
    }
}

/// HTTP client for the questionnaire export API.
pub struct QuestionnaireClient {
    client: Client,
    config: QuestConfig,
}

impl QuestionnaireClient {
    pub fn new(config: QuestConfig, timeout: Duration) -> Result<Self, ExternalError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            config,
        })
    }

    fn export_url(&self, api_key: &str) -> Result<Url, ExternalError> {
        let base = self.config.base_url.trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{api_key}/json"))?)
    }
}

#[async_trait]
impl QuestionnaireApi for QuestionnaireClient {
    async fn latest_submission(
        &self,
        action: Action,
        account: &str,
    ) -> Result<Submission, ExternalError> {
        let survey = self.config.survey(action);
        let api_key = survey.api_key.as_deref().ok_or(ExternalError::UnknownSurvey)?;
        let question_id = survey
            .question_id
            .as_deref()
            .filter(|id| id.parse::<i64>().is_ok())
            .ok_or(ExternalError::NotConfigured {
                what: "question ID not found for action",
            })?;

        let params = json!({ "account": account, "current": 1, "pageSize": 1 }).to_string();
        let sort = json!({ "id": "desc" }).to_string();

        debug!(action = action.as_str(), "Querying questionnaire export API");

        let response = self
            .client
            .get(self.export_url(api_key)?)
            .query(&[("params", params.as_str()), ("sort", sort.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        let body: ExportResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        extract_submission(body, question_id)
    }
}
