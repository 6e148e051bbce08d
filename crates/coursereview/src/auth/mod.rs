//! OTP / temp-token authentication handshake.
//!
//! A client initiates a handshake and receives an OTP plus an HttpOnly
//! `temp_token` cookie. The user submits the OTP through an external
//! questionnaire; the verify step then pulls that submission back, consumes
//! the OTP exactly once and marks the temp token verified. Login finishes
//! immediately, signup and password reset finish with a password step.

pub mod error;
pub mod password;
pub mod session;
pub mod tokens;

pub use error::AuthError;
pub use password::{hash_password, verify_password, PasswordError, PasswordPolicy};
pub use session::{SessionData, SessionStore};
pub use tokens::TokenHash;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::external::{BotVerifier, QuestionnaireApi};
use crate::store::TtlStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Signup,
    Login,
    ResetPassword,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Signup => "signup",
            Action::Login => "login",
            Action::ResetPassword => "reset_password",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(Action::Signup),
            "login" => Ok(Action::Login),
            "reset_password" => Ok(Action::ResetPassword),
            _ => Err(AuthError::InvalidAction),
        }
    }
}

/// Value stored under `otp:<code>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtpRecord {
    pub temp_token: String,
    /// Unix time in seconds, with sub-second precision
    pub initiated_at: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Pending,
    Verified,
}

/// Value stored under `temp_token_state:<hash>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenState {
    pub status: TokenStatus,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Handshake timings and limits, lifted out of [`Config`].
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub otp_ttl: Duration,
    pub temp_token_ttl: Duration,
    pub rate_limit: i64,
    pub rate_limit_window: Duration,
    pub policy: PasswordPolicy,
    /// Questionnaire page each action redirects to
    pub survey_urls: HashMap<Action, String>,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        let survey_urls = [Action::Signup, Action::Login, Action::ResetPassword]
            .into_iter()
            .filter_map(|action| {
                config
                    .quest
                    .survey(action)
                    .url
                    .clone()
                    .filter(|url| !url.is_empty())
                    .map(|url| (action, url))
            })
            .collect();

        Self {
            otp_ttl: config.auth.otp_ttl(),
            temp_token_ttl: config.auth.temp_token_ttl(),
            rate_limit: config.auth.token_rate_limit,
            rate_limit_window: config.auth.rate_limit_window(),
            policy: PasswordPolicy {
                min_length: config.auth.password_length_min,
                max_length: config.auth.password_length_max,
            },
            survey_urls,
        }
    }
}

/// Result of a successful initiation.
#[derive(Debug, Clone)]
pub struct Initiated {
    pub otp: String,
    pub temp_token: String,
    pub redirect_url: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct Verified {
    pub action: Action,
    pub account: String,
    /// Unix seconds at which the verified state lapses
    pub expires_at: i64,
}

fn now_unix() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Parses a questionnaire timestamp into unix seconds. RFC 3339 is tried
/// first; naive `YYYY-MM-DD HH:MM:SS` values are taken as local time.
pub fn parse_submitted_at(raw: &str) -> Result<f64, AuthError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_micros() as f64 / 1_000_000.0);
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or(AuthError::InvalidTimestamp)?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_micros() as f64 / 1_000_000.0)
        .ok_or(AuthError::InvalidTimestamp)
}

/// Drives the handshake against the cache store and the external services.
pub struct Handshake {
    store: Arc<TtlStore>,
    settings: AuthSettings,
    bot_check: Arc<dyn BotVerifier>,
    questionnaire: Arc<dyn QuestionnaireApi>,
}

impl Handshake {
    pub fn new(
        store: Arc<TtlStore>,
        settings: AuthSettings,
        bot_check: Arc<dyn BotVerifier>,
        questionnaire: Arc<dyn QuestionnaireApi>,
    ) -> Self {
        Self {
            store,
            settings,
            bot_check,
            questionnaire,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Step 1: bot check, then issue an OTP and a pending temp token.
    pub async fn initiate(
        &self,
        action: Action,
        turnstile_token: &str,
        client_ip: Option<&str>,
        existing_token: Option<&str>,
    ) -> Result<Initiated, AuthError> {
        self.bot_check.verify(turnstile_token, client_ip).await?;

        let otp = tokens::generate_otp();
        let temp_token = tokens::generate_temp_token();

        if let Some(existing) = existing_token {
            let stale = TokenHash::of(existing);
            if self.store.delete(&stale.state_key()) {
                info!(token = %stale, "Cleaned up existing temp_token_state");
            }
        }

        let otp_record = OtpRecord {
            temp_token: temp_token.clone(),
            initiated_at: now_unix(),
        };
        self.store.set_ex(
            tokens::otp_key(&otp),
            serde_json::to_string(&otp_record)?,
            self.settings.otp_ttl,
        );

        let hash = TokenHash::of(&temp_token);
        let state = TokenState {
            status: TokenStatus::Pending,
            action,
            account: None,
        };
        self.store
            .set_ex(hash.state_key(), serde_json::to_string(&state)?, self.settings.temp_token_ttl);

        info!(action = %action, token = %hash, "Created auth intent");

        let redirect_url = self
            .settings
            .survey_urls
            .get(&action)
            .cloned()
            .ok_or(AuthError::SurveyUrlMissing)?;

        Ok(Initiated {
            otp,
            temp_token,
            redirect_url,
        })
    }

    /// Step 3: match the questionnaire submission against the pending token.
    pub async fn verify(
        &self,
        temp_token: &str,
        account: &str,
        answer_id: &str,
        action: Action,
    ) -> Result<Verified, AuthError> {
        let hash = TokenHash::of(temp_token);
        let state_key = hash.state_key();
        let mut state = self.load_state(&state_key)?;

        if state.status != TokenStatus::Pending {
            return Err(AuthError::InvalidState);
        }
        if state.action != action {
            return Err(AuthError::ActionMismatch);
        }

        let attempts_key = hash.attempts_key();
        let attempts = self
            .store
            .incr_with_window(&attempts_key, self.settings.rate_limit_window)?;
        if attempts > self.settings.rate_limit {
            warn!(token = %hash, attempts, "Verification rate limit exceeded");
            return Err(AuthError::TooManyAttempts);
        }

        let submission = self.questionnaire.latest_submission(action, account).await?;
        if submission.id != answer_id {
            return Err(AuthError::AnswerIdMismatch);
        }

        let raw_otp = self
            .store
            .get_del(&tokens::otp_key(&submission.otp))
            .ok_or(AuthError::InvalidOtp)?;
        let otp_record: OtpRecord =
            serde_json::from_str(&raw_otp).map_err(|_| AuthError::InvalidOtpData)?;
        if otp_record.temp_token.is_empty() || otp_record.initiated_at <= 0.0 {
            return Err(AuthError::InvalidOtpData);
        }
        if otp_record.temp_token != temp_token {
            return Err(AuthError::TempTokenMismatch);
        }

        let submitted_at = parse_submitted_at(&submission.submitted_at)?;
        let window = self.settings.otp_ttl.as_secs_f64();
        if submitted_at < otp_record.initiated_at
            || submitted_at - otp_record.initiated_at > window
        {
            return Err(AuthError::OutsideWindow);
        }

        state.status = TokenStatus::Verified;
        state.account = Some(account.to_string());
        self.store
            .set_ex(&state_key, serde_json::to_string(&state)?, self.settings.temp_token_ttl);
        let expires_at = Utc::now().timestamp() + self.settings.temp_token_ttl.as_secs() as i64;

        self.store.delete(&attempts_key);

        info!(action = %action, account, "Verified temp_token");

        Ok(Verified {
            action,
            account: account.to_string(),
            expires_at,
        })
    }

    /// Password step gate: the token must be verified for `action`, and the
    /// password must pass the policy. Returns the verified account.
    pub fn check_password_step(
        &self,
        temp_token: &str,
        action: Action,
        password: Option<&str>,
    ) -> Result<String, AuthError> {
        let state = self.load_state(&TokenHash::of(temp_token).state_key())?;

        if state.status != TokenStatus::Verified || state.action != action {
            return Err(AuthError::StateNotVerified);
        }

        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(AuthError::MissingFields("Missing password"))?;

        let account = state.account.ok_or(AuthError::NoAccount)?;
        self.settings.policy.validate(password, Some(&account))?;

        Ok(account)
    }

    /// Drops the handshake state for a token once it has been used.
    pub fn finish(&self, temp_token: &str) {
        self.store.delete(&TokenHash::of(temp_token).state_key());
    }

    fn load_state(&self, state_key: &str) -> Result<TokenState, AuthError> {
        let raw = self.store.get(state_key).ok_or(AuthError::StateNotFound)?;
        serde_json::from_str(&raw).map_err(|_| AuthError::InvalidStateData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, Submission};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct AcceptAll;

    #[async_trait]
    impl BotVerifier for AcceptAll {
        async fn verify(&self, _: &str, _: Option<&str>) -> Result<(), ExternalError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Scripted {
        submission: Mutex<Option<Submission>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl QuestionnaireApi for Scripted {
        async fn latest_submission(&self, _: Action, _: &str) -> Result<Submission, ExternalError> {
            *self.calls.lock().unwrap() += 1;
            self.submission
                .lock()
                .unwrap()
                .clone()
                .ok_or(ExternalError::NoSubmission)
        }
    }

    fn handshake(quest: Arc<Scripted>) -> (Handshake, Arc<TtlStore>) {
        let mut config = Config::default();
        config.quest.login.url = Some("https://quest.example/login".to_string());
        config.quest.signup.url = Some("https://quest.example/signup".to_string());
        let store = Arc::new(TtlStore::new());
        let handshake = Handshake::new(
            store.clone(),
            AuthSettings::from_config(&config),
            Arc::new(AcceptAll),
            quest,
        );
        (handshake, store)
    }

    fn submission_for(otp: &str, offset_secs: i64) -> Submission {
        let at = Utc::now() + chrono::Duration::seconds(offset_secs);
        Submission {
            id: "42".to_string(),
            submitted_at: at.to_rfc3339(),
            account: "alice".to_string(),
            otp: otp.to_string(),
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("reset_password".parse::<Action>().unwrap(), Action::ResetPassword);
        assert!(matches!("admin".parse::<Action>(), Err(AuthError::InvalidAction)));
        assert_eq!(
            serde_json::to_string(&Action::ResetPassword).unwrap(),
            "\"reset_password\""
        );
    }

    #[test]
    fn test_parse_submitted_at() {
        let rfc = parse_submitted_at("2024-09-01T10:00:00+08:00").unwrap();
        assert_eq!(rfc, 1_725_156_000.0);
        assert!(parse_submitted_at("2024-09-01 10:00:00").is_ok());
        assert!(matches!(
            parse_submitted_at("yesterday"),
            Err(AuthError::InvalidTimestamp)
        ));
    }

    #[tokio::test]
    async fn test_initiate_stores_otp_and_pending_state() {
        let (handshake, store) = handshake(Arc::new(Scripted::default()));
        let init = handshake
            .initiate(Action::Login, "turnstile", None, None)
            .await
            .unwrap();

        assert_eq!(init.otp.len(), 8);
        assert_eq!(init.redirect_url, "https://quest.example/login");

        let record: OtpRecord =
            serde_json::from_str(&store.get(&tokens::otp_key(&init.otp)).unwrap()).unwrap();
        assert_eq!(record.temp_token, init.temp_token);

        let state: TokenState = serde_json::from_str(
            &store
                .get(&TokenHash::of(&init.temp_token).state_key())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(state.status, TokenStatus::Pending);
        assert_eq!(state.action, Action::Login);
    }

    #[tokio::test]
    async fn test_initiate_without_survey_url_fails() {
        let (handshake, _) = handshake(Arc::new(Scripted::default()));
        let result = handshake
            .initiate(Action::ResetPassword, "turnstile", None, None)
            .await;
        assert!(matches!(result, Err(AuthError::SurveyUrlMissing)));
    }

    #[tokio::test]
    async fn test_reinitiate_drops_previous_state() {
        let (handshake, store) = handshake(Arc::new(Scripted::default()));
        let first = handshake
            .initiate(Action::Login, "t", None, None)
            .await
            .unwrap();
        handshake
            .initiate(Action::Login, "t", None, Some(&first.temp_token))
            .await
            .unwrap();

        assert!(store
            .get(&TokenHash::of(&first.temp_token).state_key())
            .is_none());
    }

    #[tokio::test]
    async fn test_verify_consumes_otp_once() {
        let quest = Arc::new(Scripted::default());
        let (handshake, store) = handshake(quest.clone());
        let init = handshake
            .initiate(Action::Signup, "t", None, None)
            .await
            .unwrap();
        *quest.submission.lock().unwrap() = Some(submission_for(&init.otp, 2));

        let verified = handshake
            .verify(&init.temp_token, "alice", "42", Action::Signup)
            .await
            .unwrap();
        assert_eq!(verified.account, "alice");
        assert!(store.get(&tokens::otp_key(&init.otp)).is_none());
        assert!(store
            .get(&TokenHash::of(&init.temp_token).attempts_key())
            .is_none());

        // State is now verified, so a replay fails on the status check
        let replay = handshake
            .verify(&init.temp_token, "alice", "42", Action::Signup)
            .await;
        assert!(matches!(replay, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_verify_rejects_submission_outside_window() {
        let quest = Arc::new(Scripted::default());
        let (handshake, _) = handshake(quest.clone());
        let init = handshake
            .initiate(Action::Login, "t", None, None)
            .await
            .unwrap();

        *quest.submission.lock().unwrap() = Some(submission_for(&init.otp, -60));
        let early = handshake
            .verify(&init.temp_token, "alice", "42", Action::Login)
            .await;
        assert!(matches!(early, Err(AuthError::OutsideWindow)));
    }

    #[tokio::test]
    async fn test_verify_rate_limit_precedes_lookup() {
        let quest = Arc::new(Scripted::default());
        let (handshake, _) = handshake(quest.clone());
        let init = handshake
            .initiate(Action::Login, "t", None, None)
            .await
            .unwrap();

        for _ in 0..5 {
            let result = handshake
                .verify(&init.temp_token, "alice", "42", Action::Login)
                .await;
            assert!(matches!(
                result,
                Err(AuthError::External(ExternalError::NoSubmission))
            ));
        }

        let limited = handshake
            .verify(&init.temp_token, "alice", "42", Action::Login)
            .await;
        assert!(matches!(limited, Err(AuthError::TooManyAttempts)));
        assert_eq!(*quest.calls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_password_step_requires_verified_state() {
        let quest = Arc::new(Scripted::default());
        let (handshake, _) = handshake(quest.clone());
        let init = handshake
            .initiate(Action::Signup, "t", None, None)
            .await
            .unwrap();

        let pending = handshake.check_password_step(
            &init.temp_token,
            Action::Signup,
            Some("Tr0ub4dor&3x"),
        );
        assert!(matches!(pending, Err(AuthError::StateNotVerified)));

        *quest.submission.lock().unwrap() = Some(submission_for(&init.otp, 1));
        handshake
            .verify(&init.temp_token, "alice", "42", Action::Signup)
            .await
            .unwrap();

        let weak = handshake.check_password_step(&init.temp_token, Action::Signup, Some("short"));
        assert!(matches!(weak, Err(AuthError::WeakPassword(_))));

        let account = handshake
            .check_password_step(&init.temp_token, Action::Signup, Some("Tr0ub4dor&3x"))
            .unwrap();
        assert_eq!(account, "alice");

        handshake.finish(&init.temp_token);
        assert!(matches!(
            handshake.check_password_step(&init.temp_token, Action::Signup, Some("Tr0ub4dor&3x")),
            Err(AuthError::StateNotFound)
        ));
    }
}
