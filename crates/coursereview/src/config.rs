//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! environment variables. Nested keys use `__` as separator, so
//! `AUTH__OTP_TIMEOUT=300` overrides `auth.otp_timeout`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::Action;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment variable {key} conflicts with a non-object setting")]
    EnvConflict { key: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub turnstile: TurnstileConfig,
    pub quest: QuestConfig,
    pub web: WebConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Marks auth cookies `Secure`; turn off only for plain-HTTP development
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            secure_cookies: true,
        }
    }
}

/// Timeouts are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub otp_timeout: u64,
    pub temp_token_timeout: u64,
    pub token_rate_limit: i64,
    pub token_rate_limit_time: u64,
    pub password_length_min: usize,
    pub password_length_max: usize,
    pub email_domain_name: String,
    pub external_timeout: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            otp_timeout: 120,
            temp_token_timeout: 600,
            token_rate_limit: 5,
            token_rate_limit_time: 600,
            password_length_min: 10,
            password_length_max: 32,
            email_domain_name: "sjtu.edu.cn".to_string(),
            external_timeout: 10,
        }
    }
}

impl AuthConfig {
    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_timeout)
    }

    pub fn temp_token_ttl(&self) -> Duration {
        Duration::from_secs(self.temp_token_timeout)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.token_rate_limit_time)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_age: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // 30 days
        Self {
            cookie_age: 2_592_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "coursereview.sqlite3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    pub secret_key: Option<String>,
    pub verify_url: String,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestConfig {
    pub base_url: String,
    pub signup: SurveyConfig,
    pub login: SurveyConfig,
    pub reset: SurveyConfig,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wj.sjtu.edu.cn/api/v1/public/export".to_string(),
            signup: SurveyConfig::default(),
            login: SurveyConfig::default(),
            reset: SurveyConfig::default(),
        }
    }
}

impl QuestConfig {
    /// The questionnaire a given handshake action is completed through.
    pub fn survey(&self, action: Action) -> &SurveyConfig {
        match action {
            Action::Signup => &self.signup,
            Action::Login => &self.login,
            Action::ResetPassword => &self.reset,
        }
    }
}

/// One external questionnaire. `question_id` identifies the question whose
/// answer carries the OTP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub question_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub comment_min_length: usize,
    pub courses_page_size: usize,
    /// Overrides the term derived from today's date
    pub current_term: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            comment_min_length: 30,
            courses_page_size: 20,
            current_term: None,
        }
    }
}

impl WebConfig {
    pub fn current_term(&self) -> String {
        self.current_term
            .clone()
            .unwrap_or_else(|| crate::catalog::term_for_date(chrono::Local::now().date_naive()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// JSON file of courses upserted at startup
    pub courses_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from `COURSEREVIEW_CONFIG` (or `config.json`) and the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("COURSEREVIEW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::from_sources(Some(&path), std::env::vars())?;
        config.fill_secrets();
        Ok(config)
    }

    /// Builds a config from an optional JSON file and a set of environment pairs.
    pub fn from_sources<I>(path: Option<&Path>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = serde_json::to_value(Config::default())?;

        if let Some(path) = path.filter(|p| p.exists()) {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let file_tree: Value = serde_json::from_str(&content)?;
            deep_merge(&mut tree, file_tree);
            info!("Loaded configuration file {}", path.display());
        }

        for (key, value) in vars {
            apply_env_override(&mut tree, &key, &value)?;
        }

        Ok(serde_json::from_value(tree)?)
    }

    /// Falls back to `/run/secrets/<NAME>` for secrets missing from other sources.
    fn fill_secrets(&mut self) {
        if self.turnstile.secret_key.is_none() {
            self.turnstile.secret_key = read_secret("TURNSTILE_SECRET_KEY");
        }
        for (name, survey) in [
            ("SIGNUP_QUEST_API_KEY", &mut self.quest.signup),
            ("LOGIN_QUEST_API_KEY", &mut self.quest.login),
            ("RESET_QUEST_API_KEY", &mut self.quest.reset),
        ] {
            if survey.api_key.is_none() {
                survey.api_key = read_secret(name);
            }
        }
    }
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");
    fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|_| {
            warn!("Secret {secret_name} not found in environment, config or {path}");
        })
        .ok()
}

/// Recursively merges `new` into `base`; objects merge, everything else overwrites.
fn deep_merge(base: &mut Value, new: Value) {
    match (base, new) {
        (Value::Object(base_map), Value::Object(new_map)) => {
            for (key, value) in new_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, new) => *base = new,
    }
}

/// Applies `SECTION__KEY=value` to the matching setting. Keys that don't name
/// an existing setting are ignored, since the process environment is noisy.
fn apply_env_override(tree: &mut Value, key: &str, raw: &str) -> Result<(), ConfigError> {
    if !key.contains("__") {
        return Ok(());
    }

    let path: Vec<String> = key.split("__").map(|p| p.to_ascii_lowercase()).collect();
    let (leaf, parents) = match path.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut target = tree;
    for part in parents {
        target = match target.get_mut(part.as_str()) {
            Some(next) if next.is_object() => next,
            Some(_) => {
                return Err(ConfigError::EnvConflict {
                    key: key.to_string(),
                })
            }
            None => return Ok(()),
        };
    }

    let Some(slot) = target.get_mut(leaf.as_str()) else {
        return Ok(());
    };
    *slot = coerce_like(slot, raw);
    Ok(())
}

/// Parses an environment string into the JSON type the default already has.
fn coerce_like(existing: &Value, raw: &str) -> Value {
    match existing {
        Value::Bool(_) => Value::Bool(matches!(
            raw.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )),
        Value::Number(_) => serde_json::from_str::<serde_json::Number>(raw)
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Value::Array(_) => Value::Array(
            raw.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .filter(|item| item.as_str() != Some(""))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    }
}
