use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::auth::{AuthSettings, Handshake, SessionStore};
use crate::config::Config;
use crate::db::CourseDb;
use crate::external::{BotVerifier, QuestionnaireApi, QuestionnaireClient, TurnstileClient};
use crate::store::TtlStore;

/// State shared by every request handler.
pub struct AppState {
    pub config: Config,
    pub db: CourseDb,
    /// Backs OTPs, handshake state, rate-limit counters and sessions
    pub store: Arc<TtlStore>,
    pub handshake: Handshake,
    pub sessions: SessionStore,
}

impl AppState {
    /// Wires up the state around explicit external services.
    pub fn new(
        config: Config,
        db: CourseDb,
        bot_check: Arc<dyn BotVerifier>,
        questionnaire: Arc<dyn QuestionnaireApi>,
    ) -> Arc<Self> {
        let store = Arc::new(TtlStore::new());
        let handshake = Handshake::new(
            store.clone(),
            AuthSettings::from_config(&config),
            bot_check,
            questionnaire,
        );
        let sessions = SessionStore::new(
            store.clone(),
            Duration::from_secs(config.session.cookie_age),
        );

        Arc::new(Self {
            config,
            db,
            store,
            handshake,
            sessions,
        })
    }

    /// Opens the database and builds the real HTTP clients from `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Arc<Self>> {
        let db = CourseDb::open(&config.database.path)
            .with_context(|| format!("opening database {}", config.database.path))?;

        let timeout = config.auth.external_timeout();
        let turnstile = TurnstileClient::new(
            config.turnstile.verify_url.clone(),
            config.turnstile.secret_key.clone(),
            timeout,
        )?;
        let questionnaire = QuestionnaireClient::new(config.quest.clone(), timeout)?;

        Ok(Self::new(
            config,
            db,
            Arc::new(turnstile),
            Arc::new(questionnaire),
        ))
    }
}
