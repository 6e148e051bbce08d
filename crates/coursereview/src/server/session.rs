//! Request extractors resolving the caller's session.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::sync::Arc;

use crate::auth::session::SESSION_COOKIE;
use crate::auth::SessionData;
use crate::server::types::ApiErrorType;
use crate::server::util::read_cookie;
use crate::types::AppState;

/// The caller's session, if the `sessionid` cookie names a live one.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession {
    pub id: Option<String>,
    pub data: Option<SessionData>,
}

impl CurrentSession {
    /// `(user_id, username)` of a signed-in caller.
    pub fn user(&self) -> Option<(i64, &str)> {
        let data = self.data.as_ref()?;
        Some((data.user_id?, data.username.as_deref()?))
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user().map(|(id, _)| id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(id) = read_cookie(&parts.headers, SESSION_COOKIE) else {
            return Ok(Self::default());
        };
        let data = state.sessions.load(&id);
        Ok(Self {
            id: data.as_ref().map(|_| id),
            data,
        })
    }
}

/// A signed-in caller. Rejects anonymous requests with 403.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub session: CurrentSession,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiErrorType;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = match CurrentSession::from_request_parts(parts, state).await {
            Ok(session) => session,
            Err(never) => match never {},
        };
        let (user_id, username) = session
            .user()
            .map(|(id, name)| (id, name.to_string()))
            .ok_or_else(|| {
                ApiErrorType::forbidden("Authentication credentials were not provided.")
            })?;

        Ok(Self {
            user_id,
            username,
            session,
        })
    }
}
