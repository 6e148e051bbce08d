//! Handshake, password and session endpoints under `/api/auth`.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::session::SESSION_COOKIE;
use crate::auth::{hash_password, verify_password, Action, AuthError};
use crate::db::DbUser;
use crate::server::session::CurrentSession;
use crate::server::types::{ApiErrorType, ApiJson};
use crate::server::util::{clear_cookie, client_ip, read_cookie, set_cookie};
use crate::types::AppState;

const TEMP_TOKEN_COOKIE: &str = "temp_token";

type Cookies = AppendHeaders<Vec<(HeaderName, String)>>;

#[derive(Debug, Default, Deserialize)]
pub struct InitiateBody {
    action: Option<String>,
    turnstile_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyBody {
    account: Option<String>,
    answer_id: Option<serde_json::Value>,
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordBody {
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Answer ids arrive as strings or numbers.
fn answer_id_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Starts a session for `user`, carrying over the caller's anonymous id.
fn start_session(
    s: &AppState,
    headers: &HeaderMap,
    user: &DbUser,
) -> Result<(HeaderName, String), ApiErrorType> {
    let previous = read_cookie(headers, SESSION_COOKIE);
    let (sid, data) = s
        .sessions
        .login(previous.as_deref(), user.user_id, &user.username)
        .map_err(ApiErrorType::internal)?;
    s.db.add_unauth_session_id(user.user_id, &data.anon_id)?;

    Ok(set_cookie(
        SESSION_COOKIE,
        &sid,
        s.sessions.ttl(),
        s.config.server.secure_cookies,
    ))
}

/// POST /api/auth/init/
pub async fn post_initiate(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<InitiateBody>,
) -> Result<Response, ApiErrorType> {
    let (Some(action), Some(turnstile_token)) =
        (non_empty(body.action), non_empty(body.turnstile_token))
    else {
        return Err(AuthError::MissingFields("Missing action or turnstile_token").into());
    };
    let action: Action = action.parse()?;
    info!(action = %action, "POST /api/auth/init/");

    let ip = client_ip(&headers);
    let existing = read_cookie(&headers, TEMP_TOKEN_COOKIE);
    let initiated = s
        .handshake
        .initiate(action, &turnstile_token, ip.as_deref(), existing.as_deref())
        .await?;

    let cookies: Cookies = AppendHeaders(vec![set_cookie(
        TEMP_TOKEN_COOKIE,
        &initiated.temp_token,
        s.handshake.settings().temp_token_ttl,
        s.config.server.secure_cookies,
    )]);

    Ok((
        StatusCode::OK,
        cookies,
        Json(json!({
            "otp": initiated.otp,
            "redirect_url": initiated.redirect_url,
        })),
    )
        .into_response())
}

/// POST /api/auth/verify/
pub async fn post_verify(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<VerifyBody>,
) -> Result<Response, ApiErrorType> {
    let (Some(account), Some(answer_id), Some(action)) = (
        non_empty(body.account),
        answer_id_text(body.answer_id),
        non_empty(body.action),
    ) else {
        return Err(AuthError::MissingFields("Missing account, answer_id, or action").into());
    };
    let action: Action = action.parse()?;
    let temp_token = read_cookie(&headers, TEMP_TOKEN_COOKIE).ok_or(AuthError::NoTempToken)?;
    info!(action = %action, "POST /api/auth/verify/");

    let verified = s
        .handshake
        .verify(&temp_token, &account, &answer_id, action)
        .await?;

    let mut cookies = Vec::new();
    let mut is_logged_in = false;

    if verified.action == Action::Login {
        let user = s
            .db
            .get_or_create_user(&verified.account, &s.config.auth.email_domain_name)?;
        if !user.is_active {
            warn!(account = %verified.account, "Inactive user attempted OTP login");
            return Err(ApiErrorType::forbidden("User account is inactive"));
        }
        s.db.get_or_create_student(user.user_id)?;
        cookies.push(start_session(&s, &headers, &user)?);
        s.handshake.finish(&temp_token);
        cookies.push(clear_cookie(TEMP_TOKEN_COOKIE));
        is_logged_in = true;
    }

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(json!({
            "action": verified.action,
            "expires_at": verified.expires_at,
            "is_logged_in": is_logged_in,
        })),
    )
        .into_response())
}

/// Shared gate of the signup and reset endpoints. Returns the verified
/// account, the raw temp token and the validated password.
fn password_step(
    headers: &HeaderMap,
    s: &AppState,
    action: Action,
    body: PasswordBody,
) -> Result<(String, String, String), ApiErrorType> {
    let temp_token = read_cookie(headers, TEMP_TOKEN_COOKIE).ok_or(AuthError::NoTempToken)?;
    let account =
        s.handshake
            .check_password_step(&temp_token, action, body.password.as_deref())?;
    let password = body.password.unwrap_or_default();
    Ok((account, temp_token, password))
}

/// POST /api/auth/signup/
pub async fn post_signup(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<PasswordBody>,
) -> Result<Response, ApiErrorType> {
    info!("POST /api/auth/signup/");
    let (account, temp_token, password) = password_step(&headers, &s, Action::Signup, body)?;

    let user = s
        .db
        .get_or_create_user(&account, &s.config.auth.email_domain_name)?;
    if user.has_password() {
        return Err(ApiErrorType::new(
            StatusCode::CONFLICT,
            "User already exists with password.",
        ));
    }

    let hash = hash_password(&password).map_err(AuthError::Hashing)?;
    s.db.set_password(user.user_id, &hash)?;
    s.db.get_or_create_student(user.user_id)?;
    s.handshake.finish(&temp_token);
    info!(username = %user.username, "Completed signup");

    Ok((
        StatusCode::OK,
        AppendHeaders([clear_cookie(TEMP_TOKEN_COOKIE)]),
        Json(json!({ "success": true, "username": user.username })),
    )
        .into_response())
}

/// POST /api/auth/password/
pub async fn post_reset_password(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<PasswordBody>,
) -> Result<Response, ApiErrorType> {
    info!("POST /api/auth/password/");
    let (account, temp_token, password) =
        password_step(&headers, &s, Action::ResetPassword, body)?;

    let user = s
        .db
        .find_user_by_username(&account)?
        .ok_or_else(|| ApiErrorType::not_found("User does not exist"))?;

    let hash = hash_password(&password).map_err(AuthError::Hashing)?;
    s.db.set_password(user.user_id, &hash)?;
    s.handshake.finish(&temp_token);
    info!(username = %user.username, "Reset password");

    Ok((
        StatusCode::OK,
        AppendHeaders([clear_cookie(TEMP_TOKEN_COOKIE)]),
        Json(json!({ "success": true, "username": user.username })),
    )
        .into_response())
}

/// POST /api/auth/login/
pub async fn post_login(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Response, ApiErrorType> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiErrorType::bad_request("Email and password are required"));
    }
    let username = email.split('@').next().unwrap_or_default();
    info!(username, "POST /api/auth/login/");

    let user = s
        .db
        .find_user_by_username(username)?
        .filter(|user| {
            user.password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(&body.password, hash))
        })
        .ok_or_else(|| {
            ApiErrorType::new(StatusCode::UNAUTHORIZED, "Invalid email or password")
        })?;

    if !user.is_active {
        return Err(ApiErrorType::forbidden(
            "Please activate your account via the activation link first.",
        ));
    }

    s.db.get_or_create_student(user.user_id)?;
    let cookie = start_session(&s, &headers, &user)?;

    Ok((
        StatusCode::OK,
        AppendHeaders([cookie]),
        Json(json!({ "success": true, "username": user.username })),
    )
        .into_response())
}

/// POST /api/auth/logout/
pub async fn post_logout(
    State(s): State<Arc<AppState>>,
    session: CurrentSession,
) -> Result<Response, ApiErrorType> {
    let (Some(id), Some(data), Some(user_id)) =
        (session.id.as_deref(), session.data.as_ref(), session.user_id())
    else {
        return Err(ApiErrorType::bad_request("User not authenticated"));
    };
    info!(user_id, "POST /api/auth/logout/");

    s.db.remove_unauth_session_id(user_id, &data.anon_id)?;
    s.sessions.destroy(id);

    Ok((
        StatusCode::OK,
        AppendHeaders([clear_cookie(SESSION_COOKIE)]),
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    )
        .into_response())
}

/// GET /api/user/status
///
/// Issues an anonymous session to callers without one.
pub async fn get_user_status(
    State(s): State<Arc<AppState>>,
    session: CurrentSession,
) -> Result<Response, ApiErrorType> {
    if let Some((_, username)) = session.user() {
        return Ok((
            StatusCode::OK,
            Json(json!({ "isAuthenticated": true, "username": username })),
        )
            .into_response());
    }

    let mut cookies = Vec::new();
    if session.data.is_none() {
        let (sid, _) = s.sessions.create_anonymous().map_err(ApiErrorType::internal)?;
        cookies.push(set_cookie(
            SESSION_COOKIE,
            &sid,
            s.sessions.ttl(),
            s.config.server.secure_cookies,
        ));
    }

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(json!({ "isAuthenticated": false })),
    )
        .into_response())
}
