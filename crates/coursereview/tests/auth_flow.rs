mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{spawn_app, TestApp};

const PASSWORD: &str = "Orchard7Lantern";

/// Runs the init step and returns `(otp, temp_token cookie)`.
async fn initiate(app: &TestApp, action: &str) -> (String, String) {
    let res = app
        .send(
            "POST",
            "/api/auth/init/",
            None,
            Some(json!({ "action": action, "turnstile_token": "ok" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert!(res.body["redirect_url"]
        .as_str()
        .unwrap()
        .starts_with("https://quest.example/"));

    let otp = res.body["otp"].as_str().unwrap().to_string();
    let cookie = res.cookie("temp_token").expect("temp_token cookie");
    (otp, cookie)
}

async fn verify(app: &TestApp, cookie: &str, account: &str, action: &str) -> common::TestResponse {
    app.send(
        "POST",
        "/api/auth/verify/",
        Some(cookie),
        Some(json!({ "account": account, "answer_id": 42, "action": action })),
    )
    .await
}

#[tokio::test]
async fn test_otp_login_creates_session() {
    let app = spawn_app();
    let (otp, cookie) = initiate(&app, "login").await;
    app.quest
        .submit("42", "alice", &otp, Utc::now().to_rfc3339());

    let res = verify(&app, &cookie, "alice", "login").await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["action"], "login");
    assert_eq!(res.body["is_logged_in"], true);
    assert!(res.body["expires_at"].as_i64().unwrap() > Utc::now().timestamp());

    let session = res.cookie("sessionid").expect("session cookie");
    assert!(res
        .cookies
        .iter()
        .any(|c| c.starts_with("temp_token=;") && c.contains("Max-Age=0")));

    let status = app.send("GET", "/api/user/status", Some(&session), None).await;
    assert_eq!(status.body["isAuthenticated"], true);
    assert_eq!(status.body["username"], "alice");

    let user = app.state.db.find_user_by_username("alice").unwrap().unwrap();
    assert_eq!(user.email, "alice@sjtu.edu.cn");

    // The handshake state is gone once the login completes
    let again = verify(&app, &cookie, "alice", "login").await;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_otp_is_single_use() {
    let app = spawn_app();
    let (otp, cookie) = initiate(&app, "signup").await;
    app.quest
        .submit("42", "bob", &otp, Utc::now().to_rfc3339());
    assert_eq!(verify(&app, &cookie, "bob", "signup").await.status, StatusCode::OK);

    // A fresh handshake cannot reuse the consumed code
    let (_, second_cookie) = initiate(&app, "signup").await;
    let res = verify(&app, &second_cookie, "bob", "signup").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Invalid or expired OTP");
}

#[tokio::test]
async fn test_submission_outside_window_is_rejected() {
    let app = spawn_app();
    let (otp, cookie) = initiate(&app, "login").await;
    let late = (Utc::now() + Duration::hours(1)).to_rfc3339();
    app.quest.submit("42", "carol", &otp, late);

    let res = verify(&app, &cookie, "carol", "login").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Submission timestamp outside validity window");
}

#[tokio::test]
async fn test_verify_attempts_are_rate_limited() {
    let app = spawn_app();
    let (otp, cookie) = initiate(&app, "login").await;
    app.quest
        .submit("999", "dave", &otp, Utc::now().to_rfc3339());

    for _ in 0..5 {
        let res = verify(&app, &cookie, "dave", "login").await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.body["error"], "Answer ID mismatch");
    }

    let res = verify(&app, &cookie, "dave", "login").await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_signup_then_password_login() {
    let app = spawn_app();
    let (otp, cookie) = initiate(&app, "signup").await;
    app.quest
        .submit("42", "erin", &otp, Utc::now().to_rfc3339());
    let verified = verify(&app, &cookie, "erin", "signup").await;
    assert_eq!(verified.body["is_logged_in"], false);

    let weak = app
        .send(
            "POST",
            "/api/auth/signup/",
            Some(&cookie),
            Some(json!({ "password": "short1A" })),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);

    let res = app
        .send(
            "POST",
            "/api/auth/signup/",
            Some(&cookie),
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["username"], "erin");

    let wrong = app
        .send(
            "POST",
            "/api/auth/login/",
            None,
            Some(json!({ "email": "erin@sjtu.edu.cn", "password": "Wrong7Password" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"], "Invalid email or password");

    let login = app
        .send(
            "POST",
            "/api/auth/login/",
            None,
            Some(json!({ "email": "Erin@sjtu.edu.cn", "password": PASSWORD })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.body);
    let session = login.cookie("sessionid").expect("session cookie");

    let logout = app.send("POST", "/api/auth/logout/", Some(&session), None).await;
    assert_eq!(logout.status, StatusCode::OK);
    let status = app.send("GET", "/api/user/status", Some(&session), None).await;
    assert_eq!(status.body["isAuthenticated"], false);
}

#[tokio::test]
async fn test_signup_rejected_for_existing_password() {
    let app = spawn_app();
    let (user_id, _) = app.login_as("frank");
    app.state.db.set_password(user_id, "$argon2id$placeholder").unwrap();

    let (otp, cookie) = initiate(&app, "signup").await;
    app.quest
        .submit("42", "frank", &otp, Utc::now().to_rfc3339());
    verify(&app, &cookie, "frank", "signup").await;

    let res = app
        .send(
            "POST",
            "/api/auth/signup/",
            Some(&cookie),
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_password_step_requires_verification() {
    let app = spawn_app();
    let (_, cookie) = initiate(&app, "reset_password").await;

    let res = app
        .send(
            "POST",
            "/api/auth/password/",
            Some(&cookie),
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bot_check_and_missing_fields() {
    let app = spawn_app();

    let bot = app
        .send(
            "POST",
            "/api/auth/init/",
            None,
            Some(json!({ "action": "login", "turnstile_token": "bot" })),
        )
        .await;
    assert_eq!(bot.status, StatusCode::FORBIDDEN);

    let missing = app
        .send("POST", "/api/auth/init/", None, Some(json!({ "action": "login" })))
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let bad_action = app
        .send(
            "POST",
            "/api/auth/init/",
            None,
            Some(json!({ "action": "delete_everything", "turnstile_token": "ok" })),
        )
        .await;
    assert_eq!(bad_action.status, StatusCode::BAD_REQUEST);

    let no_cookie = app
        .send(
            "POST",
            "/api/auth/verify/",
            None,
            Some(json!({ "account": "x", "answer_id": "1", "action": "login" })),
        )
        .await;
    assert_eq!(no_cookie.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_bodies_get_json_errors() {
    let app = spawn_app();
    let json = Some("application/json");

    let cases = [
        (json, r#"{"action": 5, "turnstile_token": "ok"}"#),
        (None, r#"{"action": "login", "turnstile_token": "ok"}"#),
        (json, "not json"),
    ];
    for (content_type, body) in cases {
        let res = app.send_raw("/api/auth/init/", content_type, body).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{body}");
        assert!(res.body["error"].is_string(), "{}", res.body);
    }

    let (_, sid) = app.login_as("gina");
    let course_id = app
        .state
        .db
        .find_course_by_code("MATH2140")
        .unwrap()
        .unwrap()
        .course_id;
    let review = app
        .send(
            "POST",
            &format!("/api/courses/{course_id}/reviews/"),
            Some(&format!("sessionid={sid}")),
            Some(json!({ "professor": "Jane Doe", "term": "24F" })),
        )
        .await;
    assert_eq!(review.status, StatusCode::BAD_REQUEST);
    assert_eq!(review.body["error"], "Invalid request body");
}

#[tokio::test]
async fn test_user_status_issues_anonymous_session() {
    let app = spawn_app();

    let res = app.send("GET", "/api/user/status", None, None).await;
    assert_eq!(res.body["isAuthenticated"], false);
    let session = res.cookie("sessionid").expect("anonymous session cookie");

    let again = app.send("GET", "/api/user/status", Some(&session), None).await;
    assert!(again.cookie("sessionid").is_none());

    let logout = app.send("POST", "/api/auth/logout/", Some(&session), None).await;
    assert_eq!(logout.status, StatusCode::BAD_REQUEST);
}
