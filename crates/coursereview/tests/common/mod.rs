#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use coursereview::auth::Action;
use coursereview::config::Config;
use coursereview::db::{CourseDb, ImportedCourse, ImportedOffering};
use coursereview::external::{BotVerifier, ExternalError, QuestionnaireApi, Submission};
use coursereview::{create_router, AppState};

/// Accepts every bot-check token except `"bot"`.
pub struct FakeTurnstile;

#[async_trait]
impl BotVerifier for FakeTurnstile {
    async fn verify(&self, token: &str, _: Option<&str>) -> Result<(), ExternalError> {
        if token == "bot" {
            Err(ExternalError::BotCheckRejected)
        } else {
            Ok(())
        }
    }
}

/// Questionnaire whose latest submission is set by the test.
#[derive(Default)]
pub struct FakeQuestionnaire {
    submission: Mutex<Option<Submission>>,
}

impl FakeQuestionnaire {
    pub fn submit(&self, id: &str, account: &str, otp: &str, submitted_at: String) {
        *self.submission.lock().unwrap() = Some(Submission {
            id: id.to_string(),
            submitted_at,
            account: account.to_string(),
            otp: otp.to_string(),
        });
    }
}

#[async_trait]
impl QuestionnaireApi for FakeQuestionnaire {
    async fn latest_submission(
        &self,
        _: Action,
        account: &str,
    ) -> Result<Submission, ExternalError> {
        self.submission
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.account == account)
            .ok_or(ExternalError::NoSubmission)
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub quest: Arc<FakeQuestionnaire>,
    pub router: Router,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.secure_cookies = false;
    config.web.current_term = Some("24F".to_string());
    config.quest.login.url = Some("https://quest.example/login".to_string());
    config.quest.signup.url = Some("https://quest.example/signup".to_string());
    config.quest.reset.url = Some("https://quest.example/reset".to_string());
    config
}

pub fn course(code: &str, title: &str, term: &str, instructor: &str) -> ImportedCourse {
    let split = code.find(|c: char| c.is_ascii_digit()).unwrap_or(code.len());
    ImportedCourse {
        course_code: code.to_string(),
        course_title: title.to_string(),
        department: code[..split].to_string(),
        number: code[split..].parse().ok(),
        course_credits: Some(4),
        pre_requisites: None,
        description: format!("{title} covers the essentials."),
        course_topics: Vec::new(),
        url: None,
        offerings: vec![ImportedOffering {
            term: term.to_string(),
            section: "1".to_string(),
            period: "MWF".to_string(),
            instructors: vec![instructor.to_string()],
        }],
    }
}

pub fn spawn_app() -> TestApp {
    let db = CourseDb::open_in_memory().unwrap();
    db.import_courses(&[
        course("MATH2140", "Linear Algebra", "24F", "Jane Doe"),
        course("MATH1160", "Calculus II", "24S", "John Smith"),
        course("PHYS2400", "Physics II", "23F", "Ada Lovelace"),
    ])
    .unwrap();

    let quest = Arc::new(FakeQuestionnaire::default());
    let state = AppState::new(test_config(), db, Arc::new(FakeTurnstile), quest.clone());
    let router = create_router(state.clone());
    TestApp {
        state,
        quest,
        router,
    }
}

impl TestApp {
    /// Signs `username` in directly and returns the session cookie value.
    pub fn login_as(&self, username: &str) -> (i64, String) {
        let user = self
            .state
            .db
            .get_or_create_user(username, "sjtu.edu.cn")
            .unwrap();
        let (sid, _) = self
            .state
            .sessions
            .login(None, user.user_id, &user.username)
            .unwrap();
        (user.user_id, sid)
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        TestResponse::read(response).await
    }

    /// Sends `body` verbatim, with an optional `Content-Type`.
    pub async fn send_raw(
        &self,
        uri: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> TestResponse {
        let mut request = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let request = request.body(Body::from(body)).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        TestResponse::read(response).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub cookies: Vec<String>,
    pub body: Value,
}

impl TestResponse {
    async fn read(response: Response<Body>) -> Self {
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Self {
            status,
            cookies,
            body,
        }
    }

    /// `name=value` of a cookie this response set, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .filter_map(|c| c.split(';').next())
            .find(|pair| pair.starts_with(&format!("{name}=")))
            .filter(|pair| pair.len() > name.len() + 1)
            .map(str::to_string)
    }
}
