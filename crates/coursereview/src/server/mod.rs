use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::server::endpoints::{auth, courses, reviews, status};
use crate::types::AppState;

mod endpoints;
pub mod session;
pub mod types;
mod util;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // OTP handshake, password login and logout
    let auth_router = Router::new()
        .route("/init/", post(auth::post_initiate))
        .route("/verify/", post(auth::post_verify))
        .route("/signup/", post(auth::post_signup))
        .route("/password/", post(auth::post_reset_password))
        .route("/login/", post(auth::post_login))
        .route("/logout/", post(auth::post_logout));

    let course_router = Router::new()
        .route("/search", get(courses::get_course_search))
        .route("/:course_id/", get(courses::get_course_detail))
        .route("/:course_id/reviews/", post(courses::post_course_review))
        .route("/:course_id/my_review/", get(courses::get_my_course_review))
        .route(
            "/:course_id/review_search",
            get(courses::get_course_review_search),
        )
        .route("/:course_id/professors/", get(courses::get_course_professors))
        .route(
            "/:course_id/instructors/",
            get(courses::get_course_instructors),
        )
        .route("/:course_id/vote", post(courses::post_course_vote));

    let review_router = Router::new()
        .route(
            "/:review_id/",
            get(reviews::get_review)
                .put(reviews::put_review)
                .delete(reviews::delete_review),
        )
        .route("/:review_id/vote/", post(reviews::post_review_vote));

    let api_router = Router::new()
        .route("/courses/", get(courses::get_courses))
        .route("/reviews/", get(reviews::get_my_reviews))
        .nest("/auth", auth_router)
        .nest("/courses", course_router)
        .nest("/reviews", review_router)
        .route("/user/status", get(auth::get_user_status))
        .route("/landing/", get(courses::get_landing))
        .route("/departments/", get(courses::get_departments));

    Router::new()
        .route("/health", get(status::get_health))
        .nest("/api", api_router)
        .layer(cors_layer(&app_state.config.server.cors_allowed_origins))
        .with_state(app_state)
}

/// CORS for the configured frontend origins. Credentials are allowed so
/// that session cookies travel with cross-origin requests.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60))
}
