//! A user's own reviews and kudos/dislike votes on reviews.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::catalog::is_valid_review_term;
use crate::db::NewReview;
use crate::server::session::AuthUser;
use crate::server::types::{ApiErrorType, ApiJson};
use crate::types::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReviewVoteBody {
    is_kudos: Option<Value>,
}

/// Checks and normalises a submitted review: the term is upper-cased, each
/// word of the professor's name is capitalised and comments are trimmed.
pub fn validate_review(
    review: NewReview,
    current_term: &str,
    comment_min_length: usize,
) -> Result<NewReview, ApiErrorType> {
    let term = review.term.trim().to_uppercase();
    if !is_valid_review_term(&term, current_term) {
        return Err(ApiErrorType::bad_request(format!(
            "Please use a valid term, e.g. {current_term}"
        )));
    }

    let names: Vec<&str> = review.professor.split_whitespace().collect();
    if names.len() < 2 {
        return Err(ApiErrorType::bad_request(
            "Please use a valid professor name, e.g. John Smith",
        ));
    }
    let professor = names
        .iter()
        .map(|name| capitalize(name))
        .collect::<Vec<_>>()
        .join(" ");

    let comments = review.comments.trim().to_string();
    if comments.chars().count() < comment_min_length {
        return Err(ApiErrorType::bad_request(format!(
            "Please write a longer review (at least {comment_min_length} characters)"
        )));
    }

    Ok(NewReview {
        professor,
        term,
        comments,
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// JSON truthiness of the `is_kudos` field.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// GET /api/reviews/
pub async fn get_my_reviews(
    State(s): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Response, ApiErrorType> {
    info!(user_id = user.user_id, "GET /api/reviews/");
    let reviews = s.db.user_reviews(user.user_id)?;
    Ok((StatusCode::OK, Json(reviews)).into_response())
}

/// GET /api/reviews/:review_id/
pub async fn get_review(
    Path(review_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Response, ApiErrorType> {
    info!(user_id = user.user_id, "GET /api/reviews/{}/", review_id);
    let review = s
        .db
        .get_review(review_id, Some(user.user_id))?
        .filter(|r| r.user_id == user.user_id)
        .ok_or_else(|| ApiErrorType::not_found("Review not found"))?;
    Ok((StatusCode::OK, Json(review)).into_response())
}

/// PUT /api/reviews/:review_id/
pub async fn put_review(
    Path(review_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<NewReview>,
) -> Result<Response, ApiErrorType> {
    info!(user_id = user.user_id, "PUT /api/reviews/{}/", review_id);
    let review = validate_review(
        body,
        &s.config.web.current_term(),
        s.config.web.comment_min_length,
    )?;

    if !s.db.update_review(review_id, user.user_id, &review)? {
        return Err(ApiErrorType::not_found("Review not found"));
    }

    let updated = s
        .db
        .get_review(review_id, Some(user.user_id))?
        .ok_or_else(|| ApiErrorType::not_found("Review not found"))?;
    Ok((StatusCode::OK, Json(updated)).into_response())
}

/// DELETE /api/reviews/:review_id/
pub async fn delete_review(
    Path(review_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Response, ApiErrorType> {
    info!(user_id = user.user_id, "DELETE /api/reviews/{}/", review_id);
    if !s.db.delete_review(review_id, user.user_id)? {
        return Err(ApiErrorType::not_found("Review not found"));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /api/reviews/:review_id/vote/
pub async fn post_review_vote(
    Path(review_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<ReviewVoteBody>,
) -> Result<Response, ApiErrorType> {
    let is_kudos = body
        .is_kudos
        .filter(|v| !v.is_null())
        .map(|v| truthy(&v))
        .ok_or_else(|| ApiErrorType::bad_request("is_kudos field is required"))?;
    info!(user_id = user.user_id, is_kudos, "POST /api/reviews/{}/vote/", review_id);

    let outcome = s.db.vote_review(review_id, user.user_id, is_kudos)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "kudos_count": outcome.kudos_count,
            "dislike_count": outcome.dislike_count,
            "user_vote": outcome.user_vote,
        })),
    )
        .into_response())
}
