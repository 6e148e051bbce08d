//! Course listing, detail, search and voting endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

use crate::catalog::{department_name, numeric_value_of_term};
use crate::db::{CourseFilter, CourseSort, DbCourse, NewReview, VoteCategory};
use crate::server::endpoints::reviews::validate_review;
use crate::server::session::{AuthUser, CurrentSession};
use crate::server::types::{ApiErrorType, ApiJson};
use crate::types::AppState;

const SHORT_DESCRIPTION_LENGTH: usize = 300;

#[derive(Debug, Default, Deserialize)]
pub struct CourseListParams {
    page: Option<String>,
    department: Option<String>,
    code: Option<String>,
    min_quality: Option<String>,
    min_difficulty: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstructorParams {
    term: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoteBody {
    value: Option<Value>,
    #[serde(rename = "forLayup")]
    for_layup: Option<bool>,
}

/// `MATH2140`-style short name: department plus a zero-padded number.
pub fn short_name(course: &DbCourse) -> String {
    format!("{}{:03}", course.department, course.number)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn find_course(s: &AppState, course_id: i64) -> Result<DbCourse, ApiErrorType> {
    s.db
        .get_course(course_id)?
        .ok_or_else(|| ApiErrorType::not_found("Course not found"))
}

/// Summary of a course as shown in listings and search results.
fn course_summary(
    s: &AppState,
    course: &DbCourse,
    current_term: &str,
    authenticated: bool,
) -> Result<Value, ApiErrorType> {
    let offerings = s.db.course_offerings(course.course_id)?;
    let last_offered = offerings
        .iter()
        .map(|o| o.term.as_str())
        .max_by_key(|term| numeric_value_of_term(term));
    let periods: BTreeSet<&str> = offerings
        .iter()
        .map(|o| o.period.as_str())
        .filter(|p| !p.is_empty())
        .collect();
    let instructors = s.db.course_instructors(course.course_id, Some(current_term))?;

    let short_description = match course.description.as_str() {
        "" => None,
        d if d.chars().count() <= SHORT_DESCRIPTION_LENGTH => Some(d.to_string()),
        d => Some(format!(
            "{}...",
            d.chars().take(SHORT_DESCRIPTION_LENGTH).collect::<String>()
        )),
    };

    let mut summary = json!({
        "id": course.course_id,
        "course_code": course.course_code,
        "course_title": course.course_title,
        "review_count": course.review_count,
        "last_offered": last_offered,
        "is_offered_in_current_term": s.db.is_offered_in_term(course.course_id, current_term)?,
        "instructors": instructors,
        "short_description": short_description,
        "offered_times_string": (!periods.is_empty())
            .then(|| periods.into_iter().collect::<Vec<_>>().join(", ")),
    });
    if authenticated {
        if let Some(obj) = summary.as_object_mut() {
            obj.insert("quality_score".into(), json!(course.quality_score));
            obj.insert("difficulty_score".into(), json!(course.difficulty_score));
        }
    }
    Ok(summary)
}

/// Full course detail. Reviews, scores and the caller's votes are only
/// included for signed-in users.
pub(super) fn course_detail(
    s: &AppState,
    course_id: i64,
    viewer: Option<i64>,
) -> Result<Value, ApiErrorType> {
    let course = find_course(s, course_id)?;
    let current_term = s.config.web.current_term();

    let offerings = s.db.course_offerings(course_id)?;
    let last_offered = offerings
        .iter()
        .map(|o| o.term.clone())
        .max_by_key(|term| numeric_value_of_term(term));
    let professors: Vec<Value> = s
        .db
        .professors_and_review_count(course_id)?
        .into_iter()
        .map(|(name, count)| json!([name, count]))
        .collect();

    let mut detail = Map::new();
    detail.insert("id".into(), json!(course.course_id));
    detail.insert("course_code".into(), json!(course.course_code));
    detail.insert("course_title".into(), json!(course.course_title));
    detail.insert("department".into(), json!(course.department));
    detail.insert("number".into(), json!(course.number));
    detail.insert("course_credits".into(), json!(course.course_credits));
    detail.insert("pre_requisites".into(), json!(course.pre_requisites));
    detail.insert("description".into(), json!(course.description));
    detail.insert("course_topics".into(), json!(course.course_topics));
    detail.insert("url".into(), json!(course.url));
    detail.insert("review_count".into(), json!(course.review_count));
    detail.insert("courseoffering_set".into(), json!(offerings));
    detail.insert("last_offered".into(), json!(last_offered));
    detail.insert("professors_and_review_count".into(), Value::Array(professors));
    detail.insert(
        "instructors".into(),
        json!(s.db.course_instructors(course_id, Some(&current_term))?),
    );

    match viewer {
        Some(user_id) => {
            let votes = s.db.user_votes(course_id, user_id)?;
            let vote_json = |value: i64| (value > 0).then(|| json!({ "value": value }));

            detail.insert(
                "review_set".into(),
                json!(s.db.course_reviews(course_id, Some(user_id))?),
            );
            detail.insert("quality_score".into(), json!(course.quality_score));
            detail.insert("difficulty_score".into(), json!(course.difficulty_score));
            detail.insert(
                "quality_vote_count".into(),
                json!(s.db.vote_count(course_id, VoteCategory::Quality)?),
            );
            detail.insert(
                "difficulty_vote_count".into(),
                json!(s.db.vote_count(course_id, VoteCategory::Difficulty)?),
            );
            detail.insert("quality_vote".into(), json!(vote_json(votes.quality)));
            detail.insert("difficulty_vote".into(), json!(vote_json(votes.difficulty)));
            detail.insert(
                "can_write_review".into(),
                json!(s.db.user_can_write_review(user_id, course_id)?),
            );
        }
        None => {
            detail.insert("review_set".into(), json!([]));
            detail.insert("can_write_review".into(), json!(false));
        }
    }

    Ok(Value::Object(detail))
}

/// GET /api/landing/
pub async fn get_landing(State(s): State<Arc<AppState>>) -> Result<Response, ApiErrorType> {
    info!("GET /api/landing/");
    let review_count = s.db.count_reviews()?;
    Ok((StatusCode::OK, Json(json!({ "review_count": review_count }))).into_response())
}

/// GET /api/courses/
pub async fn get_courses(
    State(s): State<Arc<AppState>>,
    session: CurrentSession,
    Query(params): Query<CourseListParams>,
) -> Result<Response, ApiErrorType> {
    info!("GET /api/courses/");
    let authenticated = session.is_authenticated();

    // Score filters are a signed-in feature; bad numbers are ignored
    let score_filter = |raw: &Option<String>| {
        authenticated
            .then(|| non_empty(raw).and_then(|v| v.parse::<f64>().ok()))
            .flatten()
    };
    let filter = CourseFilter {
        department: non_empty(&params.department),
        code: non_empty(&params.code),
        min_quality: score_filter(&params.min_quality),
        min_difficulty: score_filter(&params.min_difficulty),
        sort: CourseSort::parse(
            params.sort_by.as_deref().unwrap_or("course_code"),
            authenticated,
        ),
        descending: params
            .sort_order
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("desc")),
    };
    let page = params
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<usize>().ok())
        .unwrap_or(1);
    let limit = s.config.web.courses_page_size;

    let result = s.db.list_courses(&filter, page, limit)?;
    let current_term = s.config.web.current_term();
    let courses = result
        .courses
        .iter()
        .map(|course| course_summary(&s, course, &current_term, authenticated))
        .collect::<Result<Vec<_>, _>>()?;

    let query_params: BTreeMap<&str, &str> = [
        ("page", &params.page),
        ("department", &params.department),
        ("code", &params.code),
        ("min_quality", &params.min_quality),
        ("min_difficulty", &params.min_difficulty),
        ("sort_by", &params.sort_by),
        ("sort_order", &params.sort_order),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
    .collect();

    Ok((
        StatusCode::OK,
        Json(json!({
            "courses": courses,
            "pagination": {
                "current_page": result.current_page,
                "total_pages": result.total_pages,
                "total_courses": result.total_courses,
                "limit": limit,
            },
            "query_params": query_params,
        })),
    )
        .into_response())
}

/// GET /api/courses/search?q=
pub async fn get_course_search(
    State(s): State<Arc<AppState>>,
    session: CurrentSession,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiErrorType> {
    let query = params.q.trim();
    info!(query, "GET /api/courses/search");

    if query.chars().count() < 2 {
        return Ok((
            StatusCode::OK,
            Json(json!({ "query": query, "department": null, "courses": [] })),
        )
            .into_response());
    }

    let courses = s.db.search_courses(query)?;
    let current_term = s.config.web.current_term();
    let authenticated = session.is_authenticated();
    let courses = courses
        .iter()
        .map(|course| course_summary(&s, course, &current_term, authenticated))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "query": query,
            "department": department_name(query),
            "term": current_term,
            "courses": courses,
        })),
    )
        .into_response())
}

/// GET /api/courses/:course_id/
pub async fn get_course_detail(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    session: CurrentSession,
) -> Result<Response, ApiErrorType> {
    info!("GET /api/courses/{}/", course_id);
    let detail = course_detail(&s, course_id, session.user_id())?;
    Ok((StatusCode::OK, Json(detail)).into_response())
}

/// POST /api/courses/:course_id/reviews/
pub async fn post_course_review(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<NewReview>,
) -> Result<Response, ApiErrorType> {
    info!(user_id = user.user_id, "POST /api/courses/{}/reviews/", course_id);
    find_course(&s, course_id)?;
    if !s.db.user_can_write_review(user.user_id, course_id)? {
        return Err(ApiErrorType::forbidden("User cannot write review"));
    }

    let review = validate_review(
        body,
        &s.config.web.current_term(),
        s.config.web.comment_min_length,
    )?;
    let review_id = s.db.create_review(course_id, user.user_id, &review)?;
    info!(review_id, user_id = user.user_id, "Created review");

    let detail = course_detail(&s, course_id, Some(user.user_id))?;
    Ok((StatusCode::CREATED, Json(detail)).into_response())
}

/// GET /api/courses/:course_id/my_review/
pub async fn get_my_course_review(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Response, ApiErrorType> {
    info!(user_id = user.user_id, "GET /api/courses/{}/my_review/", course_id);
    find_course(&s, course_id)?;

    let review = s
        .db
        .user_reviews(user.user_id)?
        .into_iter()
        .find(|r| r.course_id == course_id)
        .ok_or_else(|| ApiErrorType::not_found("No user review found for this course"))?;
    Ok((StatusCode::OK, Json(review)).into_response())
}

/// GET /api/courses/:course_id/review_search?q=
pub async fn get_course_review_search(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiErrorType> {
    let query = params.q.trim();
    info!(query, "GET /api/courses/{}/review_search", course_id);
    let course = find_course(&s, course_id)?;

    let reviews = s
        .db
        .search_course_reviews(course_id, query, Some(user.user_id))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "query": query,
            "course_id": course.course_id,
            "course_short_name": short_name(&course),
            "reviews_full_count": reviews.len(),
            "remaining": 0,
            "reviews": reviews,
        })),
    )
        .into_response())
}

/// GET /api/courses/:course_id/professors/
pub async fn get_course_professors(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
) -> Result<Response, ApiErrorType> {
    info!("GET /api/courses/{}/professors/", course_id);
    let professors = s.db.course_professors(course_id)?;
    Ok((StatusCode::OK, Json(json!({ "professors": professors }))).into_response())
}

/// GET /api/courses/:course_id/instructors/
///
/// Defaults to the current term; `?term=` picks another one.
pub async fn get_course_instructors(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Query(params): Query<InstructorParams>,
) -> Result<Response, ApiErrorType> {
    info!("GET /api/courses/{}/instructors/", course_id);
    find_course(&s, course_id)?;

    let term = non_empty(&params.term).unwrap_or_else(|| s.config.web.current_term());
    let instructors = s.db.course_instructors(course_id, Some(&term))?;
    Ok((StatusCode::OK, Json(json!({ "instructors": instructors }))).into_response())
}

/// Vote values arrive as numbers or numeric strings.
fn vote_value(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// POST /api/courses/:course_id/vote
pub async fn post_course_vote(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<VoteBody>,
) -> Result<Response, ApiErrorType> {
    let (Some(raw_value), Some(for_layup)) = (body.value, body.for_layup) else {
        return Err(ApiErrorType::bad_request(
            "Missing required fields: value, forLayup",
        ));
    };
    let value = vote_value(&raw_value)
        .ok_or_else(|| ApiErrorType::bad_request("Vote value must be an integer"))?;
    let category = if for_layup {
        VoteCategory::Difficulty
    } else {
        VoteCategory::Quality
    };
    info!(
        user_id = user.user_id,
        category = category.as_str(),
        value,
        "POST /api/courses/{}/vote",
        course_id
    );

    let outcome = s.db.vote(value, course_id, category, user.user_id)?;
    Ok((StatusCode::OK, Json(outcome)).into_response())
}

/// GET /api/departments/
pub async fn get_departments(State(s): State<Arc<AppState>>) -> Result<Response, ApiErrorType> {
    info!("GET /api/departments/");
    let departments: Vec<Value> = s
        .db
        .department_counts()?
        .into_iter()
        .map(|d| {
            json!({
                "code": d.code,
                "name": department_name(&d.code).unwrap_or(d.code.as_str()),
                "count": d.count,
            })
        })
        .collect();
    Ok((StatusCode::OK, Json(departments)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_value_accepts_numbers_and_strings() {
        assert_eq!(vote_value(&json!(4)), Some(4));
        assert_eq!(vote_value(&json!(" 3 ")), Some(3));
        assert_eq!(vote_value(&json!("four")), None);
        assert_eq!(vote_value(&json!(2.5)), None);
        assert_eq!(vote_value(&json!(null)), None);
    }

    #[test]
    fn test_short_name_pads_number() {
        let db = crate::db::test_util::seeded();
        let course = db.find_course_by_code("MATH2140").unwrap().unwrap();
        assert_eq!(short_name(&course), "MATH2140");

        let mut short = course.clone();
        short.number = 42;
        assert_eq!(short_name(&short), "MATH042");
    }
}
