/// Database row types for courses, reviews and votes

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct DbUser {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
}

impl DbUser {
    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct DbStudent {
    pub student_id: i64,
    pub user_id: i64,
    pub unauth_session_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbCourse {
    #[serde(rename = "id")]
    pub course_id: i64,
    pub course_code: String,
    pub course_title: String,
    pub department: String,
    pub number: i64,
    pub course_credits: i64,
    pub pre_requisites: String,
    pub description: String,
    pub course_topics: Vec<String>,
    pub url: String,
    pub quality_score: f64,
    pub difficulty_score: f64,
    pub review_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbOffering {
    #[serde(skip)]
    pub offering_id: i64,
    pub term: String,
    pub section: String,
    pub period: String,
    pub instructors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbReview {
    #[serde(rename = "id")]
    pub review_id: i64,
    pub course_id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub term: String,
    pub professor: String,
    pub comments: String,
    pub kudos_count: i64,
    pub dislike_count: i64,
    pub created_at: String,
    pub updated_at: String,
    /// The viewer's own vote on this review, if any
    pub user_vote: Option<bool>,
}

/// Fields a user supplies when writing or editing a review.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub professor: String,
    pub term: String,
    pub comments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteCategory {
    Quality,
    Difficulty,
}

impl VoteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteCategory::Quality => "quality",
            VoteCategory::Difficulty => "difficulty",
        }
    }

    pub(crate) fn score_column(&self) -> &'static str {
        match self {
            VoteCategory::Quality => "quality_score",
            VoteCategory::Difficulty => "difficulty_score",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub new_score: f64,
    pub was_unvote: bool,
    pub new_vote_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewVoteOutcome {
    pub kudos_count: i64,
    pub dislike_count: i64,
    pub user_vote: Option<bool>,
}

/// The viewer's votes on one course; zero means no vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserVotes {
    pub quality: i64,
    pub difficulty: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourseSort {
    #[default]
    CourseCode,
    NumReviews,
    QualityScore,
    DifficultyScore,
}

impl CourseSort {
    /// Parses a `sort_by` value. Score sorts are only offered to signed-in users.
    pub fn parse(raw: &str, authenticated: bool) -> Self {
        match raw {
            "num_reviews" => CourseSort::NumReviews,
            "quality_score" if authenticated => CourseSort::QualityScore,
            "difficulty_score" if authenticated => CourseSort::DifficultyScore,
            _ => CourseSort::CourseCode,
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            CourseSort::CourseCode => "c.course_code",
            CourseSort::NumReviews => "review_count",
            CourseSort::QualityScore => "c.quality_score",
            CourseSort::DifficultyScore => "c.difficulty_score",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub department: Option<String>,
    pub code: Option<String>,
    pub min_quality: Option<f64>,
    pub min_difficulty: Option<f64>,
    pub sort: CourseSort,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct CoursePage {
    pub courses: Vec<DbCourse>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_courses: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentCount {
    pub code: String,
    pub count: i64,
}
