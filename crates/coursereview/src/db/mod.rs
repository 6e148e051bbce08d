/// Database module for courses, reviews, votes and user accounts

mod courses;
mod import;
mod review_votes;
mod reviews;
mod types;
mod users;
mod votes;

pub use import::{ImportedCourse, ImportedOffering};
pub use types::{
    CourseFilter, CoursePage, CourseSort, DbCourse, DbOffering, DbReview, DbStudent, DbUser,
    DepartmentCount, NewReview, ReviewVoteOutcome, UserVotes, VoteCategory, VoteOutcome,
};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_coursereview.sql");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("Invalid vote value {0}; expected 0 to 5")]
    InvalidVoteValue(i64),

    #[error("Course not found")]
    CourseNotFound,

    #[error("User cannot write review")]
    DuplicateReview,

    #[error("Review not found")]
    ReviewNotFound,

    #[error("User not found")]
    UserNotFound,
}

pub struct CourseDb {
    db: Mutex<Connection>,
}

impl CourseDb {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.db.lock().map_err(|_| DbError::Poisoned)
    }

    /// Total number of reviews across all courses.
    pub fn count_reviews(&self) -> Result<i64, DbError> {
        let db = self.conn()?;
        Ok(db.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.sqlite3");

        let db = CourseDb::open(&path).unwrap();
        assert_eq!(db.count_reviews().unwrap(), 0);
        drop(db);

        let reopened = CourseDb::open(&path).unwrap();
        assert_eq!(reopened.count_reviews().unwrap(), 0);
    }
}
