//! Course reviews.

use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use super::courses::contains_pattern;
use super::types::{DbReview, NewReview};
use super::{CourseDb, DbError};

/// `?1` is always the viewer's user id (or NULL), used for `user_vote`.
const REVIEW_SELECT: &str = "SELECT r.review_id, r.course_id, r.user_id, r.term, r.professor,
    r.comments,
    (SELECT COUNT(*) FROM review_votes v WHERE v.review_id = r.review_id AND v.is_kudos = 1),
    (SELECT COUNT(*) FROM review_votes v WHERE v.review_id = r.review_id AND v.is_kudos = 0),
    r.created_at, r.updated_at,
    (SELECT v.is_kudos FROM review_votes v WHERE v.review_id = r.review_id AND v.user_id = ?1)
    FROM reviews r";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<DbReview> {
    Ok(DbReview {
        review_id: row.get(0)?,
        course_id: row.get(1)?,
        user_id: row.get(2)?,
        term: row.get(3)?,
        professor: row.get(4)?,
        comments: row.get(5)?,
        kudos_count: row.get(6)?,
        dislike_count: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        user_vote: row.get(10)?,
    })
}

impl CourseDb {
    /// Reviews of a course, newest term first.
    pub fn course_reviews(
        &self,
        course_id: i64,
        viewer: Option<i64>,
    ) -> Result<Vec<DbReview>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "{REVIEW_SELECT} WHERE r.course_id = ?2 ORDER BY r.term DESC, r.review_id DESC"
        ))?;
        let reviews = stmt
            .query_map(params![viewer, course_id], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    /// Reviews of a course whose comments or professor contain `query`.
    pub fn search_course_reviews(
        &self,
        course_id: i64,
        query: &str,
        viewer: Option<i64>,
    ) -> Result<Vec<DbReview>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "{REVIEW_SELECT} WHERE r.course_id = ?2
               AND (r.comments LIKE ?3 ESCAPE '\\' OR r.professor LIKE ?3 ESCAPE '\\')
             ORDER BY r.term DESC, r.review_id DESC"
        ))?;
        let reviews = stmt
            .query_map(
                params![viewer, course_id, contains_pattern(query)],
                review_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    pub fn user_reviews(&self, user_id: i64) -> Result<Vec<DbReview>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "{REVIEW_SELECT} WHERE r.user_id = ?1 ORDER BY r.created_at DESC, r.review_id DESC"
        ))?;
        let reviews = stmt
            .query_map([user_id], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    pub fn get_review(&self, review_id: i64, viewer: Option<i64>) -> Result<Option<DbReview>, DbError> {
        let db = self.conn()?;
        Ok(db
            .query_row(
                &format!("{REVIEW_SELECT} WHERE r.review_id = ?2"),
                params![viewer, review_id],
                review_from_row,
            )
            .optional()?)
    }

    pub fn user_can_write_review(&self, user_id: i64, course_id: i64) -> Result<bool, DbError> {
        let db = self.conn()?;
        let exists: bool = db.query_row(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE user_id = ?1 AND course_id = ?2)",
            params![user_id, course_id],
            |row| row.get(0),
        )?;
        Ok(!exists)
    }

    /// Inserts a review. A user gets one review per course.
    pub fn create_review(
        &self,
        course_id: i64,
        user_id: i64,
        review: &NewReview,
    ) -> Result<i64, DbError> {
        let db = self.conn()?;
        let inserted = db.execute(
            "INSERT INTO reviews (course_id, user_id, professor, term, comments)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![course_id, user_id, review.professor, review.term, review.comments],
        );

        match inserted {
            Ok(_) => Ok(db.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                // Either the unique (user, course) pair or a dangling course id
                let course_exists: bool = db.query_row(
                    "SELECT EXISTS(SELECT 1 FROM courses WHERE course_id = ?)",
                    [course_id],
                    |row| row.get(0),
                )?;
                Err(if course_exists {
                    DbError::DuplicateReview
                } else {
                    DbError::CourseNotFound
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrites the user's own review. Returns false when no such review exists.
    pub fn update_review(
        &self,
        review_id: i64,
        user_id: i64,
        review: &NewReview,
    ) -> Result<bool, DbError> {
        let db = self.conn()?;
        let changed = db.execute(
            "UPDATE reviews SET professor = ?1, term = ?2, comments = ?3,
                updated_at = datetime('now')
             WHERE review_id = ?4 AND user_id = ?5",
            params![review.professor, review.term, review.comments, review_id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes the user's own review. Returns false when no such review exists.
    pub fn delete_review(&self, review_id: i64, user_id: i64) -> Result<bool, DbError> {
        let db = self.conn()?;
        let changed = db.execute(
            "DELETE FROM reviews WHERE review_id = ?1 AND user_id = ?2",
            params![review_id, user_id],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_util::seeded;

    fn review(term: &str) -> NewReview {
        NewReview {
            professor: "Jane Doe".to_string(),
            term: term.to_string(),
            comments: "Clear lectures and fair exams, the homework is heavy.".to_string(),
        }
    }

    #[test]
    fn test_one_review_per_user_and_course() {
        let db = seeded();
        let user = db.get_or_create_user("alice", "sjtu.edu.cn").unwrap();
        let course = db.find_course_by_code("MATH2140").unwrap().unwrap();

        assert!(db.user_can_write_review(user.user_id, course.course_id).unwrap());
        db.create_review(course.course_id, user.user_id, &review("24F"))
            .unwrap();
        assert!(!db.user_can_write_review(user.user_id, course.course_id).unwrap());

        assert!(matches!(
            db.create_review(course.course_id, user.user_id, &review("24S")),
            Err(DbError::DuplicateReview)
        ));
        assert!(matches!(
            db.create_review(9999, user.user_id, &review("24S")),
            Err(DbError::CourseNotFound)
        ));
        assert_eq!(db.count_reviews().unwrap(), 1);
    }

    #[test]
    fn test_search_update_delete_own_review() {
        let db = seeded();
        let alice = db.get_or_create_user("alice", "sjtu.edu.cn").unwrap();
        let bob = db.get_or_create_user("bob", "sjtu.edu.cn").unwrap();
        let course = db.find_course_by_code("MATH2140").unwrap().unwrap();
        let id = db
            .create_review(course.course_id, alice.user_id, &review("24F"))
            .unwrap();

        let hits = db
            .search_course_reviews(course.course_id, "homework", None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(db
            .search_course_reviews(course.course_id, "100%", None)
            .unwrap()
            .is_empty());

        assert!(!db.update_review(id, bob.user_id, &review("23F")).unwrap());
        assert!(db.update_review(id, alice.user_id, &review("23F")).unwrap());
        assert_eq!(db.get_review(id, None).unwrap().unwrap().term, "23F");

        assert!(!db.delete_review(id, bob.user_id).unwrap());
        assert!(db.delete_review(id, alice.user_id).unwrap());
        assert!(db.user_reviews(alice.user_id).unwrap().is_empty());
    }
}
