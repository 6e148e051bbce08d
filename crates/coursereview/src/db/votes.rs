//! Course quality/difficulty votes and score aggregation.

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::debug;

use super::types::{UserVotes, VoteCategory, VoteOutcome};
use super::{CourseDb, DbError};

impl CourseDb {
    /// Records `value` (1-5, or 0 to withdraw) for a user's vote on a course.
    ///
    /// Resubmitting the stored value withdraws the vote. The course's score
    /// for the category is recomputed as the mean of non-zero votes, rounded
    /// half-to-even to one decimal. Runs in an IMMEDIATE transaction so
    /// concurrent voters on the same database serialise.
    pub fn vote(
        &self,
        value: i64,
        course_id: i64,
        category: VoteCategory,
        user_id: i64,
    ) -> Result<VoteOutcome, DbError> {
        if !(0..=5).contains(&value) {
            return Err(DbError::InvalidVoteValue(value));
        }

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let course_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM courses WHERE course_id = ?)",
            [course_id],
            |row| row.get(0),
        )?;
        if !course_exists {
            return Err(DbError::CourseNotFound);
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT value FROM votes WHERE course_id = ?1 AND user_id = ?2 AND category = ?3",
                params![course_id, user_id, category.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let (stored, was_unvote) = match existing {
            Some(previous) if previous == value => (0, true),
            _ => (value, value == 0),
        };

        tx.execute(
            "INSERT INTO votes (course_id, user_id, category, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(course_id, user_id, category) DO UPDATE SET value = excluded.value",
            params![course_id, user_id, category.as_str(), stored],
        )?;

        let (mean, count): (Option<f64>, i64) = tx.query_row(
            "SELECT AVG(value), COUNT(*) FROM votes
             WHERE course_id = ?1 AND category = ?2 AND value != 0",
            params![course_id, category.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let new_score = mean.map_or(0.0, |m| (m * 10.0).round_ties_even() / 10.0);

        tx.execute(
            &format!(
                "UPDATE courses SET {} = ?1, updated_at = datetime('now') WHERE course_id = ?2",
                category.score_column()
            ),
            params![new_score, course_id],
        )?;

        tx.commit()?;

        debug!(
            course_id,
            category = category.as_str(),
            new_score,
            was_unvote,
            "Recorded course vote"
        );

        Ok(VoteOutcome {
            new_score,
            was_unvote,
            new_vote_count: count,
        })
    }

    /// The user's current votes on a course.
    pub fn user_votes(&self, course_id: i64, user_id: i64) -> Result<UserVotes, DbError> {
        let db = self.conn()?;
        let mut stmt =
            db.prepare("SELECT category, value FROM votes WHERE course_id = ?1 AND user_id = ?2")?;
        let rows = stmt
            .query_map(params![course_id, user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut votes = UserVotes::default();
        for (category, value) in rows {
            match category.as_str() {
                "quality" => votes.quality = value,
                "difficulty" => votes.difficulty = value,
                _ => {}
            }
        }
        Ok(votes)
    }

    /// Number of non-withdrawn votes in a category.
    pub fn vote_count(&self, course_id: i64, category: VoteCategory) -> Result<i64, DbError> {
        let db = self.conn()?;
        Ok(db.query_row(
            "SELECT COUNT(*) FROM votes WHERE course_id = ?1 AND category = ?2 AND value != 0",
            params![course_id, category.as_str()],
            |row| row.get(0),
        )?)
    }
}
