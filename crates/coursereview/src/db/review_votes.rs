//! Kudos/dislike votes on reviews.

use rusqlite::{params, OptionalExtension};

use super::types::ReviewVoteOutcome;
use super::{CourseDb, DbError};

impl CourseDb {
    /// Toggles a user's kudos (`true`) or dislike (`false`) on a review.
    ///
    /// A repeated vote of the same kind is withdrawn; the opposite kind
    /// replaces the stored one.
    pub fn vote_review(
        &self,
        review_id: i64,
        user_id: i64,
        is_kudos: bool,
    ) -> Result<ReviewVoteOutcome, DbError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let review_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE review_id = ?)",
            [review_id],
            |row| row.get(0),
        )?;
        if !review_exists {
            return Err(DbError::ReviewNotFound);
        }

        let existing: Option<bool> = tx
            .query_row(
                "SELECT is_kudos FROM review_votes WHERE review_id = ?1 AND user_id = ?2",
                params![review_id, user_id],
                |row| row.get(0),
            )
            .optional()?;

        let user_vote = match existing {
            Some(previous) if previous == is_kudos => {
                tx.execute(
                    "DELETE FROM review_votes WHERE review_id = ?1 AND user_id = ?2",
                    params![review_id, user_id],
                )?;
                None
            }
            Some(_) => {
                tx.execute(
                    "UPDATE review_votes SET is_kudos = ?1 WHERE review_id = ?2 AND user_id = ?3",
                    params![is_kudos, review_id, user_id],
                )?;
                Some(is_kudos)
            }
            None => {
                tx.execute(
                    "INSERT INTO review_votes (review_id, user_id, is_kudos) VALUES (?1, ?2, ?3)",
                    params![review_id, user_id, is_kudos],
                )?;
                Some(is_kudos)
            }
        };

        let (kudos_count, dislike_count): (i64, i64) = tx.query_row(
            "SELECT COALESCE(SUM(is_kudos = 1), 0), COALESCE(SUM(is_kudos = 0), 0)
             FROM review_votes WHERE review_id = ?",
            [review_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        tx.commit()?;

        Ok(ReviewVoteOutcome {
            kudos_count,
            dislike_count,
            user_vote,
        })
    }
}
