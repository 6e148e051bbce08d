//! User accounts and student profiles.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{DbStudent, DbUser};
use super::{CourseDb, DbError};

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<DbUser> {
    Ok(DbUser {
        user_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
    })
}

const USER_COLUMNS: &str = "user_id, username, email, password_hash, is_active";

fn student_for(db: &Connection, user_id: i64) -> Result<DbStudent, DbError> {
    db.execute(
        "INSERT OR IGNORE INTO students (user_id) VALUES (?)",
        [user_id],
    )?;
    let (student_id, raw_ids): (i64, String) = db.query_row(
        "SELECT student_id, unauth_session_ids FROM students WHERE user_id = ?",
        [user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(DbStudent {
        student_id,
        user_id,
        unauth_session_ids: serde_json::from_str(&raw_ids)?,
    })
}

fn save_session_ids(db: &Connection, student: &DbStudent) -> Result<(), DbError> {
    db.execute(
        "UPDATE students SET unauth_session_ids = ?1 WHERE student_id = ?2",
        params![
            serde_json::to_string(&student.unauth_session_ids)?,
            student.student_id
        ],
    )?;
    Ok(())
}

impl CourseDb {
    /// Fetches the user named `username`, creating an active account with
    /// email `<username>@<email_domain>` when none exists.
    pub fn get_or_create_user(&self, username: &str, email_domain: &str) -> Result<DbUser, DbError> {
        let db = self.conn()?;
        db.execute(
            "INSERT OR IGNORE INTO users (username, email) VALUES (?1, ?2)",
            params![username, format!("{username}@{email_domain}")],
        )?;
        Ok(db.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
            [username],
            user_from_row,
        )?)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<DbUser>, DbError> {
        let db = self.conn()?;
        Ok(db
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
                [username],
                user_from_row,
            )
            .optional()?)
    }

    /// Stores a new password hash and marks the account active.
    pub fn set_password(&self, user_id: i64, password_hash: &str) -> Result<(), DbError> {
        let db = self.conn()?;
        let changed = db.execute(
            "UPDATE users SET password_hash = ?1, is_active = 1 WHERE user_id = ?2",
            params![password_hash, user_id],
        )?;
        if changed == 0 {
            return Err(DbError::UserNotFound);
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn set_active(&self, user_id: i64, active: bool) -> Result<(), DbError> {
        let db = self.conn()?;
        db.execute(
            "UPDATE users SET is_active = ?1 WHERE user_id = ?2",
            params![active, user_id],
        )?;
        Ok(())
    }

    pub fn get_or_create_student(&self, user_id: i64) -> Result<DbStudent, DbError> {
        let db = self.conn()?;
        student_for(&db, user_id)
    }

    /// Records an anonymous session id against the user's student profile.
    pub fn add_unauth_session_id(&self, user_id: i64, anon_id: &str) -> Result<(), DbError> {
        let db = self.conn()?;
        let mut student = student_for(&db, user_id)?;
        if !student.unauth_session_ids.iter().any(|id| id == anon_id) {
            student.unauth_session_ids.push(anon_id.to_string());
            save_session_ids(&db, &student)?;
        }
        Ok(())
    }

    pub fn remove_unauth_session_id(&self, user_id: i64, anon_id: &str) -> Result<(), DbError> {
        let db = self.conn()?;
        let mut student = student_for(&db, user_id)?;
        let before = student.unauth_session_ids.len();
        student.unauth_session_ids.retain(|id| id != anon_id);
        if student.unauth_session_ids.len() != before {
            save_session_ids(&db, &student)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_user_is_idempotent() {
        let db = CourseDb::open_in_memory().unwrap();
        let first = db.get_or_create_user("alice", "sjtu.edu.cn").unwrap();
        let second = db.get_or_create_user("alice", "example.com").unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(second.email, "alice@sjtu.edu.cn");
        assert!(second.is_active);
        assert!(!second.has_password());
    }

    #[test]
    fn test_set_password_and_deactivate() {
        let db = CourseDb::open_in_memory().unwrap();
        let user = db.get_or_create_user("bob", "sjtu.edu.cn").unwrap();
        db.set_active(user.user_id, false).unwrap();
        db.set_password(user.user_id, "$argon2id$fake").unwrap();

        let user = db.find_user_by_username("bob").unwrap().unwrap();
        assert!(user.has_password());
        assert!(user.is_active);

        assert!(matches!(
            db.set_password(999, "x"),
            Err(DbError::UserNotFound)
        ));
    }

    #[test]
    fn test_unauth_session_ids() {
        let db = CourseDb::open_in_memory().unwrap();
        let user = db.get_or_create_user("carol", "sjtu.edu.cn").unwrap();

        db.add_unauth_session_id(user.user_id, "anon-1").unwrap();
        db.add_unauth_session_id(user.user_id, "anon-1").unwrap();
        db.add_unauth_session_id(user.user_id, "anon-2").unwrap();
        assert_eq!(
            db.get_or_create_student(user.user_id).unwrap().unauth_session_ids,
            vec!["anon-1", "anon-2"]
        );

        db.remove_unauth_session_id(user.user_id, "anon-1").unwrap();
        assert_eq!(
            db.get_or_create_student(user.user_id).unwrap().unauth_session_ids,
            vec!["anon-2"]
        );
    }
}
