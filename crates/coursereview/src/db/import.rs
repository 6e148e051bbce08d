//! Bulk course import from crawled JSON.

use rusqlite::{params, OptionalExtension, Transaction};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use super::{CourseDb, DbError};

/// One course as produced by the catalog crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportedCourse {
    pub course_code: String,
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub course_credits: Option<i64>,
    #[serde(default)]
    pub pre_requisites: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub course_topics: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub offerings: Vec<ImportedOffering>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportedOffering {
    pub term: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub instructors: Vec<String>,
}

impl CourseDb {
    /// Reads a JSON array of courses from `path` and upserts it.
    pub fn import_file(&self, path: &Path) -> Result<usize, DbError> {
        let content = fs::read_to_string(path).map_err(|source| DbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let courses: Vec<ImportedCourse> = serde_json::from_str(&content)?;
        let count = self.import_courses(&courses)?;
        info!("Imported {} courses from {}", count, path.display());
        Ok(count)
    }

    /// Upserts courses by `course_code`, along with their offerings and
    /// instructors. Runs in one transaction.
    pub fn import_courses(&self, courses: &[ImportedCourse]) -> Result<usize, DbError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        for course in courses {
            let course_id = upsert_course(&tx, course)?;
            for offering in &course.offerings {
                upsert_offering(&tx, course_id, offering)?;
            }
        }

        tx.commit()?;
        Ok(courses.len())
    }
}

fn upsert_course(tx: &Transaction<'_>, course: &ImportedCourse) -> Result<i64, DbError> {
    let topics = serde_json::to_string(&course.course_topics)?;
    tx.execute(
        "INSERT INTO courses (
            course_code, course_title, department, number, course_credits,
            pre_requisites, description, course_topics, url
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(course_code) DO UPDATE SET
            course_title = excluded.course_title,
            department = excluded.department,
            number = excluded.number,
            course_credits = excluded.course_credits,
            pre_requisites = excluded.pre_requisites,
            description = excluded.description,
            course_topics = excluded.course_topics,
            url = excluded.url,
            updated_at = datetime('now')",
        params![
            course.course_code,
            course.course_title,
            course.department,
            course.number.unwrap_or(0),
            course.course_credits.unwrap_or(0),
            course.pre_requisites.as_deref().unwrap_or(""),
            course.description,
            topics,
            course.url.as_deref().unwrap_or(""),
        ],
    )?;

    Ok(tx.query_row(
        "SELECT course_id FROM courses WHERE course_code = ?",
        [&course.course_code],
        |row| row.get(0),
    )?)
}

fn upsert_offering(
    tx: &Transaction<'_>,
    course_id: i64,
    offering: &ImportedOffering,
) -> Result<(), DbError> {
    tx.execute(
        "INSERT INTO course_offerings (course_id, term, section, period)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(course_id, term, section) DO UPDATE SET period = excluded.period",
        params![course_id, offering.term, offering.section, offering.period],
    )?;
    let offering_id: i64 = tx.query_row(
        "SELECT offering_id FROM course_offerings
         WHERE course_id = ?1 AND term = ?2 AND section = ?3",
        params![course_id, offering.term, offering.section],
        |row| row.get(0),
    )?;

    for name in offering.instructors.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT instructor_id FROM instructors WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        let instructor_id = match existing {
            Some(id) => id,
            None => {
                tx.execute("INSERT INTO instructors (name) VALUES (?)", [name])?;
                tx.last_insert_rowid()
            }
        };
        tx.execute(
            "INSERT OR IGNORE INTO course_offering_instructors (offering_id, instructor_id)
             VALUES (?1, ?2)",
            params![offering_id, instructor_id],
        )?;
    }

    Ok(())
}

#[cfg(test)]
impl ImportedCourse {
    /// A course with one offering taught by `instructor` in `term`.
    pub(crate) fn sample(code: &str, title: &str, term: &str, instructor: &str) -> Self {
        let split = code.find(|c: char| c.is_ascii_digit()).unwrap_or(code.len());
        Self {
            course_code: code.to_string(),
            course_title: title.to_string(),
            department: code[..split].to_string(),
            number: code[split..].parse().ok(),
            course_credits: Some(4),
            pre_requisites: None,
            description: format!("{title} covers the usual material."),
            course_topics: vec![],
            url: None,
            offerings: vec![ImportedOffering {
                term: term.to_string(),
                section: "1".to_string(),
                period: String::new(),
                instructors: vec![instructor.to_string()],
            }],
        }
    }
}
