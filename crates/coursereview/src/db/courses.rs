//! Course queries: listing, lookup, search and department counts.

use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::types::{CourseFilter, CoursePage, DbCourse, DbOffering, DepartmentCount};
use super::{CourseDb, DbError};

static COURSE_SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<dept>\D*)(?P<number>\d*)(?P<other>.*)$").unwrap());

/// A bare search term of one of these lengths may be a department code.
pub const DEPARTMENT_LENGTHS: [usize; 3] = [2, 3, 4];

const COURSE_COLUMNS: &str = "c.course_id, c.course_code, c.course_title, c.department,
    c.number, c.course_credits, c.pre_requisites, c.description, c.course_topics, c.url,
    c.quality_score, c.difficulty_score,
    (SELECT COUNT(*) FROM reviews r WHERE r.course_id = c.course_id) AS review_count";

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<DbCourse> {
    let topics: String = row.get(8)?;
    Ok(DbCourse {
        course_id: row.get(0)?,
        course_code: row.get(1)?,
        course_title: row.get(2)?,
        department: row.get(3)?,
        number: row.get(4)?,
        course_credits: row.get(5)?,
        pre_requisites: row.get(6)?,
        description: row.get(7)?,
        course_topics: serde_json::from_str(&topics).unwrap_or_default(),
        url: row.get(9)?,
        quality_score: row.get(10)?,
        difficulty_score: row.get(11)?,
        review_count: row.get(12)?,
    })
}

/// Escapes LIKE wildcards and wraps `term` for a substring match.
pub(super) fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

impl CourseDb {
    /// Returns one page of courses. Pages outside the valid range fall back
    /// to the first page.
    pub fn list_courses(
        &self,
        filter: &CourseFilter,
        page: usize,
        page_size: usize,
    ) -> Result<CoursePage, DbError> {
        let page_size = page_size.max(1);
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(department) = filter.department.as_deref().filter(|d| !d.is_empty()) {
            clauses.push("c.department = ? COLLATE NOCASE");
            args.push(Value::Text(department.to_string()));
        }
        if let Some(code) = filter.code.as_deref().filter(|c| !c.is_empty()) {
            clauses.push("c.course_code LIKE ? ESCAPE '\\'");
            args.push(Value::Text(contains_pattern(code)));
        }
        if let Some(min_quality) = filter.min_quality {
            clauses.push("c.quality_score >= ?");
            args.push(Value::Real(min_quality));
        }
        if let Some(min_difficulty) = filter.min_difficulty {
            clauses.push("c.difficulty_score >= ?");
            args.push(Value::Real(min_difficulty));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let db = self.conn()?;
        let total: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM courses c {where_sql}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;
        let total = total.max(0) as usize;
        let total_pages = total.div_ceil(page_size).max(1);
        let current_page = if (1..=total_pages).contains(&page) {
            page
        } else {
            1
        };

        let direction = if filter.descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses c {where_sql}
             ORDER BY {} {direction}, c.course_code ASC
             LIMIT {page_size} OFFSET {}",
            filter.sort.column(),
            (current_page - 1) * page_size,
        );

        let mut stmt = db.prepare(&sql)?;
        let courses = stmt
            .query_map(params_from_iter(args.iter()), course_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CoursePage {
            courses,
            current_page,
            total_pages,
            total_courses: total,
        })
    }

    pub fn get_course(&self, course_id: i64) -> Result<Option<DbCourse>, DbError> {
        let db = self.conn()?;
        Ok(db
            .query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.course_id = ?"),
                [course_id],
                course_from_row,
            )
            .optional()?)
    }

    pub fn find_course_by_code(&self, course_code: &str) -> Result<Option<DbCourse>, DbError> {
        let db = self.conn()?;
        Ok(db
            .query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.course_code = ?"),
                [course_code],
                course_from_row,
            )
            .optional()?)
    }

    /// Offerings of a course, newest term first, each with its instructors.
    pub fn course_offerings(&self, course_id: i64) -> Result<Vec<DbOffering>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT offering_id, term, section, period FROM course_offerings
             WHERE course_id = ? ORDER BY term DESC, section ASC",
        )?;
        let mut offerings = stmt
            .query_map([course_id], |row| {
                Ok(DbOffering {
                    offering_id: row.get(0)?,
                    term: row.get(1)?,
                    section: row.get(2)?,
                    period: row.get(3)?,
                    instructors: Vec::new(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut instructor_stmt = db.prepare(
            "SELECT i.name FROM instructors i
             JOIN course_offering_instructors coi ON coi.instructor_id = i.instructor_id
             WHERE coi.offering_id = ? ORDER BY i.instructor_id",
        )?;
        for offering in &mut offerings {
            offering.instructors = instructor_stmt
                .query_map([offering.offering_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
        }

        Ok(offerings)
    }

    /// Distinct instructors of a course, optionally limited to one term.
    pub fn course_instructors(
        &self,
        course_id: i64,
        term: Option<&str>,
    ) -> Result<Vec<String>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT i.name FROM instructors i
             JOIN course_offering_instructors coi ON coi.instructor_id = i.instructor_id
             JOIN course_offerings o ON o.offering_id = coi.offering_id
             WHERE o.course_id = ?1 AND (?2 IS NULL OR o.term = ?2)
             GROUP BY i.instructor_id
             ORDER BY MIN(o.offering_id), i.instructor_id",
        )?;
        let names = stmt
            .query_map(params![course_id, term], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn is_offered_in_term(&self, course_id: i64, term: &str) -> Result<bool, DbError> {
        let db = self.conn()?;
        Ok(db.query_row(
            "SELECT EXISTS(SELECT 1 FROM course_offerings WHERE course_id = ?1 AND term = ?2)",
            params![course_id, term],
            |row| row.get(0),
        )?)
    }

    /// Sorted union of professors named in reviews and offering instructors.
    pub fn course_professors(&self, course_id: i64) -> Result<Vec<String>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT professor FROM reviews WHERE course_id = ?1
             UNION
             SELECT i.name FROM instructors i
             JOIN course_offering_instructors coi ON coi.instructor_id = i.instructor_id
             JOIN course_offerings o ON o.offering_id = coi.offering_id
             WHERE o.course_id = ?1",
        )?;
        let names: BTreeSet<String> = stmt
            .query_map([course_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(names.into_iter().collect())
    }

    /// Professors with their review counts, most reviewed first, followed by
    /// instructors nobody has reviewed yet (count 0).
    pub fn professors_and_review_count(
        &self,
        course_id: i64,
    ) -> Result<Vec<(String, i64)>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT professor, COUNT(*) AS n FROM reviews WHERE course_id = ?
             GROUP BY professor ORDER BY n DESC, professor ASC",
        )?;
        let mut counts = stmt
            .query_map([course_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        let mut unreviewed = db.prepare(
            "SELECT DISTINCT i.name FROM instructors i
             JOIN course_offering_instructors coi ON coi.instructor_id = i.instructor_id
             JOIN course_offerings o ON o.offering_id = coi.offering_id
             WHERE o.course_id = ?1
               AND i.name NOT IN (SELECT professor FROM reviews WHERE course_id = ?1)
             ORDER BY i.name",
        )?;
        let extra = unreviewed
            .query_map([course_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        counts.extend(extra.into_iter().map(|name| (name, 0)));

        Ok(counts)
    }

    /// Free-text course search.
    ///
    /// A leading run of 2-4 non-digits is tried as a department code (with
    /// an optional course number); anything else matches course titles.
    pub fn search_courses(&self, query: &str) -> Result<Vec<DbCourse>, DbError> {
        let query = query.trim();
        let Some(caps) = COURSE_SEARCH.captures(query) else {
            return Ok(Vec::new());
        };
        let dept = caps["dept"].trim();
        let number = caps["number"].trim();

        if dept.is_empty() {
            return Ok(Vec::new());
        }

        let mut courses = if !DEPARTMENT_LENGTHS.contains(&dept.chars().count()) {
            self.courses_by_title(dept)?
        } else if !number.is_empty() {
            let number: i64 = number.parse().unwrap_or(-1);
            self.query_courses(
                "WHERE c.department = ?1 COLLATE NOCASE AND c.number = ?2 ORDER BY c.course_code",
                &[Value::Text(dept.to_string()), Value::Integer(number)],
            )?
        } else {
            let by_department = self.query_courses(
                "WHERE c.department = ?1 COLLATE NOCASE ORDER BY c.number, c.course_code",
                &[Value::Text(dept.to_string())],
            )?;
            if by_department.is_empty() {
                self.courses_by_title(dept)?
            } else {
                by_department
            }
        };

        if !DEPARTMENT_LENGTHS.contains(&query.chars().count()) {
            courses.sort_by(|a, b| b.review_count.cmp(&a.review_count));
        }

        Ok(courses)
    }

    fn courses_by_title(&self, title: &str) -> Result<Vec<DbCourse>, DbError> {
        self.query_courses(
            "WHERE c.course_title LIKE ?1 ESCAPE '\\' ORDER BY c.course_code",
            &[Value::Text(contains_pattern(title))],
        )
    }

    fn query_courses(&self, tail: &str, args: &[Value]) -> Result<Vec<DbCourse>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!("SELECT {COURSE_COLUMNS} FROM courses c {tail}"))?;
        let courses = stmt
            .query_map(params_from_iter(args.iter()), course_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(courses)
    }

    /// Number of courses per department code, ordered by code.
    pub fn department_counts(&self) -> Result<Vec<DepartmentCount>, DbError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT department, COUNT(*) FROM courses GROUP BY department ORDER BY department",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(DepartmentCount {
                    code: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}
