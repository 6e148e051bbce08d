//! Department names and academic term helpers.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

static TERM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<year>[0-9]{2})(?P<season>[WSXFwsxf])$").unwrap());

const DEPARTMENTS: &[(&str, &str)] = &[
    ("ART", "Art"),
    ("BUS", "Business"),
    ("CHEM", "Chemistry"),
    ("CHN", "Chinese"),
    ("CUL", "Culture"),
    ("ECE", "Electrical and Computer Engineering"),
    ("ENGL", "English"),
    ("ENGR", "Engineering"),
    ("GER", "German"),
    ("HIS", "History"),
    ("IE", "Industrial Engineering"),
    ("MATH", "Mathematics"),
    ("ME", "Mechanical Engineering"),
    ("MSE", "Materials Science and Engineering"),
    ("PHIL", "Philosophy"),
    ("PHYS", "Physics"),
    ("POL", "Political Science"),
    ("SOC", "Sociology"),
    ("STAT", "Statistics and Data Science"),
    ("TC", "Technical Communication"),
    ("VE", "[Graduate] Electrical and Computer Engineering"),
    ("VG", "[Graduate] Technical Communication"),
    ("VM", "[Graduate] Mechanical Engineering"),
];

/// Looks up the display name of a department code (case-insensitive).
pub fn department_name(code: &str) -> Option<&'static str> {
    DEPARTMENTS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Returns the term code (e.g. `24F`) a date falls in.
///
/// February-April is spring, May-August summer, September-December fall.
/// January still belongs to the previous year's fall.
pub fn term_for_date(date: NaiveDate) -> String {
    let (year, season) = match date.month() {
        1 => (date.year() - 1, 'F'),
        2..=4 => (date.year(), 'S'),
        5..=8 => (date.year(), 'X'),
        _ => (date.year(), 'F'),
    };
    format!("{:02}{}", year.rem_euclid(100), season)
}

/// Sortable value of a term code, or 0 when the code is malformed.
pub fn numeric_value_of_term(term: &str) -> u32 {
    let Some(caps) = TERM_REGEX.captures(term) else {
        return 0;
    };
    let year: u32 = caps["year"].parse().unwrap_or(0);
    let season = match caps["season"].to_ascii_uppercase().as_str() {
        "W" => 1,
        "S" => 2,
        "X" => 3,
        _ => 4,
    };
    year * 10 + season
}

/// A review term must be a spring/summer/fall code no later than `current`.
pub fn is_valid_review_term(term: &str, current: &str) -> bool {
    if !term.is_ascii() || term.len() != 3 || !term[..2].chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if !matches!(term[2..].to_ascii_uppercase().as_str(), "S" | "X" | "F") {
        return false;
    }

    let term_value = numeric_value_of_term(term);
    let current_value = numeric_value_of_term(current);
    if current_value == 0 {
        return true;
    }
    term_value <= current_value
}
