//! Per-student quarterly performance: quarter labels, record lookup, skill
//! chart points, attendance totals and report requests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{RecordsError, RecordsResult};
use crate::record::{EntityRecord, FieldValue};
use crate::schema::format_field_label;

/// Quarter labels as stored; the year is swapped for whichever year is being viewed.
pub const QUARTERS: [&str; 4] = [
    "January 2025 - March 2025",
    "April 2025 - June 2025",
    "July 2025 - September 2025",
    "October 2025 - December 2025",
];

/// Years the performance view can page through.
pub const YEARS: [i32; 3] = [2024, 2025, 2026];

const CHART_LABEL_MAX: usize = 30;

static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());

/// Keys that identify a quarterly row rather than describe the student's progress.
const IDENTITY_KEYS: &[&str] = &[
    "id",
    "student_id",
    "program_id",
    "educator_employee_id",
    "quarter",
    "area_of_development",
    "is_sent",
];

/// Replaces every four-digit run in `label` with `year`.
fn replace_years(label: &str, year: i32) -> String {
    RE_YEAR.replace_all(label, year.to_string().as_str()).into_owned()
}

pub fn quarters_for_year(year: i32) -> Vec<String> {
    QUARTERS.iter().map(|q| replace_years(q, year)).collect()
}

/// A quarter label already mentioning `year` is kept; anything else is rebased onto it.
pub fn normalize_quarter(quarter: &str, year: i32) -> String {
    if quarter.contains(&year.to_string()) {
        quarter.to_string()
    } else {
        replace_years(quarter, year)
    }
}

/// Next year in the pager, or `None` at either end.
pub fn adjust_year(current: i32, delta: i32) -> Option<i32> {
    let next = current + delta;
    YEARS.contains(&next).then_some(next)
}

fn same_value(a: Option<&FieldValue>, b: Option<&FieldValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => !a.is_empty() && a.display() == b.display(),
        },
        _ => false,
    }
}

/// The row for this student's program and educator in the given quarter.
pub fn find_quarterly<'a>(
    rows: &'a [EntityRecord],
    student: &EntityRecord,
    quarter: &str,
) -> Option<&'a EntityRecord> {
    rows.iter().find(|row| {
        ["student_id", "program_id", "educator_employee_id"]
            .iter()
            .all(|k| same_value(row.get(k), student.get(k)))
            && row.text("quarter") == quarter
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub name: String,
    pub score: f64,
    pub full_description: String,
}

fn skill_number(key: &str) -> Option<&str> {
    key.contains("_score").then(|| key.split('_').next()).flatten()
}

pub fn has_score_data(row: &EntityRecord) -> bool {
    row.fields()
        .any(|(k, v)| k.contains("_score") && !matches!(v, FieldValue::Null))
}

/// One point per non-null `N_score` column, labelled by `N_description`.
pub fn chart_points(row: &EntityRecord) -> Vec<ChartPoint> {
    let mut scored: Vec<(&str, &FieldValue)> = row
        .fields()
        .filter(|(k, v)| k.contains("_score") && !matches!(v, FieldValue::Null))
        .filter_map(|(k, v)| skill_number(k).map(|n| (n, v)))
        .collect();
    scored.sort_by_key(|(n, _)| (n.parse::<u32>().unwrap_or(u32::MAX), n.to_string()));

    scored
        .into_iter()
        .map(|(n, value)| {
            let description = row
                .get(&format!("{n}_description"))
                .filter(|v| !v.is_empty())
                .map(FieldValue::display)
                .unwrap_or_else(|| format!("Skill {n}"));
            let name = if description.chars().count() > CHART_LABEL_MAX {
                format!("{}...", description.chars().take(CHART_LABEL_MAX).collect::<String>())
            } else {
                description.clone()
            };
            ChartPoint {
                name,
                score: value.as_f64().unwrap_or(0.0),
                full_description: description,
            }
        })
        .collect()
}

/// `1_score` reads as "Score 1"; other keys get the usual field label.
pub fn format_display_key(key: &str) -> String {
    if let Some((number, rest)) = key.split_once('_') {
        if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
            let kind = rest.split('_').next().unwrap_or(rest);
            let mut chars = kind.chars();
            let head: String = chars.next().map(|c| c.to_uppercase().collect()).unwrap_or_default();
            return format!("{head}{} {number}", chars.as_str());
        }
    }
    format_field_label(key)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub key: String,
    pub label: String,
    pub value: FieldValue,
    /// Scores are out of ten.
    pub is_score: bool,
}

/// Everything on a quarterly row except the identifying columns and empty values.
pub fn metrics(row: &EntityRecord) -> Vec<Metric> {
    row.fields()
        .filter(|(k, v)| !matches!(v, FieldValue::Null) && !IDENTITY_KEYS.contains(&k.as_str()))
        .map(|(k, v)| Metric {
            key: k.clone(),
            label: format_display_key(k),
            value: v.clone(),
            is_score: k.contains("_score"),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub present: u32,
    pub absent: u32,
}

impl AttendanceSummary {
    pub fn from_rows(rows: &[EntityRecord]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            match row.get("attendance").and_then(FieldValue::as_bool) {
                Some(true) => summary.present += 1,
                Some(false) => summary.absent += 1,
                None => {}
            }
        }
        summary
    }

    /// Whole-number attendance rate, `None` with no recorded days.
    pub fn rate_percent(&self) -> Option<u32> {
        let total = self.present + self.absent;
        (total > 0).then(|| ((self.present as f64 / total as f64) * 100.0).round() as u32)
    }
}

/// Payload for the external report generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRequest {
    pub student_id: i64,
    pub program_id: i64,
    pub educator_employee_id: i64,
    pub quarter: String,
}

impl ReportRequest {
    pub fn for_student(student: &EntityRecord, quarter: &str, year: i32) -> RecordsResult<Self> {
        let id = |key: &str| {
            student
                .int(key)
                .ok_or_else(|| RecordsError::field(key, format!("{} is required", key.replace('_', " "))))
        };
        Ok(Self {
            student_id: id("student_id")?,
            program_id: id("program_id")?,
            educator_employee_id: id("educator_employee_id")?,
            quarter: normalize_quarter(quarter, year),
        })
    }
}

/// `First_Last_Quarter_With_Underscores_Report.pdf`
pub fn report_file_name(first_name: &str, last_name: &str, quarter: &str) -> String {
    let quarter: String = quarter
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{first_name}_{last_name}_{quarter}_Report.pdf")
}
