//! Bulk CSV import: every data row goes through a fresh form controller, so
//! imported rows get the same derivations and validation as hand-entered ones.

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::Persistence;
use crate::error::{FieldErrors, RecordsError, RecordsResult};
use crate::form::{Center, FormController};
use crate::record::{Entity, EntityKind, EntityRecord, FieldValue};
use crate::schema::SchemaRegistry;

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub line: usize,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub columns: Vec<String>,
    /// Headers that match no field of the entity; their cells are ignored.
    pub ignored_headers: Vec<String>,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub issues: Vec<RowIssue>,
    #[serde(skip)]
    entities: Vec<(usize, Entity)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub inserted: usize,
    pub skipped: usize,
    pub issues: Vec<RowIssue>,
}

fn resolve_header(registry: &SchemaRegistry, kind: EntityKind, header: &str) -> Option<String> {
    registry.resolve_key(kind, header).map(|d| d.name.clone())
}

pub fn preview_csv(
    registry: &SchemaRegistry,
    kind: EntityKind,
    centers: &[Center],
    text: &str,
) -> RecordsResult<ImportPreview> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        return Err(RecordsError::BadInput("csv is empty".into()));
    };

    let headers = parse_csv_record(header_line.trim_start_matches('\u{feff}'));
    let mapped: Vec<Option<String>> = headers
        .iter()
        .map(|h| resolve_header(registry, kind, h))
        .collect();
    if mapped.iter().all(Option::is_none) {
        return Err(RecordsError::BadInput(format!(
            "no csv header matches a {kind} field"
        )));
    }

    let mut preview = ImportPreview {
        columns: mapped.iter().flatten().cloned().collect(),
        ignored_headers: headers
            .iter()
            .zip(&mapped)
            .filter(|(_, m)| m.is_none())
            .map(|(h, _)| h.trim().to_string())
            .collect(),
        total_rows: 0,
        valid_rows: 0,
        issues: Vec::new(),
        entities: Vec::new(),
    };

    for (idx, line) in lines {
        let line_no = idx + 1;
        preview.total_rows += 1;
        let cells = parse_csv_record(line);

        let mut form = FormController::initialize(kind, EntityRecord::new());
        form.set_centers(centers.to_vec());
        for (col, cell) in mapped.iter().zip(cells.iter()) {
            let Some(name) = col else { continue };
            let cell = cell.trim();
            let value = if cell.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::text(cell)
            };
            form.set_field(name, value);
        }

        let errors = form.validate(registry);
        if !errors.is_empty() {
            preview.issues.push(RowIssue { line: line_no, errors });
            continue;
        }
        match form.snapshot(registry) {
            Ok(entity) => {
                preview.valid_rows += 1;
                preview.entities.push((line_no, entity));
            }
            Err(e) => preview.issues.push(RowIssue {
                line: line_no,
                errors: row_error(e),
            }),
        }
    }

    Ok(preview)
}

/// Inserts every valid row; rows the backend rejects are reported, not fatal.
pub fn apply_csv<P: Persistence + ?Sized>(
    backend: &mut P,
    registry: &SchemaRegistry,
    kind: EntityKind,
    centers: &[Center],
    text: &str,
) -> RecordsResult<ImportOutcome> {
    let preview = preview_csv(registry, kind, centers, text)?;
    let mut outcome = ImportOutcome {
        inserted: 0,
        skipped: preview.issues.len(),
        issues: preview.issues,
    };
    for (line, entity) in preview.entities {
        match backend.insert(kind.table(), &entity.to_record()) {
            Ok(_) => outcome.inserted += 1,
            Err(e) => {
                warn!(entity = %kind, line, error = %e, "csv row rejected");
                outcome.skipped += 1;
                outcome.issues.push(RowIssue {
                    line,
                    errors: row_error(e),
                });
            }
        }
    }
    outcome.issues.sort_by_key(|i| i.line);
    info!(entity = %kind, inserted = outcome.inserted, skipped = outcome.skipped, "csv import applied");
    Ok(outcome)
}

fn row_error(e: RecordsError) -> FieldErrors {
    match e {
        RecordsError::Validation(errors) => errors,
        other => {
            let mut errors = FieldErrors::new();
            errors.insert("row".to_string(), other.to_string());
            errors
        }
    }
}
