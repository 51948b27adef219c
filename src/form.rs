//! Form state for one entity instance: seeding, derived fields, validation, submit.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FieldErrors, RecordsError, RecordsResult};
use crate::record::{Entity, EntityKind, EntityRecord, FieldValue, ROW_ID_FIELD, ROW_INDEX_FIELD};
use crate::schema::{InputKind, SchemaRegistry};

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").unwrap());

/// Oldest year the date picker offers.
pub const DATE_PICKER_FROM_YEAR: i32 = 1950;
/// The picker runs this many years past the current one.
pub const DATE_PICKER_YEARS_AHEAD: i32 = 10;

pub fn date_picker_to_year() -> i32 {
    chrono::Local::now().year() + DATE_PICKER_YEARS_AHEAD
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Center {
    pub center_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub program_id: i64,
    pub name: String,
}

/// Department implied by a designation. Unknown designations imply none.
pub fn department_for(designation: &str) -> &'static str {
    match designation {
        "Educator" => "Education",
        "HR" => "Human Resources",
        "Administrator" => "Management",
        _ => "",
    }
}

#[derive(Debug, Clone)]
pub struct FormController {
    kind: EntityKind,
    row_id: Option<String>,
    values: EntityRecord,
    errors: FieldErrors,
    centers: Vec<Center>,
    saving: bool,
}

impl FormController {
    /// A blank instance: every declared field present and empty.
    pub fn blank(kind: EntityKind, registry: &SchemaRegistry) -> Self {
        let values = registry
            .fields(kind)
            .iter()
            .map(|d| (d.name.clone(), FieldValue::Null))
            .collect();
        Self {
            kind,
            row_id: None,
            values,
            errors: FieldErrors::new(),
            centers: Vec::new(),
            saving: false,
        }
    }

    /// Seeds from a fetched or prefilled record. The surrogate row id is kept aside
    /// as the update target and never appears among the editable values.
    pub fn initialize(kind: EntityKind, mut record: EntityRecord) -> Self {
        let row_id = record.row_id();
        record.remove(ROW_ID_FIELD);
        record.remove(ROW_INDEX_FIELD);
        Self {
            kind,
            row_id,
            values: record,
            errors: FieldErrors::new(),
            centers: Vec::new(),
            saving: false,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn row_id(&self) -> Option<&str> {
        self.row_id.as_deref()
    }

    pub fn values(&self) -> &EntityRecord {
        &self.values
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn centers(&self) -> &[Center] {
        &self.centers
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Loads the centers list. A center already on the form fills in its work location.
    pub fn set_centers(&mut self, centers: Vec<Center>) {
        self.centers = centers;
        if let Some(value) = self.values.get("center_id").cloned() {
            self.derive_work_location(&value);
        }
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        self.values.set(name, value.clone());
        self.errors.remove(name);

        match name {
            "designation" if self.kind == EntityKind::Employee => {
                let department = department_for(value.display().trim());
                self.values.set("department", FieldValue::text(department));
            }
            "center_id" => self.derive_work_location(&value),
            _ => {}
        }
    }

    /// Only employees carry a work location.
    fn derive_work_location(&mut self, center_value: &FieldValue) {
        if self.kind != EntityKind::Employee {
            return;
        }
        let Some(center_id) = center_value.as_i64() else {
            return;
        };
        if let Some(center) = self.centers.iter().find(|c| c.center_id == center_id) {
            self.values
                .set("work_location", FieldValue::text(center.name.clone()));
        }
    }

    /// Field -> message. Empty means valid.
    pub fn validate(&self, registry: &SchemaRegistry) -> FieldErrors {
        let mut errors = FieldErrors::new();

        for name in registry.required_fields(self.kind) {
            let missing = self.values.get(name).map(FieldValue::is_empty).unwrap_or(true);
            if missing {
                errors.insert(name.to_string(), format!("{} is required", name.replace('_', " ")));
            }
        }

        let to_year = date_picker_to_year();
        for (name, value) in self.values.fields() {
            if value.is_empty() || errors.contains_key(name) {
                continue;
            }
            if is_email_field(name) && !is_email_shaped(&value.display()) {
                errors.insert(name.clone(), "Invalid email format".to_string());
                continue;
            }
            let Some(desc) = registry.descriptor(self.kind, name) else {
                continue;
            };
            let message = match &desc.input {
                kind if kind.is_integer() && value.as_i64().is_none() => {
                    Some(format!("{} must be a number", desc.label))
                }
                InputKind::Decimal if value.as_f64().is_none() => {
                    Some(format!("{} must be a number", desc.label))
                }
                InputKind::Boolean if value.as_bool().is_none() => {
                    Some(format!("{} must be yes or no", desc.label))
                }
                InputKind::Date => match value.as_date() {
                    None => Some(format!("{} must be a date (YYYY-MM-DD)", desc.label)),
                    Some(d) if d.year() < DATE_PICKER_FROM_YEAR || d.year() > to_year => Some(format!(
                        "{} must be between {} and {}",
                        desc.label, DATE_PICKER_FROM_YEAR, to_year
                    )),
                    Some(_) => None,
                },
                InputKind::Select
                    if !desc.options.is_empty() && !desc.options.contains(&value.display()) =>
                {
                    Some(format!("{} must be one of: {}", desc.label, desc.options.join(", ")))
                }
                _ => None,
            };
            if let Some(message) = message {
                errors.insert(name.clone(), message);
            }
        }

        errors
    }

    /// Runs validation and keeps the result for rendering.
    pub fn check(&mut self, registry: &SchemaRegistry) -> bool {
        self.errors = self.validate(registry);
        self.errors.is_empty()
    }

    /// Current values with declared types applied and the row id restored.
    pub fn snapshot(&self, registry: &SchemaRegistry) -> RecordsResult<Entity> {
        let mut record: EntityRecord = self
            .values
            .fields()
            .map(|(name, value)| {
                let coerced = match registry.descriptor(self.kind, name) {
                    Some(desc) => coerce(&desc.input, value),
                    None => value.clone(),
                };
                (name.clone(), coerced)
            })
            .collect();
        if let Some(row_id) = &self.row_id {
            record.set(ROW_ID_FIELD, FieldValue::text(row_id.clone()));
        }
        Entity::from_record(self.kind, &record)
    }

    /// First half of a submit: validates and marks the form as saving.
    /// A second call before [`FormController::complete_submit`] is rejected.
    pub fn prepare_submit(&mut self, registry: &SchemaRegistry) -> RecordsResult<Entity> {
        if self.saving {
            return Err(RecordsError::Busy);
        }
        if !self.check(registry) {
            debug!(entity = %self.kind, errors = self.errors.len(), "form validation failed");
            return Err(RecordsError::Validation(self.errors.clone()));
        }
        let snapshot = self.snapshot(registry)?;
        self.saving = true;
        Ok(snapshot)
    }

    /// Second half of a submit. Values are never touched; only the saving flag resets.
    pub fn complete_submit<T>(&mut self, outcome: &RecordsResult<T>) {
        self.saving = false;
        if outcome.is_ok() {
            self.errors.clear();
        }
    }

    pub fn submit<T, F>(&mut self, registry: &SchemaRegistry, save: F) -> RecordsResult<T>
    where
        F: FnOnce(&Entity) -> RecordsResult<T>,
    {
        let snapshot = self.prepare_submit(registry)?;
        let outcome = save(&snapshot);
        self.complete_submit(&outcome);
        outcome
    }
}

fn coerce(input: &InputKind, value: &FieldValue) -> FieldValue {
    if matches!(value, FieldValue::Null) {
        return FieldValue::Null;
    }
    match input {
        kind if kind.is_integer() => {
            if value.is_empty() {
                FieldValue::Null
            } else {
                value.as_i64().map(FieldValue::Int).unwrap_or_else(|| value.clone())
            }
        }
        InputKind::Decimal => {
            if value.is_empty() {
                FieldValue::Null
            } else {
                value.as_f64().map(FieldValue::Float).unwrap_or_else(|| value.clone())
            }
        }
        InputKind::Boolean => value.as_bool().map(FieldValue::Bool).unwrap_or(FieldValue::Null),
        InputKind::Date => {
            if value.is_empty() {
                FieldValue::Null
            } else {
                value.as_date().map(FieldValue::Date).unwrap_or_else(|| value.clone())
            }
        }
        _ => FieldValue::Text(value.display()),
    }
}

fn is_email_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "email" || lower.ends_with("_email") || lower.ends_with("'s email")
}

/// Something, an `@`, something, a dot, something. No whitespace in the parts.
pub fn is_email_shaped(s: &str) -> bool {
    RE_EMAIL.is_match(s)
}
