use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{RecordsError, RecordsResult};

/// Surrogate row id; never edited through a form.
pub const ROW_ID_FIELD: &str = "id";
/// Position marker added by spreadsheet-style imports.
pub const ROW_INDEX_FIELD: &str = "rowIndex";

/// A single cell. Untagged so the wire shape is plain JSON scalars.
/// Variant order matters for deserialization: dates are tried before text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            FieldValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Int(v) => Some(*v != 0),
            FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    /// Display form; `Null` renders as the empty string.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn char_len(&self) -> usize {
        match self {
            FieldValue::Text(s) => s.chars().count(),
            _ => 0,
        }
    }

    pub fn from_sql_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(v) => FieldValue::Int(v),
            ValueRef::Real(v) => FieldValue::Float(v),
            ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).to_string()),
            ValueRef::Blob(_) => FieldValue::Null,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::from(rusqlite::types::Null),
            FieldValue::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            FieldValue::Int(v) => ToSqlOutput::from(*v),
            FieldValue::Float(v) => ToSqlOutput::from(*v),
            FieldValue::Date(d) => ToSqlOutput::from(d.format("%Y-%m-%d").to_string()),
            FieldValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

/// Field name -> value for one row of any entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord(pub BTreeMap<String, FieldValue>);

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.remove(field)
    }

    pub fn text(&self, field: &str) -> String {
        self.get(field).map(FieldValue::display).unwrap_or_default()
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }

    pub fn row_id(&self) -> Option<String> {
        self.get(ROW_ID_FIELD)
            .filter(|v| !v.is_empty())
            .map(FieldValue::display)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn from_json(value: serde_json::Value) -> RecordsResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| RecordsError::BadInput(format!("record must be an object of scalars: {e}")))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(String, FieldValue)> for EntityRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        EntityRecord(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Employee,
    Student,
    Payroll,
    Performance,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Employee,
        EntityKind::Student,
        EntityKind::Payroll,
        EntityKind::Performance,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Employee => "employees",
            EntityKind::Student => "students",
            EntityKind::Payroll => "payroll",
            EntityKind::Performance => "performance_records",
        }
    }

    /// The entity-specific numeric id, if the entity has one.
    pub fn id_field(self) -> Option<&'static str> {
        match self {
            EntityKind::Employee => Some("employee_id"),
            EntityKind::Student => Some("student_id"),
            EntityKind::Payroll => Some("payroll_id"),
            EntityKind::Performance => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Employee => "employee",
            EntityKind::Student => "student",
            EntityKind::Payroll => "payroll",
            EntityKind::Performance => "performance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == key || k.table() == key)
    }

    /// Text the list surface searches against.
    pub fn display_name(self, record: &EntityRecord) -> String {
        match self {
            EntityKind::Student => {
                let full = format!(
                    "{} {}",
                    record.text("first_name").trim(),
                    record.text("last_name").trim()
                );
                full.trim().to_string()
            }
            EntityKind::Employee => record.text("name"),
            EntityKind::Payroll => {
                let line = format!(
                    "{} {}",
                    record.text("employee_id").trim(),
                    record.text("pay_period").trim()
                );
                line.trim().to_string()
            }
            EntityKind::Performance => record.text("student_id"),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Extra = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Employee {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub work_location: Option<String>,
    #[serde(default)]
    pub date_of_joining: Option<String>,
    #[serde(default)]
    pub date_of_leaving: Option<String>,
    #[serde(default)]
    pub center_id: Option<i64>,
    #[serde(default)]
    pub program_id: Option<i64>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub lor: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Student {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub fathers_name: Option<String>,
    #[serde(default)]
    pub mothers_name: Option<String>,
    #[serde(default)]
    pub primary_diagnosis: Option<String>,
    #[serde(default)]
    pub comorbidity: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub alt_contact_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub enrollment_year: Option<i64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub parents_email: Option<String>,
    #[serde(default)]
    pub student_email: Option<String>,
    #[serde(default)]
    pub center_id: Option<i64>,
    #[serde(default)]
    pub program_id: Option<i64>,
    #[serde(default)]
    pub educator_employee_id: Option<i64>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PayrollLine {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payroll_id: Option<i64>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub pay_period: Option<String>,
    #[serde(default)]
    pub salary: Option<f64>,
    #[serde(default)]
    pub bonus: Option<f64>,
    #[serde(default)]
    pub deductions: Option<f64>,
    #[serde(default)]
    pub paid_on: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub program_id: Option<i64>,
    #[serde(default)]
    pub educator_employee_id: Option<i64>,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub area_of_development: Option<String>,
    #[serde(default)]
    pub is_sent: Option<bool>,
    #[serde(default)]
    pub skill_area: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    /// Skill columns such as `1_score` / `1_description` land here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Strongly-typed record, keyed by entity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "camelCase")]
pub enum Entity {
    Employee(Employee),
    Student(Student),
    Payroll(PayrollLine),
    Performance(PerformanceRecord),
}

impl Entity {
    /// Values must already be coerced to their declared types.
    pub fn from_record(kind: EntityKind, record: &EntityRecord) -> RecordsResult<Self> {
        let value = record.to_json();
        let bad = |e: serde_json::Error| {
            RecordsError::BadInput(format!("{kind} record does not match its schema: {e}"))
        };
        Ok(match kind {
            EntityKind::Employee => Entity::Employee(serde_json::from_value(value).map_err(bad)?),
            EntityKind::Student => Entity::Student(serde_json::from_value(value).map_err(bad)?),
            EntityKind::Payroll => Entity::Payroll(serde_json::from_value(value).map_err(bad)?),
            EntityKind::Performance => {
                Entity::Performance(serde_json::from_value(value).map_err(bad)?)
            }
        })
    }

    pub fn row_id(&self) -> Option<&str> {
        match self {
            Entity::Employee(e) => e.id.as_deref(),
            Entity::Student(s) => s.id.as_deref(),
            Entity::Payroll(p) => p.id.as_deref(),
            Entity::Performance(p) => p.id.as_deref(),
        }
    }

    /// Flat record for persistence. Typed fields that are unset come back as `Null`;
    /// the row id is omitted so it is never written as a column value.
    pub fn to_record(&self) -> EntityRecord {
        let value = match self {
            Entity::Employee(e) => serde_json::to_value(e),
            Entity::Student(s) => serde_json::to_value(s),
            Entity::Payroll(p) => serde_json::to_value(p),
            Entity::Performance(p) => serde_json::to_value(p),
        };
        let mut record: EntityRecord = value
            .ok()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        record.remove(ROW_ID_FIELD);
        record
    }
}
