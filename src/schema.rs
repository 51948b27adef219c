//! Field schema registry: per-entity field descriptors and category grouping.
//!
//! Descriptors are declared statically per entity. Columns added at runtime are
//! picked up by [`SchemaRegistry::refresh_from_columns`], which appends a plain
//! text descriptor in the `other` category for every column the backend reports
//! that the registry does not know yet.

use std::collections::HashMap;

use serde::Serialize;

use crate::record::{EntityKind, EntityRecord, ROW_ID_FIELD, ROW_INDEX_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Personal,
    Contact,
    Family,
    Program,
    Other,
}

impl Category {
    pub const ORDER: [Category; 5] = [
        Category::Personal,
        Category::Contact,
        Category::Family,
        Category::Program,
        Category::Other,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Category::Personal => "Personal Information",
            Category::Contact => "Contact Information",
            Category::Family => "Family Information",
            Category::Program => "Program Information",
            Category::Other => "Additional Information",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InputKind {
    Text,
    TextArea,
    Integer,
    Decimal,
    Boolean,
    Select,
    Date,
    File { bucket: String },
    /// Select over the loaded centers; stored as the numeric center id.
    Center,
    /// Select over the loaded programs; stored as the numeric program id.
    Program,
    /// Computed from another field; never edited directly.
    Derived,
}

impl InputKind {
    pub fn is_integer(&self) -> bool {
        matches!(self, InputKind::Integer | InputKind::Center | InputKind::Program)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub input: InputKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub required: bool,
    pub category: Category,
}

fn field(name: &str, label: &str, input: InputKind, required: bool, category: Category) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        label: label.to_string(),
        input,
        options: Vec::new(),
        required,
        category,
    }
}

fn select(name: &str, label: &str, options: &[&str], required: bool, category: Category) -> FieldDescriptor {
    FieldDescriptor {
        options: options.iter().map(|s| s.to_string()).collect(),
        ..field(name, label, InputKind::Select, required, category)
    }
}

fn file(name: &str, label: &str, bucket: &str, category: Category) -> FieldDescriptor {
    field(
        name,
        label,
        InputKind::File {
            bucket: bucket.to_string(),
        },
        false,
        category,
    )
}

const GENDERS: &[&str] = &["Male", "Female", "Other"];
const BLOOD_GROUPS: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const DESIGNATIONS: &[&str] = &["Administrator", "HR", "Educator"];

fn employee_fields() -> Vec<FieldDescriptor> {
    use Category::*;
    vec![
        field("employee_id", "Employee ID", InputKind::Integer, true, Personal),
        field("name", "Full Name", InputKind::Text, true, Personal),
        select("gender", "Gender", GENDERS, true, Personal),
        field("date_of_birth", "Date of Birth", InputKind::Date, true, Personal),
        select("blood_group", "Blood Group", BLOOD_GROUPS, false, Personal),
        field("email", "Email", InputKind::Text, true, Contact),
        field("phone", "Phone", InputKind::Text, true, Contact),
        field("emergency_contact_name", "Emergency Contact Name", InputKind::Text, false, Contact),
        field("emergency_contact", "Emergency Contact", InputKind::Text, false, Contact),
        select("designation", "Designation", DESIGNATIONS, true, Program),
        field("department", "Department", InputKind::Derived, false, Program),
        select(
            "employment_type",
            "Employment Type",
            &["Full-time", "Part-time", "Contract", "Temporary"],
            true,
            Program,
        ),
        select("status", "Status", &["Active", "Inactive", "On Leave"], false, Program),
        field("work_location", "Work Location", InputKind::Derived, false, Program),
        field("date_of_joining", "Date of Joining", InputKind::Date, true, Program),
        field("date_of_leaving", "Date of Leaving", InputKind::Date, false, Program),
        field("center_id", "Center", InputKind::Center, true, Program),
        field("program_id", "Program", InputKind::Program, false, Program),
        file("photo", "Profile Photo", "employee-photos", Other),
        file("lor", "LOR Document", "employee-lor", Other),
    ]
}

fn student_fields() -> Vec<FieldDescriptor> {
    use Category::*;
    vec![
        field("student_id", "Student ID", InputKind::Integer, true, Personal),
        field("first_name", "First Name", InputKind::Text, true, Personal),
        field("last_name", "Last Name", InputKind::Text, true, Personal),
        select("gender", "Gender", GENDERS, true, Personal),
        field("dob", "Date of Birth", InputKind::Date, true, Personal),
        select("blood_group", "Blood Group", BLOOD_GROUPS, false, Personal),
        field("primary_diagnosis", "Primary Diagnosis", InputKind::Text, false, Personal),
        field("comorbidity", "Comorbidity", InputKind::Text, false, Personal),
        field("udid", "UDID", InputKind::Text, false, Personal),
        field("allergies", "Allergies", InputKind::Text, false, Personal),
        field("contact_number", "Contact Number", InputKind::Text, true, Contact),
        field("alt_contact_number", "Alternate Contact Number", InputKind::Text, false, Contact),
        field("parents_email", "Parent's Email", InputKind::Text, false, Contact),
        field("student_email", "Student Email", InputKind::Text, false, Contact),
        field("address", "Address", InputKind::TextArea, false, Contact),
        field("fathers_name", "Father's Name", InputKind::Text, false, Family),
        field("mothers_name", "Mother's Name", InputKind::Text, false, Family),
        field("center_id", "Center", InputKind::Center, true, Program),
        field("program_id", "Program", InputKind::Program, true, Program),
        field("educator_employee_id", "Educator", InputKind::Integer, false, Program),
        field("enrollment_year", "Enrollment Year", InputKind::Integer, false, Program),
        select("status", "Status", &["Active", "Inactive", "Graduated"], false, Program),
        file("photo", "Photo", "student-photos", Other),
    ]
}

fn payroll_fields() -> Vec<FieldDescriptor> {
    use Category::*;
    vec![
        field("payroll_id", "Payroll ID", InputKind::Integer, true, Other),
        field("employee_id", "Employee ID", InputKind::Integer, true, Personal),
        field("pay_period", "Pay Period", InputKind::Text, true, Program),
        field("salary", "Salary", InputKind::Decimal, true, Program),
        field("bonus", "Bonus", InputKind::Decimal, false, Program),
        field("deductions", "Deductions", InputKind::Decimal, false, Program),
        field("paid_on", "Paid On", InputKind::Date, false, Program),
    ]
}

fn performance_fields() -> Vec<FieldDescriptor> {
    use Category::*;
    vec![
        field("student_id", "Student ID", InputKind::Integer, true, Personal),
        field("program_id", "Program", InputKind::Program, true, Program),
        field("educator_employee_id", "Educator", InputKind::Integer, true, Program),
        field("quarter", "Quarter", InputKind::Text, true, Program),
        field("area_of_development", "Area of Development", InputKind::Text, false, Program),
        field("skill_area", "Skill Area", InputKind::Text, false, Program),
        field("is_sent", "Sent", InputKind::Boolean, false, Other),
        field("comments", "Comments", InputKind::TextArea, false, Other),
    ]
}

/// Free-form labelled keys (public registration forms, voice entry) that are not
/// declared by any entity. Order here is also display order within the category.
const LABELLED_CATEGORIES: &[(Category, &[&str])] = &[
    (
        Category::Personal,
        &[
            "First Name",
            "Last Name",
            "Gender",
            "Date of Birth",
            "Blood Group",
            "Primary Diagnosis",
            "Comorbidity",
            "UDID",
            "Allergies",
        ],
    ),
    (
        Category::Contact,
        &["Contact Number", "Alternate Contact Number", "Parent's Email", "Address"],
    ),
    (Category::Family, &["Father's Name", "Mother's Name"]),
    (
        Category::Program,
        &["Program", "Enrollment Year", "Status", "Educator", "Center ID"],
    ),
];

/// Keys that never show up in a form.
pub const HIDDEN_FIELDS: &[&str] = &[ROW_ID_FIELD, ROW_INDEX_FIELD, "Timestamp", "submittedAt"];

/// Labelled keys whose wording differs from the declared label of the field they fill.
const KEY_ALIASES: &[(&str, &str)] = &[("Center ID", "center_id"), ("Program ID", "program_id")];

/// A free-form snapshot split into declared fields and the keys nothing matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedSnapshot {
    pub values: EntityRecord,
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: HashMap<EntityKind, Vec<FieldDescriptor>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let mut entities = HashMap::new();
        entities.insert(EntityKind::Employee, employee_fields());
        entities.insert(EntityKind::Student, student_fields());
        entities.insert(EntityKind::Payroll, payroll_fields());
        entities.insert(EntityKind::Performance, performance_fields());
        Self { entities }
    }

    pub fn fields(&self, kind: EntityKind) -> &[FieldDescriptor] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn descriptor(&self, kind: EntityKind, name: &str) -> Option<&FieldDescriptor> {
        self.fields(kind).iter().find(|d| d.name == name)
    }

    pub fn required_fields(&self, kind: EntityKind) -> Vec<&str> {
        self.fields(kind)
            .iter()
            .filter(|d| d.required)
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Every field lands in exactly one category; unmatched names fall into `Other`.
    pub fn category_of(&self, kind: EntityKind, name: &str) -> Category {
        if let Some(d) = self.descriptor(kind, name) {
            return d.category;
        }
        labelled_position(name)
            .map(|(category, _)| category)
            .unwrap_or(Category::Other)
    }

    /// Sort key inside a category: declared order first, then alphabetical.
    pub fn display_rank(&self, kind: EntityKind, name: &str) -> Option<usize> {
        if let Some(idx) = self.fields(kind).iter().position(|d| d.name == name) {
            return Some(idx);
        }
        labelled_position(name).map(|(_, idx)| idx)
    }

    /// Maps a free-form key onto a declared field by column name, label or alias,
    /// ignoring case.
    pub fn resolve_key(&self, kind: EntityKind, key: &str) -> Option<&FieldDescriptor> {
        let key = key.trim();
        let fields = self.fields(kind);
        fields
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(key) || d.label.eq_ignore_ascii_case(key))
            .or_else(|| {
                let (_, column) = KEY_ALIASES
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(key))?;
                fields.iter().find(|d| d.name == *column)
            })
    }

    /// Rewrites a labelled snapshot (voice entry, registration answers, another
    /// view) onto the entity's columns. Hidden and derived fields are dropped
    /// along with empty values; derived ones are recomputed by the form.
    pub fn map_snapshot(&self, kind: EntityKind, snapshot: &EntityRecord) -> MappedSnapshot {
        let mut out = MappedSnapshot::default();
        for (key, value) in snapshot.fields() {
            if HIDDEN_FIELDS.contains(&key.as_str()) {
                continue;
            }
            match self.resolve_key(kind, key) {
                Some(desc) if desc.input == InputKind::Derived => {}
                Some(desc) => {
                    if !value.is_empty() {
                        out.values.set(&desc.name, value.clone());
                    }
                }
                None => out.ignored.push(key.clone()),
            }
        }
        out
    }

    /// Appends descriptors for backend-reported columns the registry does not know.
    /// Returns the names that were added.
    pub fn refresh_from_columns(&mut self, kind: EntityKind, columns: &[ColumnInfo]) -> Vec<String> {
        let fields = self.entities.entry(kind).or_default();
        let mut added = Vec::new();
        for col in columns {
            if HIDDEN_FIELDS.contains(&col.name.as_str()) {
                continue;
            }
            if fields.iter().any(|d| d.name == col.name) {
                continue;
            }
            let input = match col.sql_type.to_ascii_uppercase().as_str() {
                "INTEGER" => InputKind::Integer,
                "REAL" | "NUMERIC" => InputKind::Decimal,
                "BOOLEAN" => InputKind::Boolean,
                "DATE" => InputKind::Date,
                _ => InputKind::Text,
            };
            fields.push(FieldDescriptor {
                name: col.name.clone(),
                label: format_field_label(&col.name),
                input,
                options: Vec::new(),
                required: false,
                category: Category::Other,
            });
            added.push(col.name.clone());
        }
        added
    }
}

fn labelled_position(name: &str) -> Option<(Category, usize)> {
    LABELLED_CATEGORIES.iter().find_map(|(category, names)| {
        names
            .iter()
            .position(|n| *n == name)
            .map(|idx| (*category, idx))
    })
}

/// A column as reported by the persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
}

/// Keeps already human-formatted labels (leading uppercase or an apostrophe);
/// otherwise splits snake_case / camelCase into title-cased words.
pub fn format_field_label(field: &str) -> String {
    if field.starts_with(|c: char| c.is_uppercase()) || field.contains('\'') {
        return field.to_string();
    }
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in field.chars() {
        if ch == '_' || ch == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
