//! Categorized form layout: which widget each present field gets, grouped into
//! the fixed category sections.

use serde::Serialize;

use crate::error::FieldErrors;
use crate::form::{date_picker_to_year, Center, Program, DATE_PICKER_FROM_YEAR};
use crate::record::{EntityKind, EntityRecord, FieldValue};
use crate::schema::{format_field_label, Category, InputKind, SchemaRegistry, HIDDEN_FIELDS};

/// Values longer than this get a multi-line input.
pub const TEXTAREA_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    View,
    Edit,
}

impl Mode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "view" => Some(Mode::View),
            "edit" => Some(Mode::Edit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "camelCase")]
pub enum Widget {
    ReadOnly,
    TextInput,
    TextArea,
    NumberInput,
    Select { options: Vec<Choice> },
    DatePicker { from_year: i32, to_year: i32 },
    FileUpload { bucket: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedField {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub widget: Widget,
    pub value: FieldValue,
    pub display: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub category: Category,
    pub title: &'static str,
    pub fields: Vec<RenderedField>,
}

/// Everything a renderer needs besides the values themselves.
pub struct RenderContext<'a> {
    pub registry: &'a SchemaRegistry,
    pub kind: EntityKind,
    pub mode: Mode,
    pub errors: &'a FieldErrors,
    pub centers: &'a [Center],
    pub programs: &'a [Program],
}

pub fn render_sections(ctx: &RenderContext<'_>, values: &EntityRecord) -> Vec<Section> {
    let mut buckets: Vec<(Category, Vec<&String>)> =
        Category::ORDER.iter().map(|c| (*c, Vec::new())).collect();

    for (name, _) in values.fields() {
        if HIDDEN_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let category = ctx.registry.category_of(ctx.kind, name);
        if let Some((_, names)) = buckets.iter_mut().find(|(c, _)| *c == category) {
            names.push(name);
        }
    }

    buckets
        .into_iter()
        .filter(|(category, names)| *category != Category::Other || !names.is_empty())
        .map(|(category, mut names)| {
            names.sort_by(|a, b| {
                let ra = ctx.registry.display_rank(ctx.kind, a);
                let rb = ctx.registry.display_rank(ctx.kind, b);
                match (ra, rb) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => a.cmp(b),
                }
            });
            let fields = names
                .into_iter()
                .filter_map(|name| values.get(name).map(|v| render_field(ctx, name, v)))
                .collect();
            Section {
                category,
                title: category.title(),
                fields,
            }
        })
        .collect()
}

fn render_field(ctx: &RenderContext<'_>, name: &str, value: &FieldValue) -> RenderedField {
    let desc = ctx.registry.descriptor(ctx.kind, name);
    let label = desc
        .map(|d| d.label.clone())
        .unwrap_or_else(|| format_field_label(name));
    let display = display_value(ctx, desc.map(|d| &d.input), value);

    let widget = match ctx.mode {
        Mode::View => Widget::ReadOnly,
        Mode::Edit => edit_widget(ctx, name, desc.map(|d| (&d.input, d.options.as_slice())), value),
    };

    RenderedField {
        name: name.to_string(),
        label,
        widget,
        value: value.clone(),
        display,
        required: desc.map(|d| d.required).unwrap_or(false),
        error: ctx.errors.get(name).cloned(),
    }
}

fn edit_widget(
    ctx: &RenderContext<'_>,
    name: &str,
    desc: Option<(&InputKind, &[String])>,
    value: &FieldValue,
) -> Widget {
    match desc {
        Some((InputKind::Derived, _)) => Widget::ReadOnly,
        Some((InputKind::Select, options)) if !options.is_empty() => Widget::Select {
            options: options
                .iter()
                .map(|o| Choice {
                    value: o.clone(),
                    label: o.clone(),
                })
                .collect(),
        },
        Some((InputKind::Boolean, _)) => Widget::Select {
            options: vec![
                Choice { value: "true".into(), label: "Yes".into() },
                Choice { value: "false".into(), label: "No".into() },
            ],
        },
        Some((InputKind::Center, _)) => Widget::Select {
            options: ctx
                .centers
                .iter()
                .map(|c| Choice {
                    value: c.center_id.to_string(),
                    label: c.name.clone(),
                })
                .collect(),
        },
        Some((InputKind::Program, _)) => {
            let mut options = vec![Choice { value: "0".into(), label: "None".into() }];
            options.extend(ctx.programs.iter().map(|p| Choice {
                value: p.program_id.to_string(),
                label: p.name.clone(),
            }));
            Widget::Select { options }
        }
        Some((InputKind::Date, _)) => Widget::DatePicker {
            from_year: DATE_PICKER_FROM_YEAR,
            to_year: date_picker_to_year(),
        },
        Some((InputKind::File { bucket }, _)) => Widget::FileUpload {
            bucket: bucket.clone(),
        },
        Some((InputKind::Integer | InputKind::Decimal, _)) => Widget::NumberInput,
        Some((InputKind::TextArea, _)) => Widget::TextArea,
        _ if wants_textarea(name, value) => Widget::TextArea,
        _ => Widget::TextInput,
    }
}

/// Long free text: anything address-like, or values past the threshold.
pub fn wants_textarea(name: &str, value: &FieldValue) -> bool {
    name.to_lowercase().contains("address") || value.char_len() > TEXTAREA_THRESHOLD
}

fn display_value(ctx: &RenderContext<'_>, input: Option<&InputKind>, value: &FieldValue) -> String {
    if value.is_empty() {
        return "-".to_string();
    }
    let named = match input {
        Some(InputKind::Center) => value
            .as_i64()
            .and_then(|id| ctx.centers.iter().find(|c| c.center_id == id))
            .map(|c| c.name.clone()),
        Some(InputKind::Program) => value
            .as_i64()
            .and_then(|id| ctx.programs.iter().find(|p| p.program_id == id))
            .map(|p| p.name.clone()),
        Some(InputKind::Boolean) => value
            .as_bool()
            .map(|b| if b { "Yes" } else { "No" }.to_string()),
        _ => None,
    };
    named.unwrap_or_else(|| value.display())
}
