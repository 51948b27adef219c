use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::backend::{Persistence, ADD_CUSTOM_COLUMN_FN};
use crate::error::{RecordsError, RecordsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    pub const ALL: [ColumnType; 6] = [
        ColumnType::Text,
        ColumnType::Integer,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::Timestamp,
        ColumnType::Decimal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ColumnType::Text => "Text",
            ColumnType::Integer => "Number (Integer)",
            ColumnType::Decimal => "Decimal Number",
            ColumnType::Boolean => "Yes/No (Boolean)",
            ColumnType::Date => "Date",
            ColumnType::Timestamp => "Date and Time",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        ColumnType::ALL.into_iter().find(|t| t.as_str() == raw)
    }
}

/// Adds a column to an entity table through the backend's schema function and
/// runs `on_success` once the backend accepts it. The registry is not touched
/// here; it is re-derived on the next refresh.
pub fn add_column<P, F>(
    backend: &mut P,
    table: &str,
    column: &str,
    column_type: ColumnType,
    on_success: F,
) -> RecordsResult<()>
where
    P: Persistence + ?Sized,
    F: FnOnce(),
{
    let column = column.trim();
    if column.is_empty() {
        return Err(RecordsError::field("columnName", "Column name is required"));
    }

    let args = json!({
        "p_table_name": table.to_lowercase(),
        "p_column_name": column,
        "p_column_type": column_type.as_str(),
    });
    match backend.rpc(ADD_CUSTOM_COLUMN_FN, &args) {
        Ok(_) => {
            info!(table, column, column_type = column_type.as_str(), "column added");
            on_success();
            Ok(())
        }
        Err(RecordsError::Schema(msg)) | Err(RecordsError::Persistence(msg)) => {
            warn!(table, column, error = %msg, "failed to add column");
            Err(RecordsError::Schema(msg))
        }
        Err(other) => Err(other),
    }
}
