use std::collections::BTreeMap;

use thiserror::Error;

/// Field name -> message, as produced by form validation.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum RecordsError {
    /// Local, recoverable: the user corrects input. No persistence call was made.
    #[error("please fix the errors in the form")]
    Validation(FieldErrors),
    /// Remote rejection or backend failure. Form state is preserved.
    #[error("{0}")]
    Persistence(String),
    /// Column-add rejected; message is the backend's, verbatim.
    #[error("{0}")]
    Schema(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("a save is already in progress")]
    Busy,
    #[error("cannot {event} while {state}")]
    InvalidTransition { state: String, event: String },
    #[error("{0}")]
    BadInput(String),
}

impl RecordsError {
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), message.into());
        RecordsError::Validation(errors)
    }

    /// Stable code used on the IPC wire.
    pub fn code(&self) -> &'static str {
        match self {
            RecordsError::Validation(_) => "validation_failed",
            RecordsError::Persistence(_) => "persistence_failed",
            RecordsError::Schema(_) => "schema_rejected",
            RecordsError::NotFound(_) => "not_found",
            RecordsError::Busy => "busy",
            RecordsError::InvalidTransition { .. } => "invalid_transition",
            RecordsError::BadInput(_) => "bad_params",
        }
    }
}

impl From<rusqlite::Error> for RecordsError {
    fn from(e: rusqlite::Error) -> Self {
        RecordsError::Persistence(e.to_string())
    }
}

pub type RecordsResult<T> = Result<T, RecordsError>;
