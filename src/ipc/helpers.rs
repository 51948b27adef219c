use serde_json::json;

use crate::backend::{Filter, Persistence, SqliteBackend};
use crate::error::RecordsError;
use crate::form::{Center, Program};
use crate::ipc::error::{err, error_details, ok};
use crate::record::{EntityKind, EntityRecord};

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn no_workspace() -> Self {
        HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        }
    }
}

impl From<RecordsError> for HandlerErr {
    fn from(e: RecordsError) -> Self {
        HandlerErr {
            code: e.code(),
            details: error_details(&e),
            message: e.to_string(),
        }
    }
}

pub fn reply(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(id, value),
        Err(error) => error.response(id),
    }
}

pub fn require_backend(backend: &mut Option<SqliteBackend>) -> Result<&mut SqliteBackend, HandlerErr> {
    backend.as_mut().ok_or_else(HandlerErr::no_workspace)
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

pub fn get_opt_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

/// `params.entity`, by entity name or table name.
pub fn get_entity(params: &serde_json::Value) -> Result<EntityKind, HandlerErr> {
    let raw = get_required_str(params, "entity")?;
    EntityKind::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("unknown entity: {}", raw),
        details: Some(json!({
            "known": EntityKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>()
        })),
    })
}

pub fn get_record(params: &serde_json::Value, key: &str) -> Result<EntityRecord, HandlerErr> {
    let v = params
        .get(key)
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    Ok(EntityRecord::from_json(v)?)
}

/// CSV text either inline (`text`) or read from `path`.
pub fn get_text_or_path(params: &serde_json::Value) -> Result<String, HandlerErr> {
    if let Some(text) = get_opt_str(params, "text") {
        return Ok(text);
    }
    let path = get_required_str(params, "path")
        .map_err(|_| HandlerErr::bad_params("missing text or path"))?;
    std::fs::read_to_string(&path).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": path })),
    })
}

pub fn load_centers<P: Persistence + ?Sized>(backend: &P) -> Result<Vec<Center>, HandlerErr> {
    let rows = backend.select("centers", &Filter::all().order_by("center_id"))?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some(Center {
                center_id: r.int("center_id")?,
                name: r.text("name"),
            })
        })
        .collect())
}

pub fn load_programs<P: Persistence + ?Sized>(backend: &P) -> Result<Vec<Program>, HandlerErr> {
    let rows = backend.select("programs", &Filter::all().order_by("program_id"))?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some(Program {
                program_id: r.int("program_id")?,
                name: r.text("name"),
            })
        })
        .collect())
}
