use serde_json::json;

use crate::error::RecordsError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Structured details for errors that carry more than a message.
pub fn error_details(e: &RecordsError) -> Option<serde_json::Value> {
    match e {
        RecordsError::Validation(fields) => Some(json!({ "fields": fields })),
        RecordsError::InvalidTransition { state, event } => {
            Some(json!({ "state": state, "event": event }))
        }
        _ => None,
    }
}
