use serde_json::json;

use crate::columns::{add_column, ColumnType};
use crate::ipc::helpers::{get_entity, get_opt_str, reply, require_backend, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn column_types() -> serde_json::Value {
    json!(ColumnType::ALL
        .iter()
        .map(|t| json!({ "value": t.as_str(), "label": t.label() }))
        .collect::<Vec<_>>())
}

fn columns_add(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let column_name = get_opt_str(params, "columnName").unwrap_or_default();
    let column_type = match get_opt_str(params, "columnType") {
        Some(raw) => ColumnType::parse(&raw).ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("unknown column type: {}", raw),
            details: Some(json!({ "types": column_types() })),
        })?,
        None => ColumnType::default(),
    };

    let backend = require_backend(&mut state.backend)?;
    let mut accepted = false;
    add_column(backend, kind.table(), &column_name, column_type, || accepted = true)?;

    let added = if accepted {
        state.refresh_registry(kind)?
    } else {
        Vec::new()
    };
    Ok(json!({
        "success": accepted,
        "entity": kind,
        "column": column_name.trim(),
        "type": column_type.as_str(),
        "added": added,
        "fields": state.registry.fields(kind),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "columns.types" => Some(crate::ipc::error::ok(&req.id, json!({ "types": column_types() }))),
        "columns.add" => Some(reply(&req.id, columns_add(state, &req.params))),
        _ => None,
    }
}
