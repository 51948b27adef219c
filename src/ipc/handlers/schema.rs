use serde_json::json;

use crate::ipc::helpers::{get_entity, reply, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::record::EntityKind;
use crate::schema::Category;

fn schema_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let categories: Vec<_> = Category::ORDER
        .iter()
        .map(|c| json!({ "category": c, "title": c.title() }))
        .collect();
    Ok(json!({
        "entity": kind,
        "table": kind.table(),
        "idField": kind.id_field(),
        "categories": categories,
        "fields": state.registry.fields(kind),
        "required": state.registry.required_fields(kind),
    }))
}

fn schema_refresh(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    if state.backend.is_none() {
        return Err(HandlerErr::no_workspace());
    }
    let kinds: Vec<EntityKind> = match params.get("entity") {
        Some(_) => vec![get_entity(params)?],
        None => EntityKind::ALL.to_vec(),
    };
    let mut added = serde_json::Map::new();
    for kind in kinds {
        let names = state.refresh_registry(kind)?;
        added.insert(kind.as_str().to_string(), json!(names));
    }
    Ok(json!({ "added": added }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schema.get" => Some(reply(&req.id, schema_get(state, &req.params))),
        "schema.refresh" => Some(reply(&req.id, schema_refresh(state, &req.params))),
        _ => None,
    }
}
