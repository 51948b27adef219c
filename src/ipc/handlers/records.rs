use serde_json::json;

use crate::backend::{Filter, Persistence};
use crate::ipc::helpers::{
    get_entity, get_required_i64, get_required_str, load_centers, load_programs, reply,
    require_backend, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::record::{EntityRecord, FieldValue, ROW_ID_FIELD};

/// Optional `params.where`: an object of column -> scalar equality filters.
fn parse_filter(params: &serde_json::Value) -> Result<Filter, HandlerErr> {
    let mut filter = Filter::all();
    if let Some(w) = params.get("where") {
        let rec = EntityRecord::from_json(w.clone())?;
        for (column, value) in rec.fields() {
            filter = filter.eq(column, value.clone());
        }
    }
    if let Some(order) = params.get("orderBy").and_then(|v| v.as_str()) {
        filter = filter.order_by(order);
    }
    Ok(filter)
}

fn records_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let filter = parse_filter(params)?;
    let backend = require_backend(&mut state.backend)?;
    let rows = backend.select(kind.table(), &filter)?;
    Ok(json!({ "entity": kind, "rows": rows, "total": rows.len() }))
}

fn records_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let row_id = get_required_str(params, "id")?;
    let backend = require_backend(&mut state.backend)?;
    let rows = backend.select(
        kind.table(),
        &Filter::all().eq(ROW_ID_FIELD, FieldValue::text(row_id.clone())),
    )?;
    let record = rows
        .into_iter()
        .next()
        .ok_or_else(|| HandlerErr::not_found(format!("{} {} not found", kind, row_id)))?;
    Ok(json!({
        "entity": kind,
        "displayName": kind.display_name(&record),
        "record": record,
    }))
}

fn records_count(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let backend = require_backend(&mut state.backend)?;
    Ok(json!({ "entity": kind, "count": backend.count(kind.table())? }))
}

fn centers_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let backend = require_backend(&mut state.backend)?;
    Ok(json!({ "centers": load_centers(&*backend)? }))
}

fn programs_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let backend = require_backend(&mut state.backend)?;
    Ok(json!({ "programs": load_programs(&*backend)? }))
}

fn lookup_create(
    state: &mut AppState,
    params: &serde_json::Value,
    table: &str,
    id_field: &str,
    id_param: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, id_param)?;
    let name = get_required_str(params, "name")?;
    if name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let mut rec = EntityRecord::new();
    rec.set(id_field, FieldValue::Int(id));
    rec.set("name", FieldValue::text(name.trim()));
    let backend = require_backend(&mut state.backend)?;
    let stored = backend.insert(table, &rec)?;
    Ok(json!({ "record": stored }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.list" => Some(reply(&req.id, records_list(state, &req.params))),
        "records.get" => Some(reply(&req.id, records_get(state, &req.params))),
        "records.count" => Some(reply(&req.id, records_count(state, &req.params))),
        "centers.list" => Some(reply(&req.id, centers_list(state))),
        "programs.list" => Some(reply(&req.id, programs_list(state))),
        "centers.create" => Some(reply(
            &req.id,
            lookup_create(state, &req.params, "centers", "center_id", "centerId"),
        )),
        "programs.create" => Some(reply(
            &req.id,
            lookup_create(state, &req.params, "programs", "program_id", "programId"),
        )),
        _ => None,
    }
}
