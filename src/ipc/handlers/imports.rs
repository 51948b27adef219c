use serde_json::json;

use crate::actions::{ActionEvent, ActionState};
use crate::imports::{apply_csv, preview_csv};
use crate::ipc::handlers::listing::{refetch, settle};
use crate::ipc::helpers::{
    get_entity, get_opt_str, get_text_or_path, load_centers, reply, require_backend, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn csv_preview(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let text = get_text_or_path(params)?;
    let backend = require_backend(&mut state.backend)?;
    let centers = load_centers(&*backend)?;
    let preview = preview_csv(&state.registry, kind, &centers, &text)?;
    Ok(json!({ "entity": kind, "preview": preview }))
}

fn csv_apply(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let text = get_text_or_path(params)?;
    let backend = require_backend(&mut state.backend)?;
    let centers = load_centers(&*backend)?;
    let outcome = apply_csv(backend, &state.registry, kind, &centers, &text)?;

    let mut actions = serde_json::Value::Null;
    if let Some(list_id) = get_opt_str(params, "listId") {
        let view = state
            .lists
            .get_mut(&list_id)
            .ok_or_else(|| HandlerErr::not_found(format!("list {} not found", list_id)))?;
        if *view.actions.state() == ActionState::CsvImportOpen {
            let t = view.actions.dispatch(ActionEvent::CsvImportComplete)?;
            settle(view, &*backend, Some(t))?;
        } else if view.surface.kind() == kind {
            refetch(view, &*backend)?;
        }
        actions = json!(view.actions.state());
    }
    Ok(json!({ "entity": kind, "outcome": outcome, "actions": actions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.csvPreview" => Some(reply(&req.id, csv_preview(state, &req.params))),
        "import.csvApply" => Some(reply(&req.id, csv_apply(state, &req.params))),
        _ => None,
    }
}
