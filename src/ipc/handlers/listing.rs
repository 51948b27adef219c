use serde_json::json;
use uuid::Uuid;

use crate::actions::{ActionBar, Transition};
use crate::backend::{Filter, Persistence};
use crate::error::RecordsResult;
use crate::ipc::helpers::{get_entity, get_required_str, reply, require_backend, HandlerErr};
use crate::ipc::types::{AppState, ListView, Request};
use crate::listing::{FilterCriteria, ListSurface};

pub(crate) fn view_json(list_id: &str, view: &ListView) -> serde_json::Value {
    let rows = view.surface.filtered();
    json!({
        "listId": list_id,
        "entity": view.surface.kind(),
        "total": view.surface.total(),
        "matched": rows.len(),
        "criteria": view.surface.criteria(),
        "rows": rows,
        "actions": view.actions.state(),
    })
}

pub(crate) fn refetch<P: Persistence + ?Sized>(view: &mut ListView, backend: &P) -> RecordsResult<()> {
    let rows = backend.select(view.surface.kind().table(), &Filter::all())?;
    view.surface.replace_rows(rows);
    Ok(())
}

/// Applies the refresh a transition asked for, then lets a queued prefill in if
/// the bar went idle. Returns the last transition that happened.
pub(crate) fn settle<P: Persistence + ?Sized>(
    view: &mut ListView,
    backend: &P,
    transition: Option<Transition>,
) -> RecordsResult<Option<Transition>> {
    if transition.as_ref().map(|t| t.refresh).unwrap_or(false) {
        refetch(view, backend)?;
    }
    Ok(view.actions.pump().or(transition))
}

pub(crate) fn get_list<'a>(
    state: &'a mut AppState,
    params: &serde_json::Value,
) -> Result<(String, &'a mut ListView), HandlerErr> {
    let list_id = get_required_str(params, "listId")?;
    let view = state
        .lists
        .get_mut(&list_id)
        .ok_or_else(|| HandlerErr::not_found(format!("list {} not found", list_id)))?;
    Ok((list_id, view))
}

fn criteria_from(params: &serde_json::Value) -> Result<FilterCriteria, HandlerErr> {
    serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid filter criteria: {}", e)))
}

fn list_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let criteria = criteria_from(params)?;
    let backend = require_backend(&mut state.backend)?;
    let rows = backend.select(kind.table(), &Filter::all())?;

    let mut surface = ListSurface::new(kind, rows);
    surface.set_criteria(criteria);
    let view = ListView {
        surface,
        actions: ActionBar::new(),
    };
    let list_id = Uuid::new_v4().to_string();
    let out = view_json(&list_id, &view);
    state.lists.insert(list_id, view);
    Ok(out)
}

fn list_filter(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let criteria = criteria_from(params)?;
    let (list_id, view) = get_list(state, params)?;
    view.surface.set_criteria(criteria);
    Ok(view_json(&list_id, view))
}

fn list_refresh(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let list_id = get_required_str(params, "listId")?;
    let backend = require_backend(&mut state.backend)?;
    let view = state
        .lists
        .get_mut(&list_id)
        .ok_or_else(|| HandlerErr::not_found(format!("list {} not found", list_id)))?;
    refetch(view, &*backend)?;
    Ok(view_json(&list_id, view))
}

fn list_close(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let list_id = get_required_str(params, "listId")?;
    let closed = state.lists.remove(&list_id).is_some();
    // Forms opened from this list outlive it but no longer report back.
    for session in state.forms.values_mut() {
        if session.list_id.as_deref() == Some(list_id.as_str()) {
            session.list_id = None;
        }
    }
    Ok(json!({ "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "list.open" => Some(reply(&req.id, list_open(state, &req.params))),
        "list.filter" => Some(reply(&req.id, list_filter(state, &req.params))),
        "list.refresh" => Some(reply(&req.id, list_refresh(state, &req.params))),
        "list.close" => Some(reply(&req.id, list_close(state, &req.params))),
        _ => None,
    }
}
