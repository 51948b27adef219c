use serde_json::json;

use crate::actions::{ActionEvent, ActionState, PrefillOrigin, PrefillRequest};
use crate::ipc::handlers::forms::{open_session, Seed};
use crate::ipc::handlers::listing::{get_list, settle, view_json};
use crate::ipc::helpers::{get_opt_str, get_record, get_required_str, reply, require_backend, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn parse_event(params: &serde_json::Value) -> Result<ActionEvent, HandlerErr> {
    let raw = get_required_str(params, "event")?;
    if raw == "voiceEntryComplete" {
        return Ok(ActionEvent::VoiceEntryComplete(get_record(params, "data")?));
    }
    ActionEvent::parse(&raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown event: {}", raw)))
}

fn actions_state(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (list_id, view) = get_list(state, params)?;
    view.actions.pump();
    Ok(json!({ "listId": list_id, "actions": view.actions.state() }))
}

fn actions_dispatch(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let event = parse_event(params)?;
    let list_id = get_required_str(params, "listId")?;
    let backend = require_backend(&mut state.backend)?;
    let view = state
        .lists
        .get_mut(&list_id)
        .ok_or_else(|| HandlerErr::not_found(format!("list {} not found", list_id)))?;

    let transition = view.actions.dispatch(event)?;
    let refresh = transition.refresh;
    settle(view, &*backend, Some(transition))?;
    Ok(json!({
        "refresh": refresh,
        "actions": view.actions.state(),
        "list": view_json(&list_id, view),
    }))
}

fn actions_prefill(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = get_record(params, "snapshot")?;
    let source = get_opt_str(params, "view").unwrap_or_else(|| "external".to_string());
    let (list_id, view) = get_list(state, params)?;
    view.actions
        .prefill_sender()
        .send(PrefillRequest {
            snapshot,
            origin: PrefillOrigin::View { view: source },
        })
        .map_err(|e| HandlerErr {
            code: "internal",
            message: e.to_string(),
            details: None,
        })?;
    let delivered = view.actions.pump().is_some();
    Ok(json!({
        "listId": list_id,
        "delivered": delivered,
        "actions": view.actions.state(),
    }))
}

/// Turns an open-form state on the bar into an actual form session.
fn actions_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (list_id, view) = get_list(state, params)?;
    let kind = view.surface.kind();
    let seed = match view.actions.state() {
        ActionState::FormOpen {
            prefill: Some(snapshot),
            ..
        } => Seed::Prefill(snapshot.clone()),
        ActionState::FormOpen { prefill: None, .. } => Seed::Blank,
        other => {
            return Err(HandlerErr {
                code: "invalid_transition",
                message: "no form is open on this list".to_string(),
                details: Some(json!({ "actions": other })),
            })
        }
    };
    if state
        .forms
        .values()
        .any(|s| s.list_id.as_deref() == Some(list_id.as_str()))
    {
        return Err(HandlerErr::bad_params("a form is already open for this list"));
    }
    open_session(state, kind, seed, Some(list_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "actions.state" => Some(reply(&req.id, actions_state(state, &req.params))),
        "actions.dispatch" => Some(reply(&req.id, actions_dispatch(state, &req.params))),
        "actions.prefill" => Some(reply(&req.id, actions_prefill(state, &req.params))),
        "actions.open" => Some(reply(&req.id, actions_open(state, &req.params))),
        _ => None,
    }
}
