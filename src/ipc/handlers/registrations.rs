use serde_json::json;

use crate::ipc::helpers::{get_opt_str, get_record, get_required_str, reply, require_backend, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::record::EntityKind;
use crate::registrations::{self, RegistrationStatus};

fn registrations_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let status = match get_opt_str(params, "status") {
        Some(raw) => Some(RegistrationStatus::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("status must be one of: pending, accepted, rejected")
        })?),
        None => None,
    };
    let backend = require_backend(&mut state.backend)?;
    let rows = registrations::list(&*backend, status)?;
    Ok(json!({ "registrations": rows }))
}

fn registrations_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let fields = get_record(params, "fields")?;
    let backend = require_backend(&mut state.backend)?;
    let registration = registrations::submit(backend, &fields)?;
    Ok(json!({ "registration": registration }))
}

/// Accepts a registration and hands the student snapshot to a student list's
/// action bar. The list is checked first so nothing is decided without a target.
fn registrations_accept(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let registration_id = get_required_str(params, "registrationId")?;
    let list_id = get_required_str(params, "listId")?;
    let sender = {
        let view = state
            .lists
            .get(&list_id)
            .ok_or_else(|| HandlerErr::not_found(format!("list {} not found", list_id)))?;
        if view.surface.kind() != EntityKind::Student {
            return Err(HandlerErr::bad_params("registrations can only be accepted into a student list"));
        }
        view.actions.prefill_sender()
    };

    let backend = require_backend(&mut state.backend)?;
    let (registration, request) = registrations::accept(backend, &state.registry, &registration_id)?;
    sender.send(request).map_err(|e| HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    })?;

    let mut delivered = false;
    let mut actions = serde_json::Value::Null;
    if let Some(view) = state.lists.get_mut(&list_id) {
        delivered = view.actions.pump().is_some();
        actions = json!(view.actions.state());
    }
    Ok(json!({
        "registration": registration,
        "listId": list_id,
        "delivered": delivered,
        "actions": actions,
    }))
}

fn registrations_reject(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let registration_id = get_required_str(params, "registrationId")?;
    let backend = require_backend(&mut state.backend)?;
    let registration = registrations::reject(backend, &registration_id)?;
    Ok(json!({ "registration": registration }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "registrations.list" => Some(reply(&req.id, registrations_list(state, &req.params))),
        "registrations.submit" => Some(reply(&req.id, registrations_submit(state, &req.params))),
        "registrations.accept" => Some(reply(&req.id, registrations_accept(state, &req.params))),
        "registrations.reject" => Some(reply(&req.id, registrations_reject(state, &req.params))),
        _ => None,
    }
}
