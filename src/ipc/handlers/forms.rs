use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::ActionEvent;
use crate::backend::{Filter, Persistence};
use crate::error::RecordsError;
use crate::form::FormController;
use crate::ipc::handlers::listing::settle;
use crate::ipc::helpers::{
    get_entity, get_opt_str, get_record, get_required_str, load_centers, load_programs, reply,
    require_backend, HandlerErr,
};
use crate::ipc::types::{AppState, FormSession, Request};
use crate::record::{EntityKind, EntityRecord, FieldValue, ROW_ID_FIELD};
use crate::render::{render_sections, Mode, RenderContext};
use crate::schema::{InputKind, SchemaRegistry, HIDDEN_FIELDS};

pub(crate) enum Seed {
    Blank,
    Existing(String),
    Prefill(EntityRecord),
}

pub(crate) fn form_json(
    registry: &SchemaRegistry,
    form_id: &str,
    session: &FormSession,
    mode: Mode,
) -> serde_json::Value {
    let form = &session.controller;
    let ctx = RenderContext {
        registry,
        kind: form.kind(),
        mode,
        errors: form.errors(),
        centers: form.centers(),
        programs: &session.programs,
    };
    json!({
        "formId": form_id,
        "entity": form.kind(),
        "rowId": form.row_id(),
        "mode": mode,
        "saving": form.is_saving(),
        "values": form.values(),
        "errors": form.errors(),
        "sections": render_sections(&ctx, form.values()),
    })
}

/// Opens a form session; `list_id` ties it to the action bar that asked for it.
pub(crate) fn open_session(
    state: &mut AppState,
    kind: EntityKind,
    seed: Seed,
    list_id: Option<String>,
) -> Result<serde_json::Value, HandlerErr> {
    let backend = require_backend(&mut state.backend)?;
    let centers = load_centers(&*backend)?;
    let programs = load_programs(&*backend)?;

    let mut ignored = None;
    let mut controller = match seed {
        Seed::Blank => FormController::blank(kind, &state.registry),
        Seed::Existing(row_id) => {
            let rows = backend.select(
                kind.table(),
                &Filter::all().eq(ROW_ID_FIELD, FieldValue::text(row_id.clone())),
            )?;
            let record = rows
                .into_iter()
                .next()
                .ok_or_else(|| HandlerErr::not_found(format!("{} {} not found", kind, row_id)))?;
            FormController::initialize(kind, record)
        }
        Seed::Prefill(snapshot) => {
            let mapped = state.registry.map_snapshot(kind, &snapshot);
            let mut form = FormController::blank(kind, &state.registry);
            for (name, value) in mapped.values.fields() {
                let value = match name.as_str() {
                    "center_id" => {
                        id_by_name(value, centers.iter().map(|c| (c.center_id, c.name.as_str())))
                    }
                    "program_id" => {
                        id_by_name(value, programs.iter().map(|p| (p.program_id, p.name.as_str())))
                    }
                    _ => value.clone(),
                };
                form.set_field(name, value);
            }
            if !mapped.ignored.is_empty() {
                debug!(entity = %kind, ignored = ?mapped.ignored, "prefill keys matched no field");
            }
            ignored = Some(mapped.ignored);
            form
        }
    };
    controller.set_centers(centers);

    let form_id = Uuid::new_v4().to_string();
    let session = FormSession {
        controller,
        programs,
        list_id,
    };
    let mut out = form_json(&state.registry, &form_id, &session, Mode::Edit);
    if let Some(ignored) = ignored {
        out["ignoredKeys"] = json!(ignored);
    }
    state.forms.insert(form_id, session);
    Ok(out)
}

/// Prefills may name a center or program instead of giving its id.
fn id_by_name<'a>(value: &FieldValue, mut named: impl Iterator<Item = (i64, &'a str)>) -> FieldValue {
    if value.as_i64().is_some() {
        return value.clone();
    }
    let wanted = value.display();
    named
        .find(|(_, name)| name.eq_ignore_ascii_case(wanted.trim()))
        .map(|(id, _)| FieldValue::Int(id))
        .unwrap_or_else(|| value.clone())
}

fn form_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_entity(params)?;
    let seed = if let Some(row_id) = get_opt_str(params, "id") {
        Seed::Existing(row_id)
    } else if params.get("prefill").is_some() {
        Seed::Prefill(get_record(params, "prefill")?)
    } else {
        Seed::Blank
    };
    open_session(state, kind, seed, None)
}

fn form_set_field(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let form_id = get_required_str(params, "formId")?;
    let field = get_required_str(params, "field")?;
    let value: FieldValue = match params.get("value") {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("value must be a scalar: {}", e)))?,
        None => FieldValue::Null,
    };

    let session = state
        .forms
        .get_mut(&form_id)
        .ok_or_else(|| HandlerErr::not_found(format!("form {} not found", form_id)))?;
    if HIDDEN_FIELDS.contains(&field.as_str()) {
        return Err(HandlerErr::bad_params(format!("{} is not editable", field)));
    }
    let kind = session.controller.kind();
    let desc = state
        .registry
        .resolve_key(kind, &field)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} has no field {}", kind, field)))?;
    if desc.input == InputKind::Derived {
        return Err(HandlerErr::bad_params(format!(
            "{} is derived and cannot be set directly",
            desc.label
        )));
    }
    session.controller.set_field(&desc.name, value);
    Ok(json!({
        "formId": form_id,
        "values": session.controller.values(),
        "errors": session.controller.errors(),
    }))
}

fn form_validate(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let form_id = get_required_str(params, "formId")?;
    let session = state
        .forms
        .get_mut(&form_id)
        .ok_or_else(|| HandlerErr::not_found(format!("form {} not found", form_id)))?;
    let valid = session.controller.check(&state.registry);
    Ok(json!({ "formId": form_id, "valid": valid, "errors": session.controller.errors() }))
}

fn form_render(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let form_id = get_required_str(params, "formId")?;
    let mode = match get_opt_str(params, "mode") {
        Some(raw) => Mode::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("mode must be one of: view, edit"))?,
        None => Mode::Edit,
    };
    let session = state
        .forms
        .get(&form_id)
        .ok_or_else(|| HandlerErr::not_found(format!("form {} not found", form_id)))?;
    Ok(form_json(&state.registry, &form_id, session, mode))
}

fn form_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let form_id = get_required_str(params, "formId")?;
    let backend = require_backend(&mut state.backend)?;
    let session = state
        .forms
        .get_mut(&form_id)
        .ok_or_else(|| HandlerErr::not_found(format!("form {} not found", form_id)))?;

    let kind = session.controller.kind();
    let outcome = session.controller.submit(&state.registry, |entity| {
        let record = entity.to_record();
        match entity.row_id() {
            Some(row_id) => backend.update(kind.table(), row_id, &record),
            None => backend.insert(kind.table(), &record),
        }
    });
    let saved = match outcome {
        Ok(saved) => saved,
        Err(e @ RecordsError::Validation(_)) => return Err(e.into()),
        Err(e) => {
            warn!(form = %form_id, entity = %kind, error = %e, "save rejected");
            return Err(e.into());
        }
    };
    info!(form = %form_id, entity = %kind, row = ?saved.row_id(), "record saved");

    // The form closes on success; its list, if any, hears about the save.
    let list_id = session.list_id.clone();
    state.forms.remove(&form_id);
    // The record is saved by now; a failed list refetch is reported next to it.
    let mut actions = serde_json::Value::Null;
    let mut refresh_error = None;
    if let Some(view) = list_id.as_ref().and_then(|id| state.lists.get_mut(id)) {
        let t = view.actions.dispatch(ActionEvent::FormSaved).ok();
        if let Err(e) = settle(view, &*backend, t) {
            warn!(form = %form_id, error = %e, "list refresh after save failed");
            view.actions.pump();
            refresh_error = Some(json!({ "code": e.code(), "message": e.to_string() }));
        }
        actions = json!(view.actions.state());
    }

    Ok(json!({
        "entity": kind,
        "record": saved,
        "listId": list_id,
        "actions": actions,
        "refreshError": refresh_error,
    }))
}

fn form_close(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let form_id = get_required_str(params, "formId")?;
    let Some(session) = state.forms.remove(&form_id) else {
        return Ok(json!({ "closed": false }));
    };
    if session.controller.is_saving() {
        state.forms.insert(form_id, session);
        return Err(RecordsError::Busy.into());
    }
    let mut actions = serde_json::Value::Null;
    if let Some(view) = session.list_id.as_ref().and_then(|id| state.lists.get_mut(id)) {
        let t = view.actions.dispatch(ActionEvent::FormCancelled).ok();
        match state.backend.as_ref() {
            Some(backend) => {
                settle(view, backend, t)?;
            }
            None => {
                view.actions.pump();
            }
        }
        actions = json!(view.actions.state());
    }
    Ok(json!({ "closed": true, "actions": actions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "form.open" => Some(reply(&req.id, form_open(state, &req.params))),
        "form.setField" => Some(reply(&req.id, form_set_field(state, &req.params))),
        "form.validate" => Some(reply(&req.id, form_validate(state, &req.params))),
        "form.render" => Some(reply(&req.id, form_render(state, &req.params))),
        "form.submit" => Some(reply(&req.id, form_submit(state, &req.params))),
        "form.close" => Some(reply(&req.id, form_close(state, &req.params))),
        _ => None,
    }
}
