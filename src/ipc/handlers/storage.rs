use std::path::PathBuf;

use serde_json::json;

use crate::ipc::helpers::{get_opt_str, get_required_str, reply, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::record::FieldValue;
use crate::schema::InputKind;
use crate::storage::BUCKETS;

/// Stores a local file in a bucket. With `formId` + `field`, the resulting url
/// is written into that form field, which must be a file field for the same bucket.
fn storage_upload(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let bucket = get_required_str(params, "bucket")?;
    let entity_type = get_required_str(params, "entityType")?;
    let entity_id = get_required_str(params, "entityId")?;
    let source = PathBuf::from(get_required_str(params, "sourcePath")?);
    let target = match (get_opt_str(params, "formId"), get_opt_str(params, "field")) {
        (Some(form_id), Some(field)) => Some((form_id, field)),
        (None, None) => None,
        _ => return Err(HandlerErr::bad_params("formId and field go together")),
    };

    if let Some((form_id, field)) = &target {
        let session = state
            .forms
            .get(form_id)
            .ok_or_else(|| HandlerErr::not_found(format!("form {} not found", form_id)))?;
        let kind = session.controller.kind();
        let expected = match state.registry.descriptor(kind, field).map(|d| &d.input) {
            Some(InputKind::File { bucket }) => bucket.clone(),
            _ => return Err(HandlerErr::bad_params(format!("{} is not a file field", field))),
        };
        if expected != bucket {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("{} uploads go to {}", field, expected),
                details: Some(json!({ "buckets": BUCKETS })),
            });
        }
    }

    let files = state.files.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let stored = files.upload_from_path(&bucket, &entity_type, &entity_id, &source)?;

    if let Some((form_id, field)) = target {
        if let Some(session) = state.forms.get_mut(&form_id) {
            session
                .controller
                .set_field(&field, FieldValue::text(stored.url.clone()));
        }
    }
    Ok(json!({ "file": stored }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "storage.upload" => Some(reply(&req.id, storage_upload(state, &req.params))),
        _ => None,
    }
}
