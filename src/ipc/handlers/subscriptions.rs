use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use uuid::Uuid;

use crate::backend::{EventMask, Persistence};
use crate::db::RECORD_TABLES;
use crate::ipc::helpers::{get_opt_str, get_required_str, reply, require_backend, HandlerErr};
use crate::ipc::types::{AppState, EventQueue, Feed, Request};
use crate::record::EntityKind;

/// `params.entity` may name an entity or any record table.
fn resolve_table(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, "entity")?;
    if let Some(kind) = EntityKind::parse(&raw) {
        return Ok(kind.table().to_string());
    }
    if RECORD_TABLES.contains(&raw.as_str()) {
        return Ok(raw);
    }
    Err(HandlerErr::bad_params(format!("unknown entity or table: {}", raw)))
}

fn subscriptions_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let table = resolve_table(params)?;
    let mask = match get_opt_str(params, "events") {
        Some(raw) => EventMask::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("events must be one of: insert, update, all"))?,
        None => EventMask::All,
    };
    let backend = require_backend(&mut state.backend)?;

    let queue = Rc::new(RefCell::new(EventQueue::default()));
    let sink = queue.clone();
    let handle = backend.subscribe(
        &table,
        mask,
        Box::new(move |event| sink.borrow_mut().push(event.clone())),
    );
    let count = backend.count(&table)?;

    let subscription_id = Uuid::new_v4().to_string();
    state.feeds.insert(
        subscription_id.clone(),
        Feed {
            table: table.clone(),
            handle,
            queue,
        },
    );
    Ok(json!({ "subscriptionId": subscription_id, "table": table, "count": count }))
}

/// Drains queued change events along with the table's current row count.
fn subscriptions_poll(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subscription_id = get_required_str(params, "subscriptionId")?;
    let backend = require_backend(&mut state.backend)?;
    let feed = state
        .feeds
        .get(&subscription_id)
        .ok_or_else(|| HandlerErr::not_found(format!("subscription {} not found", subscription_id)))?;
    let (events, dropped) = feed.queue.borrow_mut().drain();
    let count = backend.count(&feed.table)?;
    Ok(json!({
        "subscriptionId": subscription_id,
        "events": events,
        "dropped": dropped,
        "count": count,
    }))
}

fn subscriptions_close(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subscription_id = get_required_str(params, "subscriptionId")?;
    let Some(feed) = state.feeds.remove(&subscription_id) else {
        return Ok(json!({ "closed": false }));
    };
    if let Some(backend) = state.backend.as_mut() {
        backend.unsubscribe(feed.handle);
    }
    Ok(json!({ "closed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subscriptions.open" => Some(reply(&req.id, subscriptions_open(state, &req.params))),
        "subscriptions.poll" => Some(reply(&req.id, subscriptions_poll(state, &req.params))),
        "subscriptions.close" => Some(reply(&req.id, subscriptions_close(state, &req.params))),
        _ => None,
    }
}
