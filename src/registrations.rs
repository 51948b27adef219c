//! Public registration submissions waiting for staff review. Accepting one hands a
//! student snapshot to a list view's action bar; rejecting just records the decision.

use serde::Serialize;
use tracing::info;

use crate::actions::{PrefillOrigin, PrefillRequest};
use crate::backend::{Filter, Persistence};
use crate::error::{RecordsError, RecordsResult};
use crate::record::{EntityKind, EntityRecord, FieldValue};
use crate::schema::SchemaRegistry;

pub const REGISTRATIONS_TABLE: &str = "pending_registrations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Accepted => "accepted",
            RegistrationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(RegistrationStatus::Pending),
            "accepted" => Some(RegistrationStatus::Accepted),
            "rejected" => Some(RegistrationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: String,
    pub submitted_at: String,
    pub status: RegistrationStatus,
    pub decided_at: Option<String>,
    pub fields: EntityRecord,
}

impl Registration {
    fn from_row(row: &EntityRecord) -> RecordsResult<Self> {
        let id = row
            .row_id()
            .ok_or_else(|| RecordsError::Persistence("registration row without id".into()))?;
        let status = RegistrationStatus::parse(&row.text("status")).ok_or_else(|| {
            RecordsError::Persistence(format!("registration {id} has unknown status"))
        })?;
        let payload: serde_json::Value = serde_json::from_str(&row.text("payload"))
            .map_err(|e| RecordsError::Persistence(format!("registration {id} payload: {e}")))?;
        let decided_at = match row.get("decided_at") {
            Some(v) if !v.is_empty() => Some(v.display()),
            _ => None,
        };
        Ok(Self {
            submitted_at: row.text("submitted_at"),
            status,
            decided_at,
            fields: EntityRecord::from_json(payload)?,
            id,
        })
    }
}

/// Turns labelled registration answers into a student snapshot. Answers that
/// match no student field stay on the registration itself.
pub fn student_snapshot(registry: &SchemaRegistry, fields: &EntityRecord) -> EntityRecord {
    registry.map_snapshot(EntityKind::Student, fields).values
}

pub fn submit<P: Persistence + ?Sized>(backend: &mut P, fields: &EntityRecord) -> RecordsResult<Registration> {
    if fields.fields().all(|(_, v)| v.is_empty()) {
        return Err(RecordsError::BadInput("registration has no answers".into()));
    }
    let mut row = EntityRecord::new();
    row.set("submitted_at", FieldValue::text(chrono::Utc::now().to_rfc3339()));
    row.set("status", FieldValue::text(RegistrationStatus::Pending.as_str()));
    row.set("payload", FieldValue::text(fields.to_json().to_string()));
    let stored = backend.insert(REGISTRATIONS_TABLE, &row)?;
    let registration = Registration::from_row(&stored)?;
    info!(registration = %registration.id, "registration submitted");
    Ok(registration)
}

pub fn list<P: Persistence + ?Sized>(
    backend: &P,
    status: Option<RegistrationStatus>,
) -> RecordsResult<Vec<Registration>> {
    let mut filter = Filter::all().order_by("submitted_at");
    if let Some(status) = status {
        filter = filter.eq("status", FieldValue::text(status.as_str()));
    }
    backend
        .select(REGISTRATIONS_TABLE, &filter)?
        .iter()
        .map(Registration::from_row)
        .collect()
}

pub fn get<P: Persistence + ?Sized>(backend: &P, id: &str) -> RecordsResult<Registration> {
    let rows = backend.select(
        REGISTRATIONS_TABLE,
        &Filter::all().eq("id", FieldValue::text(id)),
    )?;
    let row = rows
        .first()
        .ok_or_else(|| RecordsError::NotFound(format!("registration {id}")))?;
    Registration::from_row(row)
}

fn decide<P: Persistence + ?Sized>(
    backend: &mut P,
    id: &str,
    status: RegistrationStatus,
) -> RecordsResult<Registration> {
    let current = get(backend, id)?;
    if current.status != RegistrationStatus::Pending {
        return Err(RecordsError::BadInput(format!(
            "registration {id} is already {}",
            current.status.as_str()
        )));
    }
    let mut patch = EntityRecord::new();
    patch.set("status", FieldValue::text(status.as_str()));
    patch.set("decided_at", FieldValue::text(chrono::Utc::now().to_rfc3339()));
    let row = backend.update(REGISTRATIONS_TABLE, id, &patch)?;
    info!(registration = id, status = status.as_str(), "registration decided");
    Registration::from_row(&row)
}

/// Marks the registration accepted and builds the prefill request for the
/// student form. Delivering it is up to the caller.
pub fn accept<P: Persistence + ?Sized>(
    backend: &mut P,
    registry: &SchemaRegistry,
    id: &str,
) -> RecordsResult<(Registration, PrefillRequest)> {
    let registration = decide(backend, id, RegistrationStatus::Accepted)?;
    let request = PrefillRequest {
        snapshot: student_snapshot(registry, &registration.fields),
        origin: PrefillOrigin::Registration {
            registration_id: registration.id.clone(),
        },
    };
    Ok((registration, request))
}

pub fn reject<P: Persistence + ?Sized>(backend: &mut P, id: &str) -> RecordsResult<Registration> {
    decide(backend, id, RegistrationStatus::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn answers() -> EntityRecord {
        EntityRecord::from_json(json!({
            "Timestamp": "2025-01-04 10:00",
            "First Name": "Kabir",
            "Last Name": "Shah",
            "Date of Birth": "2016-02-03",
            "Parent's Email": "shah@example.org",
            "Favourite Colour": "Blue"
        }))
        .expect("answers")
    }

    #[test]
    fn snapshot_maps_labels_and_drops_unknown_keys() {
        let snap = student_snapshot(&SchemaRegistry::new(), &answers());
        assert_eq!(snap.text("first_name"), "Kabir");
        assert_eq!(snap.text("dob"), "2016-02-03");
        assert_eq!(snap.text("parents_email"), "shah@example.org");
        assert!(snap.get("Favourite Colour").is_none());
        assert!(snap.get("Timestamp").is_none());
    }

    #[test]
    fn accept_and_reject_are_one_shot() {
        let conn = crate::db::open_db(&temp_dir("centerdesk-registrations")).expect("db");
        let mut be = SqliteBackend::new(conn);

        let first = submit(&mut be, &answers()).expect("submit");
        let second = submit(&mut be, &answers()).expect("submit");
        assert_eq!(list(&be, Some(RegistrationStatus::Pending)).expect("list").len(), 2);

        let registry = SchemaRegistry::new();
        let (accepted, request) = accept(&mut be, &registry, &first.id).expect("accept");
        assert_eq!(accepted.status, RegistrationStatus::Accepted);
        assert!(accepted.decided_at.is_some());
        assert_eq!(request.snapshot.text("last_name"), "Shah");
        assert_eq!(
            request.origin,
            PrefillOrigin::Registration { registration_id: first.id.clone() }
        );
        assert!(matches!(accept(&mut be, &registry, &first.id), Err(RecordsError::BadInput(_))));

        reject(&mut be, &second.id).expect("reject");
        assert!(list(&be, Some(RegistrationStatus::Pending)).expect("list").is_empty());
        assert_eq!(list(&be, None).expect("list").len(), 2);
        assert!(matches!(reject(&mut be, "missing"), Err(RecordsError::NotFound(_))));
    }

    #[test]
    fn empty_submissions_are_rejected() {
        let conn = crate::db::open_db(&temp_dir("centerdesk-registrations-empty")).expect("db");
        let mut be = SqliteBackend::new(conn);
        let empty = EntityRecord::from_json(json!({ "First Name": "" })).expect("rec");
        assert!(matches!(submit(&mut be, &empty), Err(RecordsError::BadInput(_))));
    }
}
