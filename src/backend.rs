//! Persistence collaborator: the capability surface the record layer consumes,
//! and its SQLite implementation.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{EXTENSIBLE_TABLES, RECORD_TABLES};
use crate::error::{RecordsError, RecordsResult};
use crate::record::{EntityRecord, FieldValue, ROW_ID_FIELD};
use crate::schema::ColumnInfo;

pub const ADD_CUSTOM_COLUMN_FN: &str = "add_custom_column";

static RE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").unwrap());

const RESERVED_WORDS: &[&str] = &[
    "abort", "add", "all", "alter", "and", "as", "between", "by", "case", "check", "column",
    "constraint", "create", "default", "delete", "distinct", "drop", "else", "exists", "foreign",
    "from", "group", "having", "in", "index", "insert", "into", "is", "join", "key", "like",
    "limit", "not", "null", "on", "or", "order", "primary", "references", "select", "set",
    "table", "then", "to", "union", "unique", "update", "values", "when", "where",
];

/// Equality filter plus optional ordering, the subset of query shapes the layer uses.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub eq: Vec<(String, FieldValue)>,
    pub order_by: Option<String>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: FieldValue) -> Self {
        self.eq.push((column.to_string(), value));
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMask {
    Insert,
    Update,
    All,
}

impl EventMask {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INSERT" | "insert" => Some(EventMask::Insert),
            "UPDATE" | "update" => Some(EventMask::Update),
            "*" | "all" => Some(EventMask::All),
            _ => None,
        }
    }

    fn accepts(self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (EventMask::All, _)
                | (EventMask::Insert, ChangeKind::Insert)
                | (EventMask::Update, ChangeKind::Update)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub row_id: String,
}

pub type ChangeCallback = Box<dyn FnMut(&ChangeEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

pub trait Persistence {
    fn select(&self, table: &str, filter: &Filter) -> RecordsResult<Vec<EntityRecord>>;
    fn insert(&mut self, table: &str, record: &EntityRecord) -> RecordsResult<EntityRecord>;
    fn update(&mut self, table: &str, row_id: &str, partial: &EntityRecord) -> RecordsResult<EntityRecord>;
    fn rpc(&mut self, function: &str, args: &serde_json::Value) -> RecordsResult<serde_json::Value>;
    fn subscribe(&mut self, table: &str, mask: EventMask, callback: ChangeCallback) -> SubscriptionHandle;
    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool;
    fn columns(&self, table: &str) -> RecordsResult<Vec<ColumnInfo>>;
    fn count(&self, table: &str) -> RecordsResult<i64>;
}

struct Subscriber {
    handle: SubscriptionHandle,
    table: String,
    mask: EventMask,
    callback: ChangeCallback,
}

pub struct SqliteBackend {
    conn: Connection,
    subscribers: Vec<Subscriber>,
    next_handle: u64,
}

impl SqliteBackend {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            subscribers: Vec::new(),
            next_handle: 1,
        }
    }

    fn notify(&mut self, table: &str, kind: ChangeKind, row_id: &str) {
        let event = ChangeEvent {
            table: table.to_string(),
            kind,
            row_id: row_id.to_string(),
        };
        for sub in self.subscribers.iter_mut() {
            if sub.table == table && sub.mask.accepts(kind) {
                (sub.callback)(&event);
            }
        }
    }

    fn fetch_row(&self, table: &str, row_id: &str) -> RecordsResult<Option<EntityRecord>> {
        let rows = self.select(
            table,
            &Filter::all().eq(ROW_ID_FIELD, FieldValue::text(row_id)),
        )?;
        Ok(rows.into_iter().next())
    }

    fn add_custom_column(&mut self, args: &serde_json::Value) -> RecordsResult<serde_json::Value> {
        let arg = |key: &str| {
            args.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .unwrap_or("")
                .to_string()
        };
        let table = arg("p_table_name").to_ascii_lowercase();
        let column = arg("p_column_name");
        let column_type = arg("p_column_type").to_ascii_lowercase();

        if !EXTENSIBLE_TABLES.contains(&table.as_str()) {
            return Err(RecordsError::Schema(format!(
                "permission denied: custom columns are not allowed on \"{table}\""
            )));
        }
        if !is_identifier(&column) {
            return Err(RecordsError::Schema(format!(
                "invalid column name \"{column}\": use only letters, numbers, and underscores"
            )));
        }
        if RESERVED_WORDS.contains(&column.to_ascii_lowercase().as_str()) {
            return Err(RecordsError::Schema(format!(
                "\"{column}\" is a reserved word and cannot be used as a column name"
            )));
        }
        let sql_type = match column_type.as_str() {
            "text" => "TEXT",
            "integer" => "INTEGER",
            "decimal" => "NUMERIC",
            "boolean" => "BOOLEAN",
            "date" => "DATE",
            "timestamp" => "TIMESTAMP",
            other => {
                return Err(RecordsError::Schema(format!("type \"{other}\" does not exist")));
            }
        };
        let existing = self.columns(&table)?;
        if existing
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&column))
        {
            return Err(RecordsError::Schema(format!(
                "column \"{column}\" of relation \"{table}\" already exists"
            )));
        }

        self.conn
            .execute(
                &format!("ALTER TABLE {table} ADD COLUMN \"{column}\" {sql_type}"),
                [],
            )
            .map_err(|e| RecordsError::Schema(e.to_string()))?;
        info!(table = %table, column = %column, sql_type, "custom column added");
        Ok(json!({ "success": true, "table": table, "column": column, "type": column_type }))
    }
}

/// Letters, digits and underscores only.
pub fn is_identifier(s: &str) -> bool {
    RE_IDENTIFIER.is_match(s)
}

fn check_table(table: &str) -> RecordsResult<()> {
    if RECORD_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(RecordsError::Persistence(format!("relation \"{table}\" does not exist")))
    }
}

fn check_column(column: &str) -> RecordsResult<()> {
    if is_identifier(column) {
        Ok(())
    } else {
        Err(RecordsError::Persistence(format!("invalid column name \"{column}\"")))
    }
}

impl Persistence for SqliteBackend {
    fn select(&self, table: &str, filter: &Filter) -> RecordsResult<Vec<EntityRecord>> {
        check_table(table)?;
        let mut sql = format!("SELECT * FROM {table}");
        if !filter.eq.is_empty() {
            let mut clauses = Vec::with_capacity(filter.eq.len());
            for (col, _) in &filter.eq {
                check_column(col)?;
                clauses.push(format!("\"{col}\" = ?"));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        match &filter.order_by {
            Some(col) => {
                check_column(col)?;
                sql.push_str(&format!(" ORDER BY \"{col}\""));
            }
            None => sql.push_str(" ORDER BY rowid"),
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map(params_from_iter(filter.eq.iter().map(|(_, v)| v)), |row| {
                let mut rec = EntityRecord::new();
                for (i, name) in names.iter().enumerate() {
                    rec.set(name.clone(), FieldValue::from_sql_ref(row.get_ref(i)?));
                }
                Ok(rec)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(table, rows = rows.len(), "select");
        Ok(rows)
    }

    fn insert(&mut self, table: &str, record: &EntityRecord) -> RecordsResult<EntityRecord> {
        check_table(table)?;
        let row_id = record.row_id().unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut cols = vec![format!("\"{ROW_ID_FIELD}\"")];
        let mut values = vec![FieldValue::text(row_id.clone())];
        // Null cells are left out so column defaults apply.
        for (name, value) in record.fields() {
            if name == ROW_ID_FIELD || matches!(value, FieldValue::Null) {
                continue;
            }
            check_column(name)?;
            cols.push(format!("\"{name}\""));
            values.push(value.clone());
        }
        let placeholders = vec!["?"; cols.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table}({}) VALUES({placeholders})",
            cols.join(", ")
        );
        if let Err(e) = self.conn.execute(&sql, params_from_iter(values.iter())) {
            warn!(table, error = %e, "insert rejected");
            return Err(e.into());
        }

        self.notify(table, ChangeKind::Insert, &row_id);
        self.fetch_row(table, &row_id)?
            .ok_or_else(|| RecordsError::NotFound(format!("{table} row {row_id}")))
    }

    fn update(&mut self, table: &str, row_id: &str, partial: &EntityRecord) -> RecordsResult<EntityRecord> {
        check_table(table)?;
        let mut sets = Vec::new();
        let mut values = Vec::new();
        for (name, value) in partial.fields() {
            if name == ROW_ID_FIELD {
                continue;
            }
            check_column(name)?;
            sets.push(format!("\"{name}\" = ?"));
            values.push(value.clone());
        }
        if sets.is_empty() {
            return self
                .fetch_row(table, row_id)?
                .ok_or_else(|| RecordsError::NotFound(format!("{table} row {row_id}")));
        }
        values.push(FieldValue::text(row_id));
        let sql = format!("UPDATE {table} SET {} WHERE id = ?", sets.join(", "));
        let changed = match self.conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(n) => n,
            Err(e) => {
                warn!(table, row_id, error = %e, "update rejected");
                return Err(e.into());
            }
        };
        if changed == 0 {
            return Err(RecordsError::NotFound(format!("{table} row {row_id}")));
        }

        self.notify(table, ChangeKind::Update, row_id);
        self.fetch_row(table, row_id)?
            .ok_or_else(|| RecordsError::NotFound(format!("{table} row {row_id}")))
    }

    fn rpc(&mut self, function: &str, args: &serde_json::Value) -> RecordsResult<serde_json::Value> {
        match function {
            ADD_CUSTOM_COLUMN_FN => self.add_custom_column(args),
            other => Err(RecordsError::Persistence(format!(
                "function {other} does not exist"
            ))),
        }
    }

    fn subscribe(&mut self, table: &str, mask: EventMask, callback: ChangeCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscribers.push(Subscriber {
            handle,
            table: table.to_string(),
            mask,
            callback,
        });
        handle
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.handle != handle);
        self.subscribers.len() != before
    }

    fn columns(&self, table: &str) -> RecordsResult<Vec<ColumnInfo>> {
        check_table(table)?;
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let cols = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cols)
    }

    fn count(&self, table: &str) -> RecordsResult<i64> {
        check_table(table)?;
        let n: Option<i64> = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .optional()?;
        Ok(n.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;
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

    fn backend(prefix: &str) -> SqliteBackend {
        let conn = crate::db::open_db(&temp_dir(prefix)).expect("open db");
        SqliteBackend::new(conn)
    }

    fn center(id: i64, name: &str) -> EntityRecord {
        let mut rec = EntityRecord::new();
        rec.set("center_id", FieldValue::Int(id));
        rec.set("name", FieldValue::text(name));
        rec
    }

    #[test]
    fn insert_select_update_roundtrip() {
        let mut be = backend("centerdesk-backend-crud");
        let inserted = be.insert("centers", &center(1, "North")).expect("insert");
        let row_id = inserted.row_id().expect("row id");
        be.insert("centers", &center(2, "South")).expect("insert");

        let rows = be
            .select("centers", &Filter::all().eq("center_id", FieldValue::Int(2)))
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("name"), "South");

        let mut patch = EntityRecord::new();
        patch.set("name", FieldValue::text("North Annex"));
        let updated = be.update("centers", &row_id, &patch).expect("update");
        assert_eq!(updated.text("name"), "North Annex");
        assert_eq!(be.count("centers").expect("count"), 2);
    }

    #[test]
    fn identifiers_are_word_characters_only() {
        assert!(is_identifier("therapy_hours2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("First Name"));
        assert!(!is_identifier("x;drop"));
    }

    #[test]
    fn rejects_unknown_tables_and_bad_columns() {
        let mut be = backend("centerdesk-backend-reject");
        assert!(matches!(be.select("sqlite_master", &Filter::all()), Err(RecordsError::Persistence(_))));
        let mut rec = center(1, "X");
        rec.set("name; DROP TABLE centers", FieldValue::text("x"));
        assert!(matches!(be.insert("centers", &rec), Err(RecordsError::Persistence(_))));
        let dup = be.insert("centers", &center(1, "A")).and_then(|_| be.insert("centers", &center(1, "B")));
        assert!(matches!(dup, Err(RecordsError::Persistence(_))));
    }

    #[test]
    fn add_custom_column_reports_backend_messages() {
        let mut be = backend("centerdesk-backend-rpc");
        let ok = be
            .rpc(
                ADD_CUSTOM_COLUMN_FN,
                &json!({ "p_table_name": "employees", "p_column_name": "shift", "p_column_type": "text" }),
            )
            .expect("add column");
        assert_eq!(ok["success"], json!(true));
        assert!(be.columns("employees").expect("cols").iter().any(|c| c.name == "shift"));

        let dup = be.rpc(
            ADD_CUSTOM_COLUMN_FN,
            &json!({ "p_table_name": "employees", "p_column_name": "shift", "p_column_type": "text" }),
        );
        match dup {
            Err(RecordsError::Schema(msg)) => {
                assert_eq!(msg, "column \"shift\" of relation \"employees\" already exists")
            }
            other => panic!("unexpected: {other:?}"),
        }

        let reserved = be.rpc(
            ADD_CUSTOM_COLUMN_FN,
            &json!({ "p_table_name": "students", "p_column_name": "Select", "p_column_type": "text" }),
        );
        assert!(matches!(reserved, Err(RecordsError::Schema(_))));

        let private = be.rpc(
            ADD_CUSTOM_COLUMN_FN,
            &json!({ "p_table_name": "centers", "p_column_name": "code", "p_column_type": "text" }),
        );
        assert!(matches!(private, Err(RecordsError::Schema(_))));
    }

    #[test]
    fn subscribers_see_matching_events_until_unsubscribed() {
        let mut be = backend("centerdesk-backend-sub");
        let seen: Rc<RefCell<Vec<ChangeEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let handle = be.subscribe(
            "centers",
            EventMask::Insert,
            Box::new(move |e| sink.borrow_mut().push(e.clone())),
        );
        let row = be.insert("centers", &center(1, "A")).expect("insert");
        let mut patch = EntityRecord::new();
        patch.set("name", FieldValue::text("B"));
        be.update("centers", &row.row_id().expect("id"), &patch).expect("update");
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].kind, ChangeKind::Insert);

        assert!(be.unsubscribe(handle));
        be.insert("centers", &center(2, "C")).expect("insert");
        assert_eq!(seen.borrow().len(), 1);
        assert!(!be.unsubscribe(handle));
    }
}
