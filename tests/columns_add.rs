mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seeded_workspace, spawn_sidecar, str_at};

fn field_named<'a>(fields: &'a serde_json::Value, name: &str) -> Option<&'a serde_json::Value> {
    fields
        .as_array()
        .and_then(|all| all.iter().find(|f| f.get("name").and_then(|v| v.as_str()) == Some(name)))
}

#[test]
fn custom_column_extends_the_registry_and_forms() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-columns-add", &mut stdin, &mut reader);

    let types = request_ok(&mut stdin, &mut reader, "types", "columns.types", json!({}));
    let values: Vec<&str> = types
        .get("types")
        .and_then(|v| v.as_array())
        .expect("types")
        .iter()
        .filter_map(|t| t.get("value").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(
        values,
        vec!["text", "integer", "boolean", "date", "timestamp", "decimal"]
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "add",
        "columns.add",
        json!({ "entity": "employee", "columnName": "shift_start", "columnType": "text" }),
    );
    assert_eq!(added.get("success"), Some(&json!(true)));
    assert_eq!(added.get("added"), Some(&json!(["shift_start"])));
    let descriptor = field_named(added.get("fields").expect("fields"), "shift_start")
        .expect("shift_start descriptor");
    assert_eq!(str_at(descriptor, "/label"), "Shift Start");
    assert_eq!(str_at(descriptor, "/category"), "other");

    let schema = request_ok(
        &mut stdin,
        &mut reader,
        "schema",
        "schema.get",
        json!({ "entity": "employee" }),
    );
    assert!(field_named(schema.get("fields").expect("fields"), "shift_start").is_some());

    let form = request_ok(
        &mut stdin,
        &mut reader,
        "form",
        "form.open",
        json!({ "entity": "employee" }),
    );
    let other = form
        .get("sections")
        .and_then(|v| v.as_array())
        .and_then(|s| s.iter().find(|s| s.get("category").and_then(|v| v.as_str()) == Some("other")))
        .cloned()
        .expect("other section");
    assert!(field_named(other.get("fields").expect("fields"), "shift_start").is_some());

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "import",
        "import.csvApply",
        json!({
            "entity": "employee",
            "text": "employee_id,name,gender,date_of_birth,email,phone,designation,employment_type,date_of_joining,center_id,Shift Start\n\
                     5,Meera Iyer,Female,1992-07-11,meera.iyer@example.com,9000000005,Educator,Full-time,2023-04-03,1,08:30\n"
        }),
    );
    assert_eq!(imported.pointer("/outcome/inserted"), Some(&json!(1)));
    let rows = request_ok(
        &mut stdin,
        &mut reader,
        "rows",
        "records.list",
        json!({ "entity": "employee" }),
    );
    assert_eq!(str_at(&rows, "/rows/0/shift_start"), "08:30");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backend_rejections_surface_verbatim() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-columns-reject", &mut stdin, &mut reader);

    let blank = request_err(
        &mut stdin,
        &mut reader,
        "blank",
        "columns.add",
        json!({ "entity": "student", "columnName": "   " }),
        "validation_failed",
    );
    assert_eq!(
        str_at(&blank, "/details/fields/columnName"),
        "Column name is required"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "first",
        "columns.add",
        json!({ "entity": "student", "columnName": "therapy_hours", "columnType": "decimal" }),
    );
    let dup = request_err(
        &mut stdin,
        &mut reader,
        "dup",
        "columns.add",
        json!({ "entity": "student", "columnName": "therapy_hours", "columnType": "decimal" }),
        "schema_rejected",
    );
    assert_eq!(
        str_at(&dup, "/message"),
        "column \"therapy_hours\" of relation \"students\" already exists"
    );

    let reserved = request_err(
        &mut stdin,
        &mut reader,
        "reserved",
        "columns.add",
        json!({ "entity": "student", "columnName": "select" }),
        "schema_rejected",
    );
    assert_eq!(
        str_at(&reserved, "/message"),
        "\"select\" is a reserved word and cannot be used as a column name"
    );

    request_err(
        &mut stdin,
        &mut reader,
        "type",
        "columns.add",
        json!({ "entity": "student", "columnName": "badge", "columnType": "uuid" }),
        "bad_params",
    );

    let schema = request_ok(
        &mut stdin,
        &mut reader,
        "schema",
        "schema.get",
        json!({ "entity": "student" }),
    );
    let hours = field_named(schema.get("fields").expect("fields"), "therapy_hours")
        .expect("therapy_hours descriptor");
    assert_eq!(str_at(hours, "/input/kind"), "decimal");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
