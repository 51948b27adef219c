mod test_support;

use serde_json::json;
use test_support::{request_ok, seeded_workspace, spawn_sidecar, str_at};

const EMPLOYEES_CSV: &str = "\
employee_id,name,gender,date_of_birth,email,phone,designation,employment_type,date_of_joining,center_id
1,Anita Desai,Female,1988-02-14,anita.desai@example.com,9000000001,Educator,Full-time,2018-06-01,1
2,Rohan Mehta,Male,1991-09-30,rohan.mehta@example.com,9000000002,HR,Part-time,2021-03-15,2
3,Danish Ali,Male,1993-12-05,danish.ali@example.com,9000000003,Educator,Contract,2022-08-22,1
4,Priya Nair,Female,1995-04-18,priya.nair@example.com,9000000004,Administrator,Full-time,2017-01-09,2
";

fn names(view: &serde_json::Value) -> Vec<String> {
    let mut out: Vec<String> = view
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows")
        .iter()
        .filter_map(|r| r.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    out.sort();
    out
}

#[test]
fn text_query_and_facets_narrow_the_employee_list() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-list-filter", &mut stdin, &mut reader);

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "import",
        "import.csvApply",
        json!({ "entity": "employee", "text": EMPLOYEES_CSV }),
    );
    assert_eq!(imported.pointer("/outcome/inserted"), Some(&json!(4)));

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "list.open",
        json!({ "entity": "employee" }),
    );
    let list_id = str_at(&opened, "/listId").to_string();
    assert_eq!(opened.get("total"), Some(&json!(4)));
    assert_eq!(opened.get("matched"), Some(&json!(4)));
    assert_eq!(str_at(&opened, "/actions/state"), "idle");

    let rohan = opened
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows")
        .iter()
        .find(|r| r.get("name").and_then(|v| v.as_str()) == Some("Rohan Mehta"))
        .cloned()
        .expect("Rohan Mehta imported");
    assert_eq!(str_at(&rohan, "/department"), "Human Resources");
    assert_eq!(str_at(&rohan, "/work_location"), "South Center");

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "text",
        "list.filter",
        json!({ "listId": list_id, "textQuery": "ANI" }),
    );
    assert_eq!(names(&filtered), vec!["Anita Desai", "Danish Ali"]);
    assert_eq!(filtered.get("total"), Some(&json!(4)));

    let faceted = request_ok(
        &mut stdin,
        &mut reader,
        "facet",
        "list.filter",
        json!({ "listId": list_id, "textQuery": "a", "facets": { "center_id": "2" } }),
    );
    assert_eq!(names(&faceted), vec!["Priya Nair", "Rohan Mehta"]);

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "none",
        "list.filter",
        json!({ "listId": list_id, "textQuery": "ani", "facets": { "center_id": "2" } }),
    );
    assert_eq!(none.get("matched"), Some(&json!(0)));
    assert!(none
        .get("rows")
        .and_then(|v| v.as_array())
        .map(|rows| rows.is_empty())
        .unwrap_or(false));

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "all",
        "list.filter",
        json!({
            "listId": list_id,
            "textQuery": "",
            "facets": { "center_id": "all", "designation": "Educator" }
        }),
    );
    assert_eq!(names(&all), vec!["Anita Desai", "Danish Ali"]);
    assert_eq!(str_at(&all, "/criteria/facets/center_id"), "all");

    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "close",
        "list.close",
        json!({ "listId": list_id }),
    );
    assert_eq!(closed.get("closed"), Some(&json!(true)));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn list_refresh_picks_up_records_saved_elsewhere() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-list-refresh", &mut stdin, &mut reader);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "list.open",
        json!({ "entity": "employee", "textQuery": "priya" }),
    );
    let list_id = str_at(&opened, "/listId").to_string();
    assert_eq!(opened.get("total"), Some(&json!(0)));

    request_ok(
        &mut stdin,
        &mut reader,
        "import",
        "import.csvApply",
        json!({ "entity": "employee", "text": EMPLOYEES_CSV }),
    );

    let refreshed = request_ok(
        &mut stdin,
        &mut reader,
        "refresh",
        "list.refresh",
        json!({ "listId": list_id }),
    );
    assert_eq!(refreshed.get("total"), Some(&json!(4)));
    assert_eq!(names(&refreshed), vec!["Priya Nair"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
