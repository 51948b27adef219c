mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, seeded_workspace, spawn_sidecar, str_at};

fn save_prefilled(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    entity: &str,
    prefill: serde_json::Value,
) -> serde_json::Value {
    let opened = request_ok(
        stdin,
        reader,
        "open",
        "form.open",
        json!({ "entity": entity, "prefill": prefill }),
    );
    let form_id = str_at(&opened, "/formId").to_string();
    request_ok(
        stdin,
        reader,
        "submit",
        "form.submit",
        json!({ "formId": form_id }),
    )
}

fn kabir() -> serde_json::Value {
    json!({
        "student_id": 201,
        "first_name": "Kabir",
        "last_name": "Shah",
        "gender": "Male",
        "dob": "2016-02-03",
        "contact_number": "9811100201",
        "center_id": 1,
        "program_id": 7,
        "educator_employee_id": 11
    })
}

#[test]
fn subscriptions_report_inserts_until_closed() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-subscriptions", &mut stdin, &mut reader);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "sub",
        "subscriptions.open",
        json!({ "entity": "student", "events": "insert" }),
    );
    let subscription_id = str_at(&opened, "/subscriptionId").to_string();
    assert_eq!(str_at(&opened, "/table"), "students");
    assert_eq!(opened.get("count"), Some(&json!(0)));

    let saved = save_prefilled(&mut stdin, &mut reader, "student", kabir());
    let row_id = str_at(&saved, "/record/id").to_string();

    let polled = request_ok(
        &mut stdin,
        &mut reader,
        "poll",
        "subscriptions.poll",
        json!({ "subscriptionId": subscription_id }),
    );
    assert_eq!(polled.get("count"), Some(&json!(1)));
    assert_eq!(str_at(&polled, "/events/0/kind"), "insert");
    assert_eq!(str_at(&polled, "/events/0/rowId"), row_id);
    assert_eq!(polled.get("dropped"), Some(&json!(0)));

    // Updates are outside the insert-only mask.
    let edit = request_ok(
        &mut stdin,
        &mut reader,
        "edit",
        "form.open",
        json!({ "entity": "student", "id": row_id }),
    );
    let form_id = str_at(&edit, "/formId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "set",
        "form.setField",
        json!({ "formId": form_id, "field": "status", "value": "Active" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "form.submit",
        json!({ "formId": form_id }),
    );
    let quiet = request_ok(
        &mut stdin,
        &mut reader,
        "poll-again",
        "subscriptions.poll",
        json!({ "subscriptionId": subscription_id }),
    );
    assert_eq!(quiet.get("events"), Some(&json!([])));

    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "close",
        "subscriptions.close",
        json!({ "subscriptionId": subscription_id }),
    );
    assert_eq!(closed.get("closed"), Some(&json!(true)));
    request_err(
        &mut stdin,
        &mut reader,
        "poll-closed",
        "subscriptions.poll",
        json!({ "subscriptionId": subscription_id }),
        "not_found",
    );
    request_err(
        &mut stdin,
        &mut reader,
        "bad-mask",
        "subscriptions.open",
        json!({ "entity": "student", "events": "delete" }),
        "bad_params",
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn uploads_land_in_the_bucket_and_on_the_form() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-storage", &mut stdin, &mut reader);
    let source = workspace.join("Portrait.JPG");
    std::fs::write(&source, b"\xff\xd8\xff\xe0 kabir portrait").expect("write source");

    let saved = save_prefilled(&mut stdin, &mut reader, "student", kabir());
    let row_id = str_at(&saved, "/record/id").to_string();
    let edit = request_ok(
        &mut stdin,
        &mut reader,
        "edit",
        "form.open",
        json!({ "entity": "student", "id": row_id }),
    );
    let form_id = str_at(&edit, "/formId").to_string();

    let wrong_bucket = request_err(
        &mut stdin,
        &mut reader,
        "wrong-bucket",
        "storage.upload",
        json!({
            "bucket": "employee-photos",
            "entityType": "student",
            "entityId": "201",
            "sourcePath": source.to_string_lossy(),
            "formId": form_id,
            "field": "photo"
        }),
        "bad_params",
    );
    assert_eq!(str_at(&wrong_bucket, "/message"), "photo uploads go to student-photos");

    request_err(
        &mut stdin,
        &mut reader,
        "unknown-bucket",
        "storage.upload",
        json!({
            "bucket": "payslips",
            "entityType": "student",
            "entityId": "201",
            "sourcePath": source.to_string_lossy()
        }),
        "bad_params",
    );

    let uploaded = request_ok(
        &mut stdin,
        &mut reader,
        "upload",
        "storage.upload",
        json!({
            "bucket": "student-photos",
            "entityType": "student",
            "entityId": "201",
            "sourcePath": source.to_string_lossy(),
            "formId": form_id,
            "field": "photo"
        }),
    );
    let url = str_at(&uploaded, "/file/url").to_string();
    assert!(url.starts_with("storage://student-photos/student/201/"));
    assert!(url.ends_with(".jpg"));
    let stored_path = str_at(&uploaded, "/file/path").to_string();
    assert_eq!(
        std::fs::read(&stored_path).expect("stored file"),
        b"\xff\xd8\xff\xe0 kabir portrait".to_vec()
    );

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "upload-again",
        "storage.upload",
        json!({
            "bucket": "student-photos",
            "entityType": "student",
            "entityId": "201",
            "sourcePath": source.to_string_lossy()
        }),
    );
    assert_eq!(str_at(&again, "/file/url"), url);

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "form.submit",
        json!({ "formId": form_id }),
    );
    assert_eq!(str_at(&saved, "/record/photo"), url);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn quarterly_performance_chart_and_report_request() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace("centerdesk-performance", &mut stdin, &mut reader);

    save_prefilled(&mut stdin, &mut reader, "student", kabir());
    save_prefilled(
        &mut stdin,
        &mut reader,
        "performance",
        json!({
            "student_id": 201,
            "program_id": 7,
            "educator_employee_id": 11,
            "quarter": "January 2025 - March 2025",
            "area_of_development": "Communication",
            "1_score": 8,
            "1_description": "Follows two-step instructions with visual cues",
            "2_score": 6.5,
            "2_description": "Turn taking"
        }),
    );

    let quarters = request_ok(
        &mut stdin,
        &mut reader,
        "quarters",
        "performance.quarters",
        json!({ "year": 2026 }),
    );
    assert_eq!(str_at(&quarters, "/quarters/3"), "October 2026 - December 2026");
    assert_eq!(quarters.get("previousYear"), Some(&json!(2025)));
    assert_eq!(quarters.get("nextYear"), Some(&json!(null)));
    request_err(
        &mut stdin,
        &mut reader,
        "out-of-range",
        "performance.quarters",
        json!({ "year": 2030 }),
        "bad_params",
    );
    // 2^32 + 2024 must not wrap around to 2024.
    request_err(
        &mut stdin,
        &mut reader,
        "wide-year",
        "performance.quarters",
        json!({ "year": 4294969320i64 }),
        "bad_params",
    );

    let quarterly = request_ok(
        &mut stdin,
        &mut reader,
        "quarterly",
        "performance.quarterly",
        json!({ "studentId": 201, "quarter": "January 2024 - March 2024", "year": 2025 }),
    );
    assert_eq!(str_at(&quarterly, "/quarter"), "January 2025 - March 2025");
    assert_eq!(str_at(&quarterly, "/displayName"), "Kabir Shah");
    assert_eq!(quarterly.pointer("/performance/hasScores"), Some(&json!(true)));
    assert_eq!(quarterly.get("report"), Some(&json!(null)));
    let metrics = quarterly
        .pointer("/performance/metrics")
        .and_then(|v| v.as_array())
        .expect("metrics");
    assert!(metrics
        .iter()
        .any(|m| m.get("label").and_then(|v| v.as_str()) == Some("Score 1")));
    assert!(metrics
        .iter()
        .all(|m| m.get("key").and_then(|v| v.as_str()) != Some("quarter")));

    let chart = request_ok(
        &mut stdin,
        &mut reader,
        "chart",
        "performance.chart",
        json!({ "studentId": "201", "quarter": "January 2025 - March 2025", "year": 2025 }),
    );
    assert_eq!(str_at(&chart, "/points/0/name"), "Follows two-step instructions ...");
    assert_eq!(
        str_at(&chart, "/points/0/fullDescription"),
        "Follows two-step instructions with visual cues"
    );
    assert_eq!(chart.pointer("/points/0/score").and_then(|v| v.as_f64()), Some(8.0));
    assert_eq!(str_at(&chart, "/points/1/name"), "Turn taking");
    assert_eq!(chart.pointer("/points/1/score").and_then(|v| v.as_f64()), Some(6.5));

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "empty-quarter",
        "performance.chart",
        json!({ "studentId": 201, "quarter": "April 2025 - June 2025", "year": 2025 }),
    );
    assert_eq!(empty.get("points"), Some(&json!([])));

    let attendance = request_ok(
        &mut stdin,
        &mut reader,
        "attendance",
        "performance.attendance",
        json!({ "studentId": 201 }),
    );
    assert_eq!(attendance.get("present"), Some(&json!(0)));
    assert_eq!(attendance.get("ratePercent"), Some(&json!(null)));

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "report",
        "performance.reportRequest",
        json!({ "studentId": 201, "quarter": "April 2025 - June 2025", "year": 2025 }),
    );
    assert_eq!(
        str_at(&report, "/fileName"),
        "Kabir_Shah_April_2025_-_June_2025_Report.pdf"
    );
    assert_eq!(report.pointer("/payload/educator_employee_id"), Some(&json!(11)));

    let mut no_educator = kabir();
    no_educator["student_id"] = json!(202);
    no_educator["first_name"] = json!("Zoya");
    no_educator["educator_employee_id"] = json!(null);
    save_prefilled(&mut stdin, &mut reader, "student", no_educator);
    let missing = request_err(
        &mut stdin,
        &mut reader,
        "report-missing",
        "performance.reportRequest",
        json!({ "studentId": 202, "quarter": "April 2025 - June 2025", "year": 2025 }),
        "validation_failed",
    );
    assert!(missing.pointer("/details/fields/educator_employee_id").is_some());

    request_err(
        &mut stdin,
        &mut reader,
        "unknown-student",
        "performance.quarterly",
        json!({ "studentId": 999, "quarter": "January 2025 - March 2025", "year": 2025 }),
        "not_found",
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
