use chrono::Datelike;
use serde_json::json;

use crate::backend::{Filter, Persistence};
use crate::ipc::helpers::{get_opt_i64, get_required_i64, get_required_str, reply, require_backend, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::performance::{
    adjust_year, chart_points, find_quarterly, has_score_data, metrics, normalize_quarter,
    quarters_for_year, report_file_name, AttendanceSummary, ReportRequest, YEARS,
};
use crate::record::{EntityKind, EntityRecord, FieldValue};

/// `params.year`, else the current year pulled into the pageable range.
fn viewed_year(params: &serde_json::Value) -> Result<i32, HandlerErr> {
    match get_opt_i64(params, "year") {
        Some(raw) => match i32::try_from(raw) {
            Ok(y) if YEARS.contains(&y) => Ok(y),
            _ => Err(HandlerErr {
                code: "bad_params",
                message: format!("year {} is out of range", raw),
                details: Some(json!({ "years": YEARS })),
            }),
        },
        None => {
            let now = chrono::Local::now().year();
            Ok(now.clamp(YEARS[0], YEARS[YEARS.len() - 1]))
        }
    }
}

fn load_student<P: Persistence + ?Sized>(backend: &P, student_id: i64) -> Result<EntityRecord, HandlerErr> {
    backend
        .select(
            EntityKind::Student.table(),
            &Filter::all().eq("student_id", FieldValue::Int(student_id)),
        )?
        .into_iter()
        .next()
        .ok_or_else(|| HandlerErr::not_found(format!("student {} not found", student_id)))
}

fn rows_for_student<P: Persistence + ?Sized>(
    backend: &P,
    table: &str,
    student_id: i64,
) -> Result<Vec<EntityRecord>, HandlerErr> {
    Ok(backend.select(table, &Filter::all().eq("student_id", FieldValue::Int(student_id)))?)
}

fn performance_quarters(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = viewed_year(params)?;
    Ok(json!({
        "year": year,
        "years": YEARS,
        "quarters": quarters_for_year(year),
        "previousYear": adjust_year(year, -1),
        "nextYear": adjust_year(year, 1),
    }))
}

fn performance_quarterly(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let year = viewed_year(params)?;
    let quarter = normalize_quarter(&get_required_str(params, "quarter")?, year);
    let backend = require_backend(&mut state.backend)?;

    let student = load_student(&*backend, student_id)?;
    let records = rows_for_student(&*backend, EntityKind::Performance.table(), student_id)?;
    let reports = rows_for_student(&*backend, "general_reporting", student_id)?;

    let performance = find_quarterly(&records, &student, &quarter).map(|row| {
        json!({
            "record": row,
            "metrics": metrics(row),
            "hasScores": has_score_data(row),
            "chart": chart_points(row),
        })
    });
    let report = find_quarterly(&reports, &student, &quarter);
    Ok(json!({
        "studentId": student_id,
        "displayName": EntityKind::Student.display_name(&student),
        "quarter": quarter,
        "performance": performance,
        "report": report,
    }))
}

fn performance_chart(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let year = viewed_year(params)?;
    let quarter = normalize_quarter(&get_required_str(params, "quarter")?, year);
    let backend = require_backend(&mut state.backend)?;
    let student = load_student(&*backend, student_id)?;
    let records = rows_for_student(&*backend, EntityKind::Performance.table(), student_id)?;
    let points = find_quarterly(&records, &student, &quarter)
        .map(chart_points)
        .unwrap_or_default();
    Ok(json!({ "quarter": quarter, "points": points }))
}

fn performance_attendance(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let backend = require_backend(&mut state.backend)?;
    let rows = rows_for_student(&*backend, "student_attendance", student_id)?;
    let summary = AttendanceSummary::from_rows(&rows);
    Ok(json!({
        "studentId": student_id,
        "present": summary.present,
        "absent": summary.absent,
        "ratePercent": summary.rate_percent(),
    }))
}

fn performance_report_request(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let year = viewed_year(params)?;
    let quarter = get_required_str(params, "quarter")?;
    let backend = require_backend(&mut state.backend)?;
    let student = load_student(&*backend, student_id)?;
    let request = ReportRequest::for_student(&student, &quarter, year)?;
    let file_name = report_file_name(
        &student.text("first_name"),
        &student.text("last_name"),
        &request.quarter,
    );
    Ok(json!({ "payload": request, "fileName": file_name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "performance.quarters" => Some(reply(&req.id, performance_quarters(&req.params))),
        "performance.quarterly" => Some(reply(&req.id, performance_quarterly(state, &req.params))),
        "performance.chart" => Some(reply(&req.id, performance_chart(state, &req.params))),
        "performance.attendance" => Some(reply(&req.id, performance_attendance(state, &req.params))),
        "performance.reportRequest" => Some(reply(&req.id, performance_report_request(state, &req.params))),
        _ => None,
    }
}
