use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{section_bool, SetupSection};
use crate::ipc::helpers::{calc_err, db_conn, forbidden, parse_optional_viewer, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ResultScope, StudentRecord};
use rusqlite::Connection;
use serde_json::json;

/// Loads the student and applies the optional viewer's visibility rules.
fn visible_student(
    conn: &Connection,
    req: &Request,
) -> Result<StudentRecord, serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let viewer = parse_optional_viewer(req)?;
    let student = records::load_student(conn, &student_id).map_err(|e| calc_err(req, e))?;
    if let Some(viewer) = viewer {
        let allowed = records::viewer_can_see_student(conn, &viewer, &student)
            .map_err(|e| calc_err(req, e))?;
        if !allowed {
            return Err(forbidden(req));
        }
    }
    Ok(student)
}

fn parse_semester_id(req: &Request) -> Result<i64, serde_json::Value> {
    match req.params.get("semesterId") {
        None => Ok(1),
        Some(v) if v.is_null() => Ok(1),
        Some(v) => match v.as_i64() {
            Some(n) if n >= 1 => Ok(n),
            _ => Err(err(
                &req.id,
                "bad_params",
                "semesterId must be a positive integer",
                Some(json!({ "semesterId": v })),
            )),
        },
    }
}

fn handle_credits_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student = match visible_student(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let results = match records::load_results(conn, &ResultScope::Student(student.id.clone())) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let summary = calc::credit_summary(student.required_credits, results.iter().map(|r| &r.scored));
    let show_outstanding =
        match section_bool(conn, SetupSection::Grading, "showOutstandingCredits", true) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };

    let mut out = json!({
        "studentId": student.id,
        "studentName": student.display_name(),
        "totalEarned": summary.total_earned,
        "required": summary.required,
        "deficient": summary.deficient,
    });
    if show_outstanding {
        out["outstanding"] = json!(summary.outstanding());
    }
    ok(&req.id, out)
}

fn handle_semester_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let semester_id = match parse_semester_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match visible_student(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let entries = match records::load_semester_entries(conn, &student.id, semester_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let report = calc::semester_report(semester_id, &entries);

    let mut out = json!(report);
    out["studentId"] = json!(student.id);
    out["sgpaDisplay"] = json!(format!("{:.2}", report.sgpa));
    ok(&req.id, out)
}

fn handle_gpa_cumulative(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("sgpas").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "sgpas must be an array", None);
    };
    let mut sgpas: Vec<Option<f64>> = Vec::with_capacity(raw.len());
    for (i, v) in raw.iter().enumerate() {
        if v.is_null() {
            sgpas.push(None);
            continue;
        }
        let Some(n) = v.as_f64() else {
            return err(
                &req.id,
                "bad_params",
                "each SGPA must be a number or null",
                Some(json!({ "index": i })),
            );
        };
        sgpas.push(Some(n));
    }
    match calc::cumulative_gpa(&sgpas) {
        Ok(cgpa) => ok(
            &req.id,
            json!({
                "cgpa": cgpa,
                "semestersCounted": sgpas.iter().flatten().count(),
                "classification": calc::Classification::from_cgpa(cgpa),
            }),
        ),
        Err(e) => calc_err(req, e),
    }
}

fn handle_gpa_percentage(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(cgpa) = req.params.get("cgpa").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "cgpa must be a number", None);
    };
    match calc::cgpa_to_percentage(cgpa) {
        Ok(percentage) => ok(&req.id, json!({ "cgpa": cgpa, "percentage": percentage })),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "credits.summary" => Some(handle_credits_summary(state, req)),
        "semester.report" => Some(handle_semester_report(state, req)),
        "gpa.cumulative" => Some(handle_gpa_cumulative(state, req)),
        "gpa.percentage" => Some(handle_gpa_percentage(state, req)),
        _ => None,
    }
}
