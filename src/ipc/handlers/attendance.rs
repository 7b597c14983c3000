use crate::calc::{self, AttendanceSummary};
use crate::intake::AttendanceInput;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{section_i64, SetupSection};
use crate::ipc::helpers::{
    calc_err, db_conn, forbidden, parse_optional_viewer, parse_viewer, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::records;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn summary_json(summary: &AttendanceSummary) -> serde_json::Value {
    json!({
        "total": summary.total,
        "present": summary.present,
        "percentage": calc::round_off_1_decimal(summary.percentage),
    })
}

fn threshold_percent(conn: &Connection, req: &Request) -> Result<f64, serde_json::Value> {
    match req.params.get("thresholdPercent") {
        Some(v) if !v.is_null() => match v.as_f64() {
            Some(t) if t > 0.0 && t <= 100.0 => Ok(t),
            _ => Err(err(
                &req.id,
                "bad_params",
                "thresholdPercent must be a number in (0, 100]",
                None,
            )),
        },
        _ => section_i64(
            conn,
            SetupSection::Attendance,
            "lowAttendanceThresholdPercent",
            calc::DEFAULT_LOW_ATTENDANCE_PERCENT as i64,
        )
        .map(|t| t as f64)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: AttendanceInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let present = match input.validate() {
        Ok(p) => p,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                e.to_string(),
                Some(json!({ "field": e.field() })),
            )
        }
    };
    if let Err(e) = records::load_student(conn, input.student_id.trim()) {
        return calc_err(req, e);
    }
    match conn
        .query_row(
            "SELECT 1 FROM lessons WHERE id = ?",
            [input.lesson_id.trim()],
            |r| r.get::<_, i64>(0),
        )
        .optional()
    {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "lesson not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    // One mark per student, lesson and day; re-marking overwrites.
    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO attendance(id, student_id, lesson_id, date, present) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, lesson_id, date) DO UPDATE SET present = excluded.present",
        (
            &id,
            input.student_id.trim(),
            input.lesson_id.trim(),
            input.date.trim(),
            present as i64,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let viewer = match parse_optional_viewer(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match records::load_student(conn, &student_id) {
        Ok(s) => s,
        Err(e) => return calc_err(req, e),
    };
    if let Some(viewer) = viewer {
        match records::viewer_can_see_student(conn, &viewer, &student) {
            Ok(true) => {}
            Ok(false) => return forbidden(req),
            Err(e) => return calc_err(req, e),
        }
    }
    let threshold = match threshold_percent(conn, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let marks = match records::load_attendance_marks(conn, &student.id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let summary = calc::attendance_summary(marks);
    ok(
        &req.id,
        json!({
            "studentId": student.id,
            "summary": summary.as_ref().map(summary_json),
            "low": summary.map(|s| s.is_low(threshold)).unwrap_or(false),
            "thresholdPercent": threshold,
        }),
    )
}

fn handle_attendance_low_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let viewer = match parse_viewer(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let threshold = match threshold_percent(conn, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if !viewer.role.is_staff() {
        return ok(
            &req.id,
            json!({ "students": [], "count": 0, "thresholdPercent": threshold }),
        );
    }

    let by_student = match records::load_attendance_by_student(conn) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let students: Vec<serde_json::Value> = by_student
        .into_values()
        .filter_map(|(student, marks)| {
            let summary = calc::attendance_summary(marks)?;
            if !summary.is_low(threshold) {
                return None;
            }
            let mut row = summary_json(&summary);
            row["studentId"] = json!(student.id);
            row["studentName"] = json!(student.display_name());
            Some(row)
        })
        .collect();

    ok(
        &req.id,
        json!({
            "count": students.len(),
            "students": students,
            "thresholdPercent": threshold,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.summary" => Some(handle_attendance_summary(state, req)),
        "attendance.lowList" => Some(handle_attendance_low_list(state, req)),
        _ => None,
    }
}
