#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join("creditd.sqlite3")
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_creditd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn creditd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Sends a request that must fail and returns its error object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn viewer(role: &str, user_id: &str) -> serde_json::Value {
    json!({ "role": role, "userId": user_id })
}

/// Opens a workspace and loads a small engineering catalogue:
///
/// - semester 1: `math` (5 credits), `phys` (10 credits); semester 2: `chem` (4 credits)
/// - students `s1` (parent `p1`, requires 20) and `s2` (parent `p2`, requires 12)
/// - teacher `t1` teaches math and chem, `t2` teaches physics
/// - results for `s1`: r1 math 72 (exam), r2 phys 64 (assignment), r3 chem 39 (exam),
///   r4 recorded under math but taken on the chem exam (85); for `s2`: r5 chem 91
pub fn seed_fixture(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let subjects = [
        json!({ "id": "math", "name": "Engineering Mathematics I", "code": "ENGR101", "credit": 5, "semesterId": 1 }),
        json!({ "id": "phys", "name": "Engineering Physics", "code": "ENGR102", "credit": 10, "semesterId": 1 }),
        json!({ "id": "chem", "name": "Chemistry for Engineers", "code": "ENGR103", "credit": 4, "semesterId": 2 }),
    ];
    let students = [
        json!({ "id": "s1", "name": "Ada", "surname": "Lovelace", "parentId": "p1", "requiredCredits": 20 }),
        json!({ "id": "s2", "name": "Alan", "surname": "Turing", "parentId": "p2", "requiredCredits": 12 }),
    ];
    let lessons = [
        json!({ "id": "l-math", "name": "Lec1", "subjectId": "math", "teacherId": "t1", "startTime": "2025-08-01T09:00:00Z" }),
        json!({ "id": "l-phys", "name": "Lec2", "subjectId": "phys", "teacherId": "t2", "startTime": "2025-08-02T09:00:00Z" }),
        json!({ "id": "l-chem", "name": "Lec3", "subjectId": "chem", "teacherId": "t1", "startTime": "2025-08-03T09:00:00Z" }),
    ];
    let exams = [
        json!({ "id": "e-math", "title": "Calculus Midterm", "lessonId": "l-math", "startTime": "2025-10-01T09:00:00Z", "endTime": "2025-10-01T11:00:00Z" }),
        json!({ "id": "e-chem", "title": "Chemistry Final", "lessonId": "l-chem", "startTime": "2025-12-01T09:00:00Z", "endTime": "2025-12-01T12:00:00Z" }),
    ];
    let assignments = [
        json!({ "id": "a-phys", "title": "Optics Lab Report", "lessonId": "l-phys", "startDate": "2025-09-03", "dueDate": "2025-09-10" }),
    ];
    let results = [
        json!({ "id": "r1", "score": 72, "studentId": "s1", "subjectId": "math", "examId": "e-math" }),
        json!({ "id": "r2", "score": 64, "studentId": "s1", "subjectId": "phys", "assignmentId": "a-phys" }),
        json!({ "id": "r3", "score": 39, "studentId": "s1", "subjectId": "chem", "examId": "e-chem" }),
        json!({ "id": "r4", "score": 85, "studentId": "s1", "subjectId": "math", "examId": "e-chem" }),
        json!({ "id": "r5", "score": 91, "studentId": "s2", "subjectId": "chem", "examId": "e-chem" }),
    ];

    let batches: [(&str, &[serde_json::Value]); 6] = [
        ("subjects.upsert", &subjects),
        ("students.upsert", &students),
        ("lessons.upsert", &lessons),
        ("exams.upsert", &exams),
        ("assignments.upsert", &assignments),
        ("results.upsert", &results),
    ];
    for (method, rows) in batches {
        for (i, row) in rows.iter().enumerate() {
            let id = format!("seed-{}-{}", method, i);
            let _ = request_ok(stdin, reader, &id, method, row.clone());
        }
    }
}
