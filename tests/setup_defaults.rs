use serde_json::json;

mod test_support;

use test_support::{db_path, error_code, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_updates_and_persistence() {
    let workspace = temp_dir("creditd-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        defaults,
        json!({
            "attendance": { "lowAttendanceThresholdPercent": 75 },
            "results": { "pageSize": 10 },
            "grading": { "showOutstandingCredits": true },
        })
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "results", "patch": { "pageSize": 25 } }),
    );

    let rejected = [
        json!({ "section": "results", "patch": { "pageSize": 0 } }),
        json!({ "section": "results", "patch": { "sortBy": "score" } }),
        json!({ "section": "grading", "patch": { "showOutstandingCredits": "yes" } }),
        json!({ "section": "billing", "patch": {} }),
        json!({ "section": "attendance", "patch": 75 }),
    ];
    for (i, params) in rejected.into_iter().enumerate() {
        let e = request_err(&mut stdin, &mut reader, &format!("bad-{}", i), "setup.update", params);
        assert_eq!(error_code(&e), "bad_params");
    }

    drop(stdin);
    let _ = child.wait();

    // A fresh process sees what the first one saved.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let reloaded = request_ok(&mut stdin, &mut reader, "5", "setup.get", json!({}));
    assert_eq!(reloaded["results"]["pageSize"], json!(25));
    assert_eq!(reloaded["attendance"]["lowAttendanceThresholdPercent"], json!(75));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_saved_section_falls_back_to_defaults() {
    let workspace = temp_dir("creditd-setup-malformed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let conn = rusqlite::Connection::open(db_path(&workspace)).expect("open db");
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES('setup.results', '{\"pageSize\": \"lots\"}')
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        [],
    )
    .expect("write settings");

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["results"]["pageSize"], json!(10));

    drop(stdin);
    let _ = child.wait();
}
