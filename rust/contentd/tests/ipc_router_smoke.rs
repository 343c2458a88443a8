use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_contentd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn contentd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("contentd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let before = request(
        &mut stdin,
        &mut reader,
        "0",
        "contentTests.list",
        json!({}),
    );
    assert_eq!(error_code(&before), Some("no_workspace"));

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "problems.upsert",
        json!({
            "location": "i4x://Smoke/1/problem/P",
            "definition": {
                "tag": "problem",
                "children": [
                    { "tag": "stringresponse", "attrs": { "answer": "yes" },
                      "children": [{ "tag": "textline" }] }
                ]
            }
        }),
    );
    let _ = request(&mut stdin, &mut reader, "4", "problems.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "problems.get",
        json!({ "location": "i4x://Smoke/1/problem/P" }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "6",
        "contentTests.create",
        json!({
            "problemLocation": "i4x://Smoke/1/problem/P",
            "shouldBe": "Correct",
            "answers": { "i4x-Smoke-1-problem-P_2_1": "yes" }
        }),
    );
    let test_id = created
        .get("result")
        .and_then(|v| v.get("testId"))
        .and_then(|v| v.as_str())
        .expect("testId")
        .to_string();

    for (i, method) in [
        "contentTests.get",
        "contentTests.matches",
        "contentTests.run",
        "contentTests.rematch",
        "contentTests.summary",
        "contentTests.update",
    ]
    .iter()
    .enumerate()
    {
        let _ = request(
            &mut stdin,
            &mut reader,
            &format!("7-{}", i),
            method,
            json!({ "testId": test_id }),
        );
    }
    let _ = request(&mut stdin, &mut reader, "8", "contentTests.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "settings.set",
        json!({ "key": "grading", "value": { "numericTolerance": 0.01 } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "settings.get",
        json!({ "key": "grading" }),
    );
    for (i, method) in [
        "notifications.enable",
        "notifications.status",
        "notifications.disable",
    ]
    .iter()
    .enumerate()
    {
        let _ = request(
            &mut stdin,
            &mut reader,
            &format!("10-{}", i),
            method,
            json!({ "username": "testuser" }),
        );
    }
    let _ = request(
        &mut stdin,
        &mut reader,
        "10-u",
        "notifications.unsubscribe",
        json!({ "token": "unknown" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "contentTests.delete",
        json!({ "testId": test_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "problems.delete",
        json!({ "location": "i4x://Smoke/1/problem/P" }),
    );

    writeln!(stdin, "{{\"id\":\"13\",\"method\":\"nope\"}}").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let unknown: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
