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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

const LOC: &str = "i4x://MITx/999/problem/Prime";
const BASE: &str = "i4x-MITx-999-problem-Prime";

fn textlines(n: usize) -> Vec<serde_json::Value> {
    (0..n)
        .map(|_| json!({ "tag": "textline", "attrs": { "size": "40" } }))
        .collect()
}

fn prime_responder(inputs: usize) -> serde_json::Value {
    json!({
        "tag": "customresponse",
        "attrs": { "cfn": "test_prime" },
        "children": textlines(inputs),
    })
}

fn problem(children: Vec<serde_json::Value>) -> serde_json::Value {
    let mut all = vec![json!({ "tag": "p", "text": "Enter two prime numbers" })];
    all.extend(children);
    json!({ "tag": "problem", "children": all })
}

fn key(suffix: &str) -> String {
    format!("{}_{}", BASE, suffix)
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    seq: usize,
}

impl Session {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            workspace,
            seq: 0,
        };
        let path = s.workspace.to_string_lossy().to_string();
        s.ok("workspace.select", json!({ "path": path }));
        s
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let id = self.seq.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let id = self.seq.to_string();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn store_problem(&mut self, location: &str, definition: serde_json::Value) {
        self.ok(
            "problems.upsert",
            json!({ "location": location, "definition": definition }),
        );
    }

    fn create(&mut self, answers: serde_json::Value) -> String {
        let created = self.ok(
            "contentTests.create",
            json!({ "problemLocation": LOC, "shouldBe": "ERROR", "answers": answers }),
        );
        created["testId"].as_str().expect("testId").to_string()
    }

    fn matches(&mut self, test_id: &str) -> bool {
        self.ok("contentTests.matches", json!({ "testId": test_id }))["matches"]
            .as_bool()
            .expect("matches flag")
    }

    fn rematch(&mut self, test_id: &str) -> serde_json::Value {
        let out = self.ok("contentTests.rematch", json!({ "testId": test_id }));
        assert_eq!(out["rematched"], true);
        out["summary"].clone()
    }

    fn close(self) {
        drop(self.stdin);
        let mut child = self.child;
        let _ = child.wait();
        let _ = std::fs::remove_dir_all(self.workspace);
    }
}

#[test]
fn appended_responder_keeps_old_answers_and_adds_blank() {
    let mut s = Session::open("contentd-rematch-append");
    s.store_problem(LOC, problem(vec![prime_responder(2)]));
    let test_id = s.create(json!({ key("2_1"): "5", key("2_2"): "174440041" }));
    assert!(s.matches(&test_id));

    s.store_problem(LOC, problem(vec![prime_responder(2), prime_responder(3)]));
    assert!(!s.matches(&test_id));

    let summary = s.rematch(&test_id);
    assert_eq!(summary["kept"], 1);
    assert_eq!(summary["created"], 1);
    assert_eq!(summary["dropped"], 0);
    assert_eq!(
        summary["answers"],
        json!({
            key("2_1"): "5",
            key("2_2"): "174440041",
            key("3_1"): "",
            key("3_2"): "",
            key("3_3"): "",
        })
    );
    assert!(s.matches(&test_id));

    s.close();
}

#[test]
fn responder_inserted_in_front_moves_answers() {
    let mut s = Session::open("contentd-rematch-front");
    s.store_problem(LOC, problem(vec![prime_responder(2)]));
    let test_id = s.create(json!({ key("2_1"): "5", key("2_2"): "174440041" }));

    s.store_problem(LOC, problem(vec![prime_responder(3), prime_responder(2)]));
    assert!(!s.matches(&test_id));

    let summary = s.rematch(&test_id);
    assert_eq!(
        summary["answers"],
        json!({
            key("2_1"): "",
            key("2_2"): "",
            key("2_3"): "",
            key("3_1"): "5",
            key("3_2"): "174440041",
        })
    );

    let model = s.ok("contentTests.summary", json!({ "testId": test_id }))["summary"].clone();
    assert_eq!(
        model["answers"],
        json!(["-- Not Set --", "-- Not Set --", "-- Not Set --", "5", "174440041"])
    );
    assert_eq!(model["verdict"], "Not Run");

    let stored = s.ok("contentTests.get", json!({ "testId": test_id }));
    let responders = stored["fixture"]["responders"].as_array().expect("responders");
    assert_eq!(responders.len(), 2);
    assert_eq!(responders[0]["stringId"], key("2"));
    assert_eq!(responders[1]["stringId"], key("3"));

    s.close();
}

#[test]
fn grown_responder_is_recreated_blank() {
    let mut s = Session::open("contentd-rematch-grown");
    s.store_problem(LOC, problem(vec![prime_responder(2)]));
    let test_id = s.create(json!({ key("2_1"): "5", key("2_2"): "7" }));

    s.store_problem(LOC, problem(vec![prime_responder(3)]));
    assert!(!s.matches(&test_id));

    let summary = s.rematch(&test_id);
    assert_eq!(summary["kept"], 0);
    assert_eq!(summary["created"], 1);
    assert_eq!(summary["dropped"], 1);
    assert_eq!(
        summary["answers"],
        json!({ key("2_1"): "", key("2_2"): "", key("2_3"): "" })
    );

    s.close();
}

#[test]
fn positional_edits_do_not_require_rematch() {
    let mut s = Session::open("contentd-rematch-noop");
    s.store_problem(LOC, problem(vec![prime_responder(1)]));
    let test_id = s.create(json!({ key("2_1"): "5" }));

    let mut edited = problem(vec![prime_responder(1)]);
    edited["children"]
        .as_array_mut()
        .expect("children")
        .push(json!({ "tag": "p", "text": "Good luck" }));
    s.store_problem(LOC, edited);
    assert!(s.matches(&test_id));

    let out = s.ok(
        "contentTests.rematch",
        json!({ "testId": test_id, "onlyIfNecessary": true }),
    );
    assert_eq!(out["rematched"], false);

    let run = s.ok(
        "contentTests.run",
        json!({ "testId": test_id, "rematch": true }),
    );
    assert!(run["rematched"].is_null());

    s.close();
}

#[test]
fn run_with_rematch_realigns_first() {
    let mut s = Session::open("contentd-rematch-run");
    s.store_problem(LOC, problem(vec![prime_responder(1)]));
    let test_id = s.create(json!({ key("2_1"): "5" }));

    s.store_problem(LOC, problem(vec![prime_responder(2), prime_responder(1)]));
    let run = s.ok(
        "contentTests.run",
        json!({ "testId": test_id, "rematch": true }),
    );
    assert_eq!(run["rematched"]["answers"][key("3_1")], "5");
    // customresponse has no answer key, so grading errors as expected.
    assert_eq!(run["outcome"]["verdict"], "Pass");

    s.close();
}

#[test]
fn moved_problem_location_is_a_mismatch() {
    let mut s = Session::open("contentd-rematch-move");
    let moved = "i4x://MITx/999/problem/PrimeMoved";
    s.store_problem(LOC, problem(vec![prime_responder(1)]));
    s.store_problem(moved, problem(vec![prime_responder(1)]));
    let test_id = s.create(json!({ key("2_1"): "5" }));

    s.ok(
        "contentTests.update",
        json!({ "testId": test_id, "problemLocation": moved }),
    );
    assert!(!s.matches(&test_id));

    let summary = s.rematch(&test_id);
    assert_eq!(summary["kept"], 1);
    assert_eq!(
        summary["answers"],
        json!({ "i4x-MITx-999-problem-PrimeMoved_2_1": "5" })
    );

    s.ok("problems.delete", json!({ "location": moved }));
    assert!(!s.matches(&test_id));
    let gone = s.call("contentTests.rematch", json!({ "testId": test_id }));
    assert_eq!(gone["error"]["code"], "problem_not_found");

    s.close();
}

#[test]
fn deleting_a_test_removes_its_fixture() {
    let mut s = Session::open("contentd-rematch-delete");
    s.store_problem(LOC, problem(vec![prime_responder(2)]));
    let test_id = s.create(json!({ key("2_1"): "5" }));

    s.ok("contentTests.delete", json!({ "testId": test_id }));
    let gone = s.call("contentTests.get", json!({ "testId": test_id }));
    assert_eq!(gone["error"]["code"], "not_found");
    let again = s.call("contentTests.delete", json!({ "testId": test_id }));
    assert_eq!(again["error"]["code"], "not_found");

    s.close();
}
