use crate::fingerprint::fingerprint;
use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::problem::{ProblemNode, ProblemTree};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn db_err(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

fn responders_json(tree: &ProblemTree) -> serde_json::Value {
    let responders: Vec<serde_json::Value> = tree
        .responders
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "tag": r.tag(),
                "fingerprint": fingerprint(&r.xml),
                "inputIds": r.inputs.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!(responders)
}

fn problems_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let location = get_required_str(params, "location")?;
    if location.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "location must not be empty"));
    }
    let Some(raw) = params.get("definition") else {
        return Err(HandlerErr::new("bad_params", "missing definition"));
    };
    let definition: ProblemNode = serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("invalid definition: {}", e),
        details: None,
    })?;
    definition.validate_names().map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("invalid definition: {}", e),
        details: Some(json!({ "name": e.name() })),
    })?;

    let problem_id = store::upsert_problem(conn, &location, &definition).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "problems" })),
    })?;
    let tree = ProblemTree::build(&location, &definition);
    Ok(json!({
        "problemId": problem_id,
        "location": location,
        "responders": responders_json(&tree),
    }))
}

fn problems_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let location = get_required_str(params, "location")?;
    let Some(row) = store::load_problem(conn, &location).map_err(db_err)? else {
        return Err(HandlerErr::new("not_found", "problem not found"));
    };
    let tree = ProblemTree::build(&location, &row.definition);
    Ok(json!({
        "problem": row,
        "responders": responders_json(&tree),
    }))
}

fn problems_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let rows = store::list_problem_locations(conn).map_err(db_err)?;
    let problems: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(location, updated_at)| json!({ "location": location, "updatedAt": updated_at }))
        .collect();
    Ok(json!({ "problems": problems }))
}

fn problems_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let location = get_required_str(params, "location")?;
    let deleted = store::delete_problem(conn, &location).map_err(|e| HandlerErr {
        code: "db_delete_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "problems" })),
    })?;
    if !deleted {
        return Err(HandlerErr::new("not_found", "problem not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_problems_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match problems_upsert(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_problems_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match problems_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_problems_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "problems": [] }));
    };
    match problems_list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_problems_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match problems_delete(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "problems.upsert" => Some(handle_problems_upsert(state, req)),
        "problems.get" => Some(handle_problems_get(state, req)),
        "problems.list" => Some(handle_problems_list(state, req)),
        "problems.delete" => Some(handle_problems_delete(state, req)),
        _ => None,
    }
}
