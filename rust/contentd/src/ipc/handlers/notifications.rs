use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::notifications::{self, NotificationError};
use rusqlite::Connection;
use serde_json::json;

fn notification_err(code: &'static str) -> impl Fn(NotificationError) -> HandlerErr {
    move |e| match e {
        NotificationError::Anonymous => HandlerErr::new("permission_denied", e.to_string()),
        NotificationError::UnknownToken => HandlerErr::new("not_found", e.to_string()),
        NotificationError::Sql(_) | NotificationError::Storage(_) => HandlerErr::new(code, e.to_string()),
    }
}

fn notifications_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let pref = notifications::status(conn, &username).map_err(notification_err("db_query_failed"))?;
    Ok(json!({ "enabled": pref.is_some(), "preference": pref }))
}

fn notifications_enable(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let pref = notifications::enable(conn, &username).map_err(notification_err("db_update_failed"))?;
    Ok(json!({ "enabled": true, "preference": pref }))
}

fn notifications_disable(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let removed =
        notifications::disable(conn, &username).map_err(notification_err("db_delete_failed"))?;
    Ok(json!({ "enabled": false, "removed": removed }))
}

fn notifications_unsubscribe(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = get_required_str(params, "token")?;
    let username =
        notifications::unsubscribe(conn, &token).map_err(notification_err("db_delete_failed"))?;
    Ok(json!({ "username": username, "enabled": false }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "notifications.status" => notifications_status,
            "notifications.enable" => notifications_enable,
            "notifications.disable" => notifications_disable,
            "notifications.unsubscribe" => notifications_unsubscribe,
            _ => return None,
        };
    Some(dispatch(state, req, f))
}
