//! Email notification preference per user, with an opaque token that lets a
//! mail recipient unsubscribe without signing in.

use crate::store::{self, NotificationPref};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification preferences need a signed-in user")]
    Anonymous,
    #[error("unknown unsubscribe token")]
    UnknownToken,
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NotificationError>;

fn signed_in(username: &str) -> Result<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(NotificationError::Anonymous);
    }
    Ok(username)
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn status(conn: &Connection, username: &str) -> Result<Option<NotificationPref>> {
    let username = signed_in(username)?;
    Ok(store::load_notification_pref(conn, username)?)
}

/// Turns notifications on. An existing preference is returned untouched.
pub fn enable(conn: &Connection, username: &str) -> Result<NotificationPref> {
    let username = signed_in(username)?;
    let tx = conn.unchecked_transaction()?;
    if let Some(existing) = store::load_notification_pref(&tx, username)? {
        return Ok(existing);
    }
    let pref = NotificationPref {
        username: username.to_string(),
        token: new_token(),
        enabled_at: Some(store::now_rfc3339()),
    };
    store::insert_notification_pref(&tx, &pref)?;
    tx.commit()?;
    tracing::info!(username = %username, "notifications enabled");
    Ok(pref)
}

/// Turns notifications off. Returns whether a preference was removed.
pub fn disable(conn: &Connection, username: &str) -> Result<bool> {
    let username = signed_in(username)?;
    let removed = store::delete_notification_pref(conn, username)?;
    if removed {
        tracing::info!(username = %username, "notifications disabled");
    }
    Ok(removed)
}

/// Removes the preference of the token's owner and returns the owner. A token
/// keeps working after its preference is gone.
pub fn unsubscribe(conn: &Connection, token: &str) -> Result<String> {
    let Some(username) = store::notification_token_owner(conn, token.trim())? else {
        return Err(NotificationError::UnknownToken);
    };
    let removed = store::delete_notification_pref(conn, &username)?;
    tracing::info!(username = %username, removed, "unsubscribed by token");
    Ok(username)
}
