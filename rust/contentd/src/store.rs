use crate::fingerprint::Fingerprint;
use crate::fixture::{AnswerMap, Fixture, InputRecord, ResponderRecord};
use crate::problem::ProblemNode;
use crate::verdict::{ShouldBe, Verdict};
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRow {
    pub id: String,
    pub location: String,
    pub definition: ProblemNode,
    pub updated_at: Option<String>,
}

/// Inserts or replaces the definition stored at `location`; returns the row id.
pub fn upsert_problem(conn: &Connection, location: &str, definition: &ProblemNode) -> anyhow::Result<String> {
    let text = serde_json::to_string(definition).context("failed to serialize problem")?;
    let existing: Option<String> = conn
        .query_row("SELECT id FROM problems WHERE location = ?", [location], |r| {
            r.get(0)
        })
        .optional()?;
    let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());
    conn.execute(
        "INSERT INTO problems(id, location, definition, updated_at) VALUES(?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET definition = excluded.definition, updated_at = excluded.updated_at",
        (&id, location, &text, now_rfc3339()),
    )?;
    Ok(id)
}

pub fn load_problem(conn: &Connection, location: &str) -> anyhow::Result<Option<ProblemRow>> {
    let row: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT id, definition, updated_at FROM problems WHERE location = ?",
            [location],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, text, updated_at)) = row else {
        return Ok(None);
    };
    let definition: ProblemNode = serde_json::from_str(&text)
        .with_context(|| format!("stored definition for {} is invalid", location))?;
    Ok(Some(ProblemRow {
        id,
        location: location.to_string(),
        definition,
        updated_at,
    }))
}

pub fn list_problem_locations(conn: &Connection) -> anyhow::Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn.prepare("SELECT location, updated_at FROM problems ORDER BY location")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_problem(conn: &Connection, location: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM problems WHERE location = ?", [location])?;
    Ok(n > 0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTestRow {
    pub id: String,
    pub problem_location: String,
    pub should_be: ShouldBe,
    pub verdict: Verdict,
    pub answers: AnswerMap,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

pub fn insert_content_test(conn: &Connection, row: &ContentTestRow) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO content_tests(id, problem_location, should_be, verdict, answers, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &row.id,
            &row.problem_location,
            row.should_be.as_str(),
            row.verdict.as_str(),
            serde_json::to_string(&row.answers)?,
            &row.created_at,
            &row.updated_at,
        ),
    )?;
    Ok(())
}

pub fn update_content_test(conn: &Connection, row: &ContentTestRow) -> anyhow::Result<()> {
    let n = conn.execute(
        "UPDATE content_tests
         SET problem_location = ?, should_be = ?, verdict = ?, answers = ?, updated_at = ?
         WHERE id = ?",
        (
            &row.problem_location,
            row.should_be.as_str(),
            row.verdict.as_str(),
            serde_json::to_string(&row.answers)?,
            &row.updated_at,
            &row.id,
        ),
    )?;
    if n == 0 {
        return Err(anyhow!("content test {} vanished during update", row.id));
    }
    Ok(())
}

type RawTestRow = (String, String, String, String, String, Option<String>, Option<String>);

fn parse_test_row(raw: RawTestRow) -> anyhow::Result<ContentTestRow> {
    let (id, problem_location, should_be, verdict, answers, created_at, updated_at) = raw;
    Ok(ContentTestRow {
        should_be: should_be.parse().map_err(|e: String| anyhow!(e))?,
        verdict: verdict.parse().map_err(|e: String| anyhow!(e))?,
        answers: serde_json::from_str(&answers)
            .with_context(|| format!("stored answers for {} are invalid", id))?,
        id,
        problem_location,
        created_at,
        updated_at,
    })
}

const TEST_COLUMNS: &str =
    "id, problem_location, should_be, verdict, answers, created_at, updated_at";

fn read_raw(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawTestRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
    ))
}

pub fn load_content_test(conn: &Connection, id: &str) -> anyhow::Result<Option<ContentTestRow>> {
    let sql = format!("SELECT {} FROM content_tests WHERE id = ?", TEST_COLUMNS);
    let raw = conn.query_row(&sql, [id], read_raw).optional()?;
    raw.map(parse_test_row).transpose()
}

pub fn list_content_tests(
    conn: &Connection,
    problem_location: Option<&str>,
) -> anyhow::Result<Vec<ContentTestRow>> {
    let raws = match problem_location {
        Some(loc) => {
            let sql = format!(
                "SELECT {} FROM content_tests WHERE problem_location = ? ORDER BY created_at, id",
                TEST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([loc], read_raw)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "SELECT {} FROM content_tests ORDER BY created_at, id",
                TEST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], read_raw)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    raws.into_iter().map(parse_test_row).collect()
}

/// Responder and input records go with the test (ON DELETE CASCADE).
pub fn delete_content_test(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM content_tests WHERE id = ?", [id])?;
    Ok(n > 0)
}

pub fn load_fixture(conn: &Connection, test_id: &str) -> anyhow::Result<Fixture> {
    let mut resp_stmt = conn.prepare(
        "SELECT id, string_id, fingerprint
         FROM test_responses
         WHERE content_test_id = ?
         ORDER BY sort_order",
    )?;
    let mut responders = resp_stmt
        .query_map([test_id], |r| {
            Ok(ResponderRecord {
                id: r.get(0)?,
                string_id: r.get(1)?,
                fingerprint: Fingerprint::from_stored(r.get::<_, String>(2)?),
                inputs: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut input_stmt = conn.prepare(
        "SELECT id, response_id, string_id, response_index, input_index, answer
         FROM test_inputs
         WHERE content_test_id = ?
         ORDER BY response_index, input_index",
    )?;
    let inputs = input_stmt
        .query_map([test_id], |r| {
            let response_id: String = r.get(1)?;
            Ok((
                response_id,
                InputRecord {
                    id: r.get(0)?,
                    string_id: r.get(2)?,
                    response_index: r.get::<_, i64>(3)? as usize,
                    input_index: r.get::<_, i64>(4)? as usize,
                    answer: r.get(5)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_responder: HashMap<String, Vec<InputRecord>> = HashMap::new();
    for (response_id, input) in inputs {
        by_responder.entry(response_id).or_default().push(input);
    }
    for record in responders.iter_mut() {
        record.inputs = by_responder.remove(&record.id).unwrap_or_default();
    }
    Ok(Fixture { responders })
}

/// Writes every record of `fixture` in order, inserting new rows and
/// updating existing ones in place.
pub fn save_fixture(conn: &Connection, test_id: &str, fixture: &Fixture) -> anyhow::Result<()> {
    let mut resp_stmt = conn.prepare(
        "INSERT INTO test_responses(id, content_test_id, sort_order, string_id, fingerprint)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           sort_order = excluded.sort_order,
           string_id = excluded.string_id,
           fingerprint = excluded.fingerprint",
    )?;
    let mut input_stmt = conn.prepare(
        "INSERT INTO test_inputs(id, response_id, content_test_id, string_id, response_index, input_index, answer)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           string_id = excluded.string_id,
           response_index = excluded.response_index,
           input_index = excluded.input_index,
           answer = excluded.answer",
    )?;

    for (pos, record) in fixture.responders.iter().enumerate() {
        resp_stmt.execute((
            &record.id,
            test_id,
            pos as i64,
            &record.string_id,
            record.fingerprint.as_str(),
        ))?;
        for input in &record.inputs {
            input_stmt.execute((
                &input.id,
                &record.id,
                test_id,
                &input.string_id,
                input.response_index as i64,
                input.input_index as i64,
                &input.answer,
            ))?;
        }
    }
    Ok(())
}

pub fn delete_responders(conn: &Connection, records: &[ResponderRecord]) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM test_responses WHERE id = ?")?;
    let mut n = 0;
    for record in records {
        n += stmt.execute([&record.id])?;
    }
    Ok(n)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPref {
    pub username: String,
    pub token: String,
    pub enabled_at: Option<String>,
}

pub fn load_notification_pref(conn: &Connection, username: &str) -> anyhow::Result<Option<NotificationPref>> {
    let pref = conn
        .query_row(
            "SELECT token, enabled_at FROM notification_prefs WHERE username = ?",
            [username],
            |r| {
                Ok(NotificationPref {
                    username: username.to_string(),
                    token: r.get(0)?,
                    enabled_at: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(pref)
}

/// Records the token as issued to the user and stores the preference.
pub fn insert_notification_pref(conn: &Connection, pref: &NotificationPref) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO notification_tokens(token, username, issued_at) VALUES(?, ?, ?)",
        (&pref.token, &pref.username, &pref.enabled_at),
    )?;
    conn.execute(
        "INSERT INTO notification_prefs(username, token, enabled_at) VALUES(?, ?, ?)",
        (&pref.username, &pref.token, &pref.enabled_at),
    )?;
    Ok(())
}

pub fn delete_notification_pref(conn: &Connection, username: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM notification_prefs WHERE username = ?", [username])?;
    Ok(n > 0)
}

pub fn notification_token_owner(conn: &Connection, token: &str) -> anyhow::Result<Option<String>> {
    let owner = conn
        .query_row(
            "SELECT username FROM notification_tokens WHERE token = ?",
            [token],
            |r| r.get(0),
        )
        .optional()?;
    Ok(owner)
}

#[cfg(test)]
pub fn count_fixture_rows(conn: &Connection, test_id: &str) -> anyhow::Result<(i64, i64)> {
    let responses: i64 = conn.query_row(
        "SELECT COUNT(*) FROM test_responses WHERE content_test_id = ?",
        [test_id],
        |r| r.get(0),
    )?;
    let inputs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM test_inputs WHERE content_test_id = ?",
        [test_id],
        |r| r.get(0),
    )?;
    Ok((responses, inputs))
}
