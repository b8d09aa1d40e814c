use agenthub_types::{PromptType, Request, RequestStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::records::{json_text, parse_enum, parse_json, parse_ts, parse_ts_opt, parse_uuid, ts};
use crate::Result;

pub struct NewRequest<'a> {
    pub project_id: &'a Uuid,
    pub session_id: &'a str,
    pub prompt: &'a str,
    pub prompt_type: PromptType,
    pub metadata: Option<&'a Value>,
}

pub fn insert(conn: &Connection, new: &NewRequest, now: DateTime<Utc>) -> Result<Request> {
    let id = Uuid::new_v4();
    conn.execute(
        r#"
        INSERT INTO requests (id, project_id, session_id, prompt, prompt_type, status, created_at, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, COALESCE(?7, '{}'))
        "#,
        params![
            id.to_string(),
            new.project_id.to_string(),
            new.session_id,
            new.prompt,
            new.prompt_type.as_str(),
            ts(now),
            new.metadata.map(json_text),
        ],
    )?;
    Ok(Request {
        id,
        project_id: *new.project_id,
        session_id: new.session_id.to_string(),
        prompt: new.prompt.to_string(),
        prompt_type: new.prompt_type,
        status: RequestStatus::Active,
        created_at: now,
        completed_at: None,
        metadata: new.metadata.cloned().unwrap_or_else(|| serde_json::json!({})),
    })
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<Request>> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT),
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_request).transpose()
}

pub fn list(
    conn: &Connection,
    project_id: Option<&Uuid>,
    session_id: Option<&str>,
    status: Option<RequestStatus>,
    limit: usize,
) -> Result<Vec<Request>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(pid) = project_id {
        where_clauses.push("project_id = ?");
        params.push(Box::new(pid.to_string()));
    }
    if let Some(sid) = session_id {
        where_clauses.push("session_id = ?");
        params.push(Box::new(sid.to_string()));
    }
    if let Some(st) = status {
        where_clauses.push("status = ?");
        params.push(Box::new(st.as_str().to_string()));
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let query = format!("{} {} ORDER BY created_at DESC LIMIT {}", SELECT, where_clause, limit);

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_request).collect()
}

pub fn list_for_project(conn: &Connection, project_id: &Uuid) -> Result<Vec<Request>> {
    list(conn, Some(project_id), None, None, 10_000)
}

pub fn latest_for_session(conn: &Connection, session_id: &str) -> Result<Option<Request>> {
    let row = conn
        .query_row(
            &format!(
                "{} WHERE session_id = ?1 ORDER BY created_at DESC LIMIT 1",
                SELECT
            ),
            [session_id],
            read_row,
        )
        .optional()?;
    row.map(Row::into_request).transpose()
}

/// Transition to completed; completed_at is stamped on the first call only.
pub fn complete(conn: &Connection, id: &Uuid, when: DateTime<Utc>) -> Result<Option<Request>> {
    conn.execute(
        r#"
        UPDATE requests SET
            status = 'completed',
            completed_at = COALESCE(completed_at, ?2)
        WHERE id = ?1
        "#,
        params![id.to_string(), ts(when)],
    )?;
    get(conn, id)
}

/// Merge one key into the request's metadata bag.
pub fn set_metadata_key(
    conn: &Connection,
    id: &Uuid,
    key: &str,
    value: &Value,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE requests SET metadata = json_set(metadata, '$.' || ?2, json(?3)) WHERE id = ?1",
        params![id.to_string(), key, json_text(value)],
    )?;
    Ok(changed)
}

const SELECT: &str = r#"
    SELECT id, project_id, session_id, prompt, prompt_type, status, created_at, completed_at, metadata
    FROM requests
"#;

struct Row {
    id: String,
    project_id: String,
    session_id: String,
    prompt: String,
    prompt_type: String,
    status: String,
    created_at: String,
    completed_at: Option<String>,
    metadata: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        prompt: row.get(3)?,
        prompt_type: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        completed_at: row.get(7)?,
        metadata: row.get(8)?,
    })
}

impl Row {
    fn into_request(self) -> Result<Request> {
        Ok(Request {
            id: parse_uuid(&self.id)?,
            project_id: parse_uuid(&self.project_id)?,
            session_id: self.session_id,
            prompt: self.prompt,
            prompt_type: parse_enum(&self.prompt_type)?,
            status: parse_enum(&self.status)?,
            created_at: parse_ts(&self.created_at)?,
            completed_at: parse_ts_opt(self.completed_at)?,
            metadata: parse_json(&self.metadata)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::project;
    use crate::schema::init_schema;

    fn setup() -> (Connection, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let proj = project::upsert_by_path(&conn, "/tmp/p1", None, None, Utc::now()).unwrap();
        (conn, proj.id)
    }

    fn new_request<'a>(project_id: &'a Uuid) -> NewRequest<'a> {
        NewRequest {
            project_id,
            session_id: "s1",
            prompt: "Add OAuth",
            prompt_type: PromptType::Feature,
            metadata: None,
        }
    }

    #[test]
    fn complete_stamps_once() {
        let (conn, pid) = setup();
        let req = insert(&conn, &new_request(&pid), Utc::now()).unwrap();

        let first = complete(&conn, &req.id, Utc::now()).unwrap().unwrap();
        let stamped = first.completed_at.unwrap();

        let second = complete(&conn, &req.id, Utc::now() + chrono::Duration::minutes(1))
            .unwrap()
            .unwrap();
        assert_eq!(second.completed_at.unwrap(), stamped);
        assert_eq!(second.status, RequestStatus::Completed);
    }

    #[test]
    fn latest_for_session_orders_by_creation() {
        let (conn, pid) = setup();
        let early = Utc::now() - chrono::Duration::minutes(10);
        insert(&conn, &new_request(&pid), early).unwrap();
        let newest = insert(&conn, &new_request(&pid), Utc::now()).unwrap();
        let latest = latest_for_session(&conn, "s1").unwrap().unwrap();
        assert_eq!(latest.id, newest.id);
    }

    #[test]
    fn metadata_key_merge_keeps_existing() {
        let (conn, pid) = setup();
        let meta = serde_json::json!({"origin": "hook"});
        let req = insert(
            &conn,
            &NewRequest {
                metadata: Some(&meta),
                ..new_request(&pid)
            },
            Utc::now(),
        )
        .unwrap();

        set_metadata_key(&conn, &req.id, "last_snapshot_at", &serde_json::json!("2026-02-01"))
            .unwrap();
        let updated = get(&conn, &req.id).unwrap().unwrap();
        assert_eq!(updated.metadata["origin"], "hook");
        assert_eq!(updated.metadata["last_snapshot_at"], "2026-02-01");
    }

    #[test]
    fn cascade_from_project_removes_requests() {
        let (conn, pid) = setup();
        insert(&conn, &new_request(&pid), Utc::now()).unwrap();
        conn.execute("DELETE FROM projects WHERE id = ?1", [pid.to_string()])
            .unwrap();
        assert!(list(&conn, None, None, None, 10).unwrap().is_empty());
    }
}
