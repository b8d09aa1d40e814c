use agenthub_types::Session;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::records::{parse_ts, parse_ts_opt, parse_uuid_opt, ts};
use crate::Result;

/// Inserts a new session. Returns false when the id already exists (the
/// caller surfaces that as a conflict).
pub fn insert(
    conn: &Connection,
    id: &str,
    project_id: Option<&Uuid>,
    started_at: DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        r#"
        INSERT OR IGNORE INTO sessions (id, project_id, started_at)
        VALUES (?1, ?2, ?3)
        "#,
        params![id, project_id.map(Uuid::to_string), ts(started_at)],
    )?;
    Ok(changed > 0)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>> {
    let row = conn
        .query_row(
            r#"
        SELECT id, project_id, started_at, ended_at, tool_count, success_count, error_count
        FROM sessions
        WHERE id = ?1
        "#,
            [id],
            read_row,
        )
        .optional()?;
    row.map(Row::into_session).transpose()
}

pub fn list(
    conn: &Connection,
    project_id: Option<&Uuid>,
    active_only: bool,
    limit: usize,
) -> Result<Vec<Session>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(pid) = project_id {
        where_clauses.push("project_id = ?");
        params.push(Box::new(pid.to_string()));
    }
    if active_only {
        where_clauses.push("ended_at IS NULL");
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let query = format!(
        r#"
        SELECT id, project_id, started_at, ended_at, tool_count, success_count, error_count
        FROM sessions
        {}
        ORDER BY started_at DESC
        LIMIT {}
        "#,
        where_clause, limit
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_session).collect()
}

/// Stamps ended_at once; later calls are no-ops.
pub fn end(conn: &Connection, id: &str, when: DateTime<Utc>) -> Result<Option<Session>> {
    conn.execute(
        "UPDATE sessions SET ended_at = COALESCE(ended_at, ?2) WHERE id = ?1",
        params![id, ts(when)],
    )?;
    get(conn, id)
}

/// Bumps the per-session tool counters for one recorded tool call.
pub fn record_tool(conn: &Connection, id: &str, success: bool) -> Result<Option<Session>> {
    conn.execute(
        r#"
        UPDATE sessions SET
            tool_count = tool_count + 1,
            success_count = success_count + (CASE WHEN ?2 THEN 1 ELSE 0 END),
            error_count = error_count + (CASE WHEN ?2 THEN 0 ELSE 1 END)
        WHERE id = ?1
        "#,
        params![id, success],
    )?;
    get(conn, id)
}

/// Last activity per active session: the newest action under the session's
/// requests, falling back to the session start.
pub fn active_with_last_activity(
    conn: &Connection,
) -> Result<Vec<(Session, DateTime<Utc>)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT s.id, s.project_id, s.started_at, s.ended_at,
               s.tool_count, s.success_count, s.error_count,
               COALESCE((
                   SELECT MAX(a.created_at)
                   FROM requests r
                   JOIN task_lists tl ON tl.request_id = r.id
                   JOIN subtasks st ON st.task_list_id = tl.id
                   JOIN actions a ON a.subtask_id = st.id
                   WHERE r.session_id = s.id
               ), s.started_at) AS last_activity
        FROM sessions s
        WHERE s.ended_at IS NULL
        ORDER BY last_activity DESC
        "#,
    )?;
    let rows = stmt
        .query_map([], |row| Ok((read_row(row)?, row.get::<_, String>(7)?)))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter()
        .map(|(row, activity)| Ok((row.into_session()?, parse_ts(&activity)?)))
        .collect()
}

/// Closes every active session whose last activity predates `cutoff`.
/// Returns the ids that were closed.
pub fn end_stale(
    conn: &Connection,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        UPDATE sessions SET ended_at = ?2
        WHERE ended_at IS NULL
          AND COALESCE((
              SELECT MAX(a.created_at)
              FROM requests r
              JOIN task_lists tl ON tl.request_id = r.id
              JOIN subtasks st ON st.task_list_id = tl.id
              JOIN actions a ON a.subtask_id = st.id
              WHERE r.session_id = sessions.id
          ), started_at) < ?1
        RETURNING id
        "#,
    )?;
    let ids = stmt
        .query_map(params![ts(cutoff), ts(now)], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(ids)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStats {
    pub total: i64,
    pub active: i64,
    pub ended: i64,
    pub tool_count: i64,
    pub success_count: i64,
    pub error_count: i64,
}

pub fn stats(conn: &Connection) -> Result<SessionStats> {
    conn.query_row(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE ended_at IS NULL),
               COUNT(*) FILTER (WHERE ended_at IS NOT NULL),
               COALESCE(SUM(tool_count), 0),
               COALESCE(SUM(success_count), 0),
               COALESCE(SUM(error_count), 0)
        FROM sessions
        "#,
        [],
        |row| {
            Ok(SessionStats {
                total: row.get(0)?,
                active: row.get(1)?,
                ended: row.get(2)?,
                tool_count: row.get(3)?,
                success_count: row.get(4)?,
                error_count: row.get(5)?,
            })
        },
    )
    .map_err(Into::into)
}

struct Row {
    id: String,
    project_id: Option<String>,
    started_at: String,
    ended_at: Option<String>,
    tool_count: i64,
    success_count: i64,
    error_count: i64,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        project_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        tool_count: row.get(4)?,
        success_count: row.get(5)?,
        error_count: row.get(6)?,
    })
}

impl Row {
    fn into_session(self) -> Result<Session> {
        Ok(Session {
            id: self.id,
            project_id: parse_uuid_opt(self.project_id)?,
            started_at: parse_ts(&self.started_at)?,
            ended_at: parse_ts_opt(self.ended_at)?,
            tool_count: self.tool_count,
            success_count: self.success_count,
            error_count: self.error_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn duplicate_insert_reports_conflict() {
        let conn = setup();
        assert!(insert(&conn, "s1", None, Utc::now()).unwrap());
        assert!(!insert(&conn, "s1", None, Utc::now()).unwrap());
    }

    #[test]
    fn end_is_idempotent() {
        let conn = setup();
        insert(&conn, "s1", None, Utc::now()).unwrap();
        let first_end = Utc::now();
        let ended = end(&conn, "s1", first_end).unwrap().unwrap();
        let again = end(&conn, "s1", first_end + chrono::Duration::minutes(5))
            .unwrap()
            .unwrap();
        assert_eq!(ended.ended_at, again.ended_at);
        assert!(!again.is_active());
    }

    #[test]
    fn tool_counters_accumulate() {
        let conn = setup();
        insert(&conn, "s1", None, Utc::now()).unwrap();
        record_tool(&conn, "s1", true).unwrap();
        record_tool(&conn, "s1", true).unwrap();
        let session = record_tool(&conn, "s1", false).unwrap().unwrap();
        assert_eq!(session.tool_count, 3);
        assert_eq!(session.success_count, 2);
        assert_eq!(session.error_count, 1);
    }

    #[test]
    fn stale_sessions_are_closed_by_cutoff() {
        let conn = setup();
        let old_start = Utc::now() - chrono::Duration::hours(2);
        insert(&conn, "old", None, old_start).unwrap();
        insert(&conn, "fresh", None, Utc::now()).unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(30);
        let closed = end_stale(&conn, cutoff, Utc::now()).unwrap();
        assert_eq!(closed, vec!["old".to_string()]);
        assert!(get(&conn, "fresh").unwrap().unwrap().is_active());
    }
}
