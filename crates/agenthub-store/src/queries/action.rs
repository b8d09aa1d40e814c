use agenthub_types::{ActionRecord, ToolType};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::blob;
use crate::records::{
    json_text, parse_enum, parse_json, parse_string_vec, parse_ts, parse_uuid, parse_uuid_opt,
    string_vec_text, ts,
};
use crate::Result;

pub struct NewAction<'a> {
    pub subtask_id: Option<&'a Uuid>,
    pub tool_name: &'a str,
    pub tool_type: ToolType,
    pub input: Option<&'a str>,
    pub output: Option<&'a str>,
    pub file_paths: &'a [String],
    pub exit_code: i64,
    pub duration_ms: i64,
    pub metadata: Option<&'a Value>,
}

pub fn insert(conn: &Connection, new: &NewAction, now: DateTime<Utc>) -> Result<ActionRecord> {
    let id = Uuid::new_v4();
    conn.execute(
        r#"
        INSERT INTO actions
            (id, subtask_id, tool_name, tool_type, input, output, file_paths,
             exit_code, duration_ms, created_at, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, COALESCE(?11, '{}'))
        "#,
        params![
            id.to_string(),
            new.subtask_id.map(Uuid::to_string),
            new.tool_name,
            new.tool_type.as_str(),
            blob::compress_opt(new.input)?,
            blob::compress_opt(new.output)?,
            string_vec_text(new.file_paths),
            new.exit_code,
            new.duration_ms,
            ts(now),
            new.metadata.map(json_text),
        ],
    )?;
    Ok(ActionRecord {
        id,
        subtask_id: new.subtask_id.copied(),
        tool_name: new.tool_name.to_string(),
        tool_type: new.tool_type,
        input: new.input.filter(|s| !s.is_empty()).map(str::to_string),
        output: new.output.filter(|s| !s.is_empty()).map(str::to_string),
        file_paths: new.file_paths.to_vec(),
        exit_code: new.exit_code,
        duration_ms: new.duration_ms,
        created_at: now,
        metadata: new.metadata.cloned().unwrap_or_else(|| serde_json::json!({})),
    })
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<ActionRecord>> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT),
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_action).transpose()
}

pub fn list(
    conn: &Connection,
    subtask_id: Option<&Uuid>,
    tool_type: Option<ToolType>,
    limit: usize,
) -> Result<Vec<ActionRecord>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(sid) = subtask_id {
        where_clauses.push("subtask_id = ?");
        params.push(Box::new(sid.to_string()));
    }
    if let Some(tt) = tool_type {
        where_clauses.push("tool_type = ?");
        params.push(Box::new(tt.as_str().to_string()));
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let query = format!(
        "{} {} ORDER BY created_at DESC LIMIT {}",
        SELECT, where_clause, limit
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_action).collect()
}

/// Actions performed by or for an agent: linked through subtasks matching
/// the agent category or instance name. Newest first.
pub fn recent_for_agent(
    conn: &Connection,
    agent_type: &str,
    agent_name: Option<&str>,
    limit: usize,
) -> Result<Vec<ActionRecord>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        {} WHERE subtask_id IN (
            SELECT id FROM subtasks
            WHERE agent_type = ?1 OR (?2 IS NOT NULL AND agent_name = ?2)
        )
        ORDER BY created_at DESC LIMIT ?3
        "#,
        SELECT
    ))?;
    let rows = stmt
        .query_map(params![agent_type, agent_name, limit as i64], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_action).collect()
}

pub fn recent_for_session(
    conn: &Connection,
    session_id: &str,
    limit: usize,
) -> Result<Vec<ActionRecord>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        {} WHERE subtask_id IN (
            SELECT st.id
            FROM subtasks st
            JOIN task_lists tl ON tl.id = st.task_list_id
            JOIN requests r ON r.id = tl.request_id
            WHERE r.session_id = ?1
        )
        ORDER BY created_at DESC LIMIT ?2
        "#,
        SELECT
    ))?;
    let rows = stmt
        .query_map(params![session_id, limit as i64], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_action).collect()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HourlyBucket {
    /// Hour in `YYYY-MM-DDTHH` UTC
    pub hour: String,
    pub total: i64,
    pub errors: i64,
}

/// Per-hour action counts over the trailing window.
pub fn hourly(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<HourlyBucket>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT substr(created_at, 1, 13) AS hour,
               COUNT(*),
               COUNT(*) FILTER (WHERE exit_code != 0)
        FROM actions
        WHERE created_at >= ?1
        GROUP BY hour
        ORDER BY hour ASC
        "#,
    )?;
    let rows = stmt
        .query_map([ts(since)], |row| {
            Ok(HourlyBucket {
                hour: row.get(0)?,
                total: row.get(1)?,
                errors: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSummary {
    pub tool_name: String,
    pub tool_type: String,
    pub uses: i64,
    pub successes: i64,
    pub avg_duration_ms: f64,
}

pub fn tools_summary(conn: &Connection) -> Result<Vec<ToolSummary>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT tool_name, tool_type, COUNT(*),
               COUNT(*) FILTER (WHERE exit_code = 0),
               COALESCE(AVG(duration_ms), 0)
        FROM actions
        GROUP BY tool_name, tool_type
        ORDER BY COUNT(*) DESC
        "#,
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ToolSummary {
                tool_name: row.get(0)?,
                tool_type: row.get(1)?,
                uses: row.get(2)?,
                successes: row.get(3)?,
                avg_duration_ms: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn count_since(conn: &Connection, since: DateTime<Utc>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM actions WHERE created_at >= ?1",
        [ts(since)],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

const SELECT: &str = r#"
    SELECT id, subtask_id, tool_name, tool_type, input, output, file_paths,
           exit_code, duration_ms, created_at, metadata
    FROM actions
"#;

struct Row {
    id: String,
    subtask_id: Option<String>,
    tool_name: String,
    tool_type: String,
    input: Option<Vec<u8>>,
    output: Option<Vec<u8>>,
    file_paths: String,
    exit_code: i64,
    duration_ms: i64,
    created_at: String,
    metadata: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        subtask_id: row.get(1)?,
        tool_name: row.get(2)?,
        tool_type: row.get(3)?,
        input: row.get(4)?,
        output: row.get(5)?,
        file_paths: row.get(6)?,
        exit_code: row.get(7)?,
        duration_ms: row.get(8)?,
        created_at: row.get(9)?,
        metadata: row.get(10)?,
    })
}

impl Row {
    fn into_action(self) -> Result<ActionRecord> {
        Ok(ActionRecord {
            id: parse_uuid(&self.id)?,
            subtask_id: parse_uuid_opt(self.subtask_id)?,
            tool_name: self.tool_name,
            tool_type: parse_enum(&self.tool_type)?,
            input: blob::decompress_opt(self.input.as_deref())?,
            output: blob::decompress_opt(self.output.as_deref())?,
            file_paths: parse_string_vec(&self.file_paths)?,
            exit_code: self.exit_code,
            duration_ms: self.duration_ms,
            created_at: parse_ts(&self.created_at)?,
            metadata: parse_json(&self.metadata)?,
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

    fn record(conn: &Connection, tool: &str, exit: i64, when: DateTime<Utc>) -> ActionRecord {
        insert(
            conn,
            &NewAction {
                subtask_id: None,
                tool_name: tool,
                tool_type: ToolType::Builtin,
                input: Some("{\"file_path\": \"src/main.rs\"}"),
                output: Some("ok"),
                file_paths: &["src/main.rs".to_string()],
                exit_code: exit,
                duration_ms: 150,
                metadata: None,
            },
            when,
        )
        .unwrap()
    }

    #[test]
    fn blobs_round_trip_through_compression() {
        let conn = setup();
        let action = record(&conn, "Edit", 0, Utc::now());

        // the stored column must not be the raw text
        let raw: Vec<u8> = conn
            .query_row(
                "SELECT input FROM actions WHERE id = ?1",
                [action.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(raw, b"{\"file_path\": \"src/main.rs\"}");

        let loaded = get(&conn, &action.id).unwrap().unwrap();
        assert_eq!(loaded.input.as_deref(), Some("{\"file_path\": \"src/main.rs\"}"));
        assert_eq!(loaded.output.as_deref(), Some("ok"));
        assert!(loaded.is_success());
    }

    #[test]
    fn list_orders_newest_first() {
        let conn = setup();
        let early = Utc::now() - chrono::Duration::minutes(5);
        record(&conn, "Read", 0, early);
        let newest = record(&conn, "Edit", 0, Utc::now());
        let listed = list(&conn, None, None, 5).unwrap();
        assert_eq!(listed[0].id, newest.id);
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn hourly_buckets_count_errors() {
        let conn = setup();
        let now = Utc::now();
        record(&conn, "Bash", 0, now);
        record(&conn, "Bash", 1, now);
        let buckets = hourly(&conn, now - chrono::Duration::hours(24)).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total, 2);
        assert_eq!(buckets[0].errors, 1);
    }

    #[test]
    fn tools_summary_aggregates() {
        let conn = setup();
        record(&conn, "Edit", 0, Utc::now());
        record(&conn, "Edit", 0, Utc::now());
        record(&conn, "Bash", 1, Utc::now());
        let summary = tools_summary(&conn).unwrap();
        assert_eq!(summary[0].tool_name, "Edit");
        assert_eq!(summary[0].uses, 2);
        assert_eq!(summary[0].successes, 2);
    }
}
