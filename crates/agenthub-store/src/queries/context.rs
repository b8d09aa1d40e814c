use agenthub_types::{AgentContext, COMPACT_SNAPSHOT_TYPE};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::records::{
    json_text, parse_json, parse_string_vec, parse_ts, parse_uuid, parse_uuid_opt, string_vec_text,
    ts,
};
use crate::Result;

pub struct ContextUpsert<'a> {
    pub project_id: Option<&'a Uuid>,
    pub agent_id: &'a str,
    pub agent_type: &'a str,
    pub role_context: Option<&'a Value>,
    pub skills: Option<&'a [String]>,
    pub tools_used: Option<&'a [String]>,
    pub progress_summary: Option<&'a str>,
}

/// Upsert keyed on (project, agent). SQLite treats NULLs as distinct in
/// unique indexes, so project-less rows are matched manually; the API is the
/// single writer, which keeps the select-then-write race-free.
pub fn upsert(conn: &Connection, up: &ContextUpsert, now: DateTime<Utc>) -> Result<AgentContext> {
    let existing = get_for_project_agent(conn, up.project_id, up.agent_id)?;

    match existing {
        Some(current) => {
            conn.execute(
                r#"
                UPDATE agent_contexts SET
                    agent_type = ?2,
                    role_context = COALESCE(?3, role_context),
                    skills = COALESCE(?4, skills),
                    tools_used = COALESCE(?5, tools_used),
                    progress_summary = COALESCE(?6, progress_summary),
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    current.id.to_string(),
                    up.agent_type,
                    up.role_context.map(json_text),
                    up.skills.map(string_vec_text),
                    up.tools_used.map(string_vec_text),
                    up.progress_summary,
                    ts(now),
                ],
            )?;
            get(conn, &current.id)?.ok_or_else(|| {
                crate::Error::Corrupt(format!("agent context vanished: {}", current.id))
            })
        }
        None => {
            let id = Uuid::new_v4();
            conn.execute(
                r#"
                INSERT INTO agent_contexts
                    (id, project_id, agent_id, agent_type, role_context, skills, tools_used, progress_summary, updated_at)
                VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 'null'), COALESCE(?6, '[]'), COALESCE(?7, '[]'), ?8, ?9)
                "#,
                params![
                    id.to_string(),
                    up.project_id.map(Uuid::to_string),
                    up.agent_id,
                    up.agent_type,
                    up.role_context.map(json_text),
                    up.skills.map(string_vec_text),
                    up.tools_used.map(string_vec_text),
                    up.progress_summary,
                    ts(now),
                ],
            )?;
            get(conn, &id)?
                .ok_or_else(|| crate::Error::Corrupt(format!("agent context vanished: {}", id)))
        }
    }
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<AgentContext>> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT),
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_context).transpose()
}

pub fn get_for_project_agent(
    conn: &Connection,
    project_id: Option<&Uuid>,
    agent_id: &str,
) -> Result<Option<AgentContext>> {
    let row = conn
        .query_row(
            &format!(
                "{} WHERE agent_id = ?1 AND (project_id = ?2 OR (?2 IS NULL AND project_id IS NULL))",
                SELECT
            ),
            params![agent_id, project_id.map(Uuid::to_string)],
            read_row,
        )
        .optional()?;
    row.map(Row::into_context).transpose()
}

/// Most recently updated context for an agent across projects.
pub fn latest_for_agent(conn: &Connection, agent_id: &str) -> Result<Option<AgentContext>> {
    let row = conn
        .query_row(
            &format!(
                "{} WHERE agent_id = ?1 ORDER BY updated_at DESC LIMIT 1",
                SELECT
            ),
            [agent_id],
            read_row,
        )
        .optional()?;
    row.map(Row::into_context).transpose()
}

/// Live (non-snapshot) agent states under a project.
pub fn agent_states_for_project(conn: &Connection, project_id: &Uuid) -> Result<Vec<AgentContext>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE project_id = ?1 AND agent_type != ?2 ORDER BY updated_at DESC",
        SELECT
    ))?;
    let rows = stmt
        .query_map(
            params![project_id.to_string(), COMPACT_SNAPSHOT_TYPE],
            read_row,
        )?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_context).collect()
}

/// Latest full-session compact snapshot (agent_id holds the session id).
pub fn latest_snapshot(conn: &Connection, session_id: &str) -> Result<Option<AgentContext>> {
    let row = conn
        .query_row(
            &format!(
                "{} WHERE agent_id = ?1 AND agent_type = ?2 ORDER BY updated_at DESC LIMIT 1",
                SELECT
            ),
            params![session_id, COMPACT_SNAPSHOT_TYPE],
            read_row,
        )
        .optional()?;
    row.map(Row::into_context).transpose()
}

pub fn delete_snapshots_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM agent_contexts WHERE agent_type = ?1 AND updated_at < ?2",
        params![COMPACT_SNAPSHOT_TYPE, ts(cutoff)],
    )?;
    Ok(deleted)
}

pub fn count_snapshots_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM agent_contexts WHERE agent_type = ?1 AND updated_at < ?2",
        params![COMPACT_SNAPSHOT_TYPE, ts(cutoff)],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

const SELECT: &str = r#"
    SELECT id, project_id, agent_id, agent_type, role_context, skills, tools_used,
           progress_summary, updated_at
    FROM agent_contexts
"#;

struct Row {
    id: String,
    project_id: Option<String>,
    agent_id: String,
    agent_type: String,
    role_context: String,
    skills: String,
    tools_used: String,
    progress_summary: Option<String>,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        project_id: row.get(1)?,
        agent_id: row.get(2)?,
        agent_type: row.get(3)?,
        role_context: row.get(4)?,
        skills: row.get(5)?,
        tools_used: row.get(6)?,
        progress_summary: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl Row {
    fn into_context(self) -> Result<AgentContext> {
        Ok(AgentContext {
            id: parse_uuid(&self.id)?,
            project_id: parse_uuid_opt(self.project_id)?,
            agent_id: self.agent_id,
            agent_type: self.agent_type,
            role_context: parse_json(&self.role_context)?,
            skills: parse_string_vec(&self.skills)?,
            tools_used: parse_string_vec(&self.tools_used)?,
            progress_summary: self.progress_summary,
            updated_at: parse_ts(&self.updated_at)?,
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

    fn up<'a>(project_id: Option<&'a Uuid>, agent_id: &'a str, agent_type: &'a str) -> ContextUpsert<'a> {
        ContextUpsert {
            project_id,
            agent_id,
            agent_type,
            role_context: None,
            skills: None,
            tools_used: None,
            progress_summary: None,
        }
    }

    #[test]
    fn upsert_is_unique_per_project_agent() {
        let (conn, pid) = setup();
        let first = upsert(&conn, &up(Some(&pid), "backend", "developer"), Utc::now()).unwrap();
        let second = upsert(
            &conn,
            &ContextUpsert {
                progress_summary: Some("wired the session routes"),
                ..up(Some(&pid), "backend", "developer")
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.progress_summary.as_deref(), Some("wired the session routes"));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM agent_contexts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn project_less_rows_are_also_unique() {
        let (conn, _) = setup();
        let first = upsert(&conn, &up(None, "roamer", "specialist"), Utc::now()).unwrap();
        let second = upsert(&conn, &up(None, "roamer", "specialist"), Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn snapshots_are_separate_from_live_state() {
        let (conn, pid) = setup();
        upsert(&conn, &up(Some(&pid), "backend", "developer"), Utc::now()).unwrap();
        upsert(&conn, &up(Some(&pid), "s1", COMPACT_SNAPSHOT_TYPE), Utc::now()).unwrap();

        assert_eq!(agent_states_for_project(&conn, &pid).unwrap().len(), 1);
        assert!(latest_snapshot(&conn, "s1").unwrap().is_some());
        assert!(latest_snapshot(&conn, "backend").unwrap().is_none());
    }

    #[test]
    fn old_snapshots_age_out() {
        let (conn, pid) = setup();
        let old = Utc::now() - chrono::Duration::hours(48);
        upsert(&conn, &up(Some(&pid), "s1", COMPACT_SNAPSHOT_TYPE), old).unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        assert_eq!(count_snapshots_older_than(&conn, cutoff).unwrap(), 1);
        assert_eq!(delete_snapshots_older_than(&conn, cutoff).unwrap(), 1);
        assert!(latest_snapshot(&conn, "s1").unwrap().is_none());
    }
}
