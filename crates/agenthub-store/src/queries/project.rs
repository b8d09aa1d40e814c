use agenthub_types::Project;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::records::{json_text, parse_json, parse_ts, parse_uuid, ts};
use crate::{Error, Result};

/// Upsert by path: creates the project on first reference, otherwise updates
/// name/metadata when provided. Returns the canonical row either way.
pub fn upsert_by_path(
    conn: &Connection,
    path: &str,
    name: Option<&str>,
    metadata: Option<&Value>,
    now: DateTime<Utc>,
) -> Result<Project> {
    let derived_name = name
        .map(str::to_string)
        .unwrap_or_else(|| default_name(path));
    let metadata_text = metadata.map(json_text);

    conn.execute(
        r#"
        INSERT INTO projects (id, path, name, created_at, updated_at, metadata)
        VALUES (?1, ?2, ?3, ?4, ?4, COALESCE(?5, '{}'))
        ON CONFLICT(path) DO UPDATE SET
            name = COALESCE(?6, projects.name),
            metadata = COALESCE(?5, projects.metadata)
        "#,
        params![
            Uuid::new_v4().to_string(),
            path,
            derived_name,
            ts(now),
            metadata_text,
            name,
        ],
    )?;

    get_by_path(conn, path)?.ok_or_else(|| Error::Corrupt(format!("project vanished after upsert: {}", path)))
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<Project>> {
    let row = conn
        .query_row(
            r#"
        SELECT id, path, name, created_at, updated_at, metadata
        FROM projects
        WHERE id = ?1
        "#,
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_project).transpose()
}

pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<Project>> {
    let row = conn
        .query_row(
            r#"
        SELECT id, path, name, created_at, updated_at, metadata
        FROM projects
        WHERE path = ?1
        "#,
            [path],
            read_row,
        )
        .optional()?;
    row.map(Row::into_project).transpose()
}

pub fn list(conn: &Connection, limit: usize) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, path, name, created_at, updated_at, metadata
        FROM projects
        ORDER BY updated_at DESC
        LIMIT ?1
        "#,
    )?;
    let rows = stmt
        .query_map([limit as i64], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_project).collect()
}

fn default_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}

struct Row {
    id: String,
    path: String,
    name: String,
    created_at: String,
    updated_at: String,
    metadata: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        metadata: row.get(5)?,
    })
}

impl Row {
    fn into_project(self) -> Result<Project> {
        Ok(Project {
            id: parse_uuid(&self.id)?,
            path: self.path,
            name: self.name,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
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

    #[test]
    fn upsert_is_idempotent_on_path() {
        let conn = setup();
        let now = Utc::now();
        let first = upsert_by_path(&conn, "/tmp/p1", None, None, now).unwrap();
        let second = upsert_by_path(&conn, "/tmp/p1", None, None, now).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "p1");
    }

    #[test]
    fn upsert_updates_name_when_given() {
        let conn = setup();
        let now = Utc::now();
        let created = upsert_by_path(&conn, "/tmp/p1", None, None, now).unwrap();
        let renamed = upsert_by_path(&conn, "/tmp/p1", Some("My Project"), None, now).unwrap();
        assert_eq!(created.id, renamed.id);
        assert_eq!(renamed.name, "My Project");
    }

    #[test]
    fn get_by_path_misses_cleanly() {
        let conn = setup();
        assert!(get_by_path(&conn, "/absent").unwrap().is_none());
    }

    #[test]
    fn metadata_round_trips() {
        let conn = setup();
        let meta = serde_json::json!({"branch": "main", "hooks": 3});
        let created =
            upsert_by_path(&conn, "/tmp/p2", None, Some(&meta), Utc::now()).unwrap();
        assert_eq!(created.metadata, meta);
    }
}
