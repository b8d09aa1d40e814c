use agenthub_types::{TaskList, TaskListStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::records::{parse_enum, parse_ts, parse_uuid, ts};
use crate::Result;

/// Creates a task list under a request. When `wave_number` is absent the next
/// free wave (max existing + 1, starting at zero) is assigned.
pub fn insert(
    conn: &Connection,
    request_id: &Uuid,
    name: &str,
    wave_number: Option<i64>,
    now: DateTime<Utc>,
) -> Result<TaskList> {
    let wave = match wave_number {
        Some(n) => n,
        None => next_wave(conn, request_id)?,
    };
    let id = Uuid::new_v4();
    conn.execute(
        r#"
        INSERT INTO task_lists (id, request_id, name, wave_number, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
        "#,
        params![
            id.to_string(),
            request_id.to_string(),
            name,
            wave,
            ts(now)
        ],
    )?;
    Ok(TaskList {
        id,
        request_id: *request_id,
        name: name.to_string(),
        wave_number: wave,
        status: TaskListStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

fn next_wave(conn: &Connection, request_id: &Uuid) -> Result<i64> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(wave_number) + 1, 0) FROM task_lists WHERE request_id = ?1",
        [request_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(next)
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<TaskList>> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT),
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_task_list).transpose()
}

pub fn list(
    conn: &Connection,
    request_id: Option<&Uuid>,
    status: Option<TaskListStatus>,
    limit: usize,
) -> Result<Vec<TaskList>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(rid) = request_id {
        where_clauses.push("request_id = ?");
        params.push(Box::new(rid.to_string()));
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
    let query = format!(
        "{} {} ORDER BY wave_number ASC LIMIT {}",
        SELECT, where_clause, limit
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_task_list).collect()
}

pub fn list_for_project(conn: &Connection, project_id: &Uuid) -> Result<Vec<TaskList>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT tl.id, tl.request_id, tl.name, tl.wave_number, tl.status, tl.created_at, tl.updated_at
        FROM task_lists tl
        JOIN requests r ON r.id = tl.request_id
        WHERE r.project_id = ?1
        ORDER BY r.created_at DESC, tl.wave_number ASC
        "#,
    )?;
    let rows = stmt
        .query_map([project_id.to_string()], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_task_list).collect()
}

pub struct TaskListPatch<'a> {
    pub name: Option<&'a str>,
    pub status: Option<TaskListStatus>,
}

pub fn patch(
    conn: &Connection,
    id: &Uuid,
    patch: &TaskListPatch,
    now: DateTime<Utc>,
) -> Result<Option<TaskList>> {
    conn.execute(
        r#"
        UPDATE task_lists SET
            name = COALESCE(?2, name),
            status = COALESCE(?3, status),
            updated_at = ?4
        WHERE id = ?1
        "#,
        params![
            id.to_string(),
            patch.name,
            patch.status.map(|s| s.as_str()),
            ts(now)
        ],
    )?;
    get(conn, id)
}

const SELECT: &str = r#"
    SELECT id, request_id, name, wave_number, status, created_at, updated_at
    FROM task_lists
"#;

struct Row {
    id: String,
    request_id: String,
    name: String,
    wave_number: i64,
    status: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        request_id: row.get(1)?,
        name: row.get(2)?,
        wave_number: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Row {
    fn into_task_list(self) -> Result<TaskList> {
        Ok(TaskList {
            id: parse_uuid(&self.id)?,
            request_id: parse_uuid(&self.request_id)?,
            name: self.name,
            wave_number: self.wave_number,
            status: parse_enum(&self.status)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{project, request};
    use agenthub_types::PromptType;
    use crate::schema::init_schema;

    fn setup() -> (Connection, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let proj = project::upsert_by_path(&conn, "/tmp/p1", None, None, Utc::now()).unwrap();
        let req = request::insert(
            &conn,
            &request::NewRequest {
                project_id: &proj.id,
                session_id: "s1",
                prompt: "Add OAuth",
                prompt_type: PromptType::Feature,
                metadata: None,
            },
            Utc::now(),
        )
        .unwrap();
        (conn, req.id)
    }

    #[test]
    fn waves_auto_assign_contiguously_from_zero() {
        let (conn, rid) = setup();
        let w0 = insert(&conn, &rid, "discovery", None, Utc::now()).unwrap();
        let w1 = insert(&conn, &rid, "implementation", None, Utc::now()).unwrap();
        let w2 = insert(&conn, &rid, "review", None, Utc::now()).unwrap();
        assert_eq!(
            (w0.wave_number, w1.wave_number, w2.wave_number),
            (0, 1, 2)
        );
    }

    #[test]
    fn explicit_wave_is_respected_and_duplicates_rejected() {
        let (conn, rid) = setup();
        insert(&conn, &rid, "a", Some(3), Utc::now()).unwrap();
        let next = insert(&conn, &rid, "b", None, Utc::now()).unwrap();
        assert_eq!(next.wave_number, 4);
        assert!(insert(&conn, &rid, "dup", Some(3), Utc::now()).is_err());
    }

    #[test]
    fn patch_updates_status() {
        let (conn, rid) = setup();
        let wave = insert(&conn, &rid, "a", None, Utc::now()).unwrap();
        let updated = patch(
            &conn,
            &wave.id,
            &TaskListPatch {
                name: None,
                status: Some(TaskListStatus::Running),
            },
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(updated.status, TaskListStatus::Running);
        assert_eq!(updated.name, "a");
    }
}
