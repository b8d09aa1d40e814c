use agenthub_types::{Subtask, SubtaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::records::{
    json_text, parse_enum, parse_json, parse_ts, parse_ts_opt, parse_uuid, parse_uuid_vec, ts,
    uuid_vec_text,
};
use crate::Result;

pub struct NewSubtask<'a> {
    pub task_list_id: &'a Uuid,
    pub agent_type: &'a str,
    pub agent_name: Option<&'a str>,
    pub description: &'a str,
    pub depends_on: &'a [Uuid],
    pub context: Option<&'a Value>,
}

pub fn insert(conn: &Connection, new: &NewSubtask, now: DateTime<Utc>) -> Result<Subtask> {
    let id = Uuid::new_v4();
    conn.execute(
        r#"
        INSERT INTO subtasks
            (id, task_list_id, agent_type, agent_name, description, status, depends_on, context, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, COALESCE(?7, 'null'), ?8)
        "#,
        params![
            id.to_string(),
            new.task_list_id.to_string(),
            new.agent_type,
            new.agent_name,
            new.description,
            uuid_vec_text(new.depends_on),
            new.context.map(json_text),
            ts(now),
        ],
    )?;
    Ok(Subtask {
        id,
        task_list_id: *new.task_list_id,
        agent_type: new.agent_type.to_string(),
        agent_name: new.agent_name.map(str::to_string),
        description: new.description.to_string(),
        status: SubtaskStatus::Pending,
        depends_on: new.depends_on.to_vec(),
        context: new.context.cloned().unwrap_or(Value::Null),
        result: Value::Null,
        created_at: now,
        started_at: None,
        completed_at: None,
    })
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<Subtask>> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT),
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_subtask).transpose()
}

pub fn list(
    conn: &Connection,
    task_list_id: Option<&Uuid>,
    status: Option<SubtaskStatus>,
    agent_type: Option<&str>,
    limit: usize,
) -> Result<Vec<Subtask>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(tid) = task_list_id {
        where_clauses.push("task_list_id = ?");
        params.push(Box::new(tid.to_string()));
    }
    if let Some(st) = status {
        where_clauses.push("status = ?");
        params.push(Box::new(st.as_str().to_string()));
    }
    if let Some(at) = agent_type {
        where_clauses.push("agent_type = ?");
        params.push(Box::new(at.to_string()));
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let query = format!(
        "{} {} ORDER BY created_at ASC LIMIT {}",
        SELECT, where_clause, limit
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_subtask).collect()
}

/// Subtasks assigned to an agent by category or by exact instance name,
/// newest first. Used by the brief generator.
pub fn list_for_agent(
    conn: &Connection,
    agent_type: &str,
    agent_name: Option<&str>,
    limit: usize,
) -> Result<Vec<Subtask>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE agent_type = ?1 OR (?2 IS NOT NULL AND agent_name = ?2)
         ORDER BY created_at DESC LIMIT ?3",
        SELECT
    ))?;
    let rows = stmt
        .query_map(params![agent_type, agent_name, limit as i64], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_subtask).collect()
}

/// Non-terminal subtasks under a session's requests.
pub fn active_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Subtask>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT st.id, st.task_list_id, st.agent_type, st.agent_name, st.description, st.status,
               st.depends_on, st.context, st.result, st.created_at, st.started_at, st.completed_at
        FROM subtasks st
        JOIN task_lists tl ON tl.id = st.task_list_id
        JOIN requests r ON r.id = tl.request_id
        WHERE r.session_id = ?1 AND st.status NOT IN ('completed', 'failed')
        ORDER BY st.created_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map([session_id], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_subtask).collect()
}

pub fn list_for_project(conn: &Connection, project_id: &Uuid) -> Result<Vec<Subtask>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT st.id, st.task_list_id, st.agent_type, st.agent_name, st.description, st.status,
               st.depends_on, st.context, st.result, st.created_at, st.started_at, st.completed_at
        FROM subtasks st
        JOIN task_lists tl ON tl.id = st.task_list_id
        JOIN requests r ON r.id = tl.request_id
        WHERE r.project_id = ?1
        ORDER BY st.created_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map([project_id.to_string()], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_subtask).collect()
}

pub struct SubtaskPatch<'a> {
    pub status: Option<SubtaskStatus>,
    pub agent_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub context: Option<&'a Value>,
    pub result: Option<&'a Value>,
}

/// Applies a patch. started_at is stamped exactly when the status first
/// reaches running; completed_at when it reaches completed or failed.
pub fn patch(
    conn: &Connection,
    id: &Uuid,
    patch: &SubtaskPatch,
    now: DateTime<Utc>,
) -> Result<Option<Subtask>> {
    let Some(current) = get(conn, id)? else {
        return Ok(None);
    };

    let started_at = match (current.started_at, patch.status) {
        (None, Some(SubtaskStatus::Running)) => Some(now),
        (existing, _) => existing,
    };
    let completed_at = match (current.completed_at, patch.status) {
        (None, Some(status)) if status.is_terminal() => Some(now),
        (existing, _) => existing,
    };

    conn.execute(
        r#"
        UPDATE subtasks SET
            status = COALESCE(?2, status),
            agent_name = COALESCE(?3, agent_name),
            description = COALESCE(?4, description),
            context = COALESCE(?5, context),
            result = COALESCE(?6, result),
            started_at = ?7,
            completed_at = ?8
        WHERE id = ?1
        "#,
        params![
            id.to_string(),
            patch.status.map(|s| s.as_str()),
            patch.agent_name,
            patch.description,
            patch.context.map(json_text),
            patch.result.map(json_text),
            started_at.map(ts),
            completed_at.map(ts),
        ],
    )?;
    get(conn, id)
}

const SELECT: &str = r#"
    SELECT id, task_list_id, agent_type, agent_name, description, status,
           depends_on, context, result, created_at, started_at, completed_at
    FROM subtasks
"#;

struct Row {
    id: String,
    task_list_id: String,
    agent_type: String,
    agent_name: Option<String>,
    description: String,
    status: String,
    depends_on: String,
    context: String,
    result: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        task_list_id: row.get(1)?,
        agent_type: row.get(2)?,
        agent_name: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        depends_on: row.get(6)?,
        context: row.get(7)?,
        result: row.get(8)?,
        created_at: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

impl Row {
    fn into_subtask(self) -> Result<Subtask> {
        Ok(Subtask {
            id: parse_uuid(&self.id)?,
            task_list_id: parse_uuid(&self.task_list_id)?,
            agent_type: self.agent_type,
            agent_name: self.agent_name,
            description: self.description,
            status: parse_enum(&self.status)?,
            depends_on: parse_uuid_vec(&self.depends_on)?,
            context: parse_json(&self.context)?,
            result: parse_json(&self.result)?,
            created_at: parse_ts(&self.created_at)?,
            started_at: parse_ts_opt(self.started_at)?,
            completed_at: parse_ts_opt(self.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{project, request, task_list};
    use crate::schema::init_schema;
    use agenthub_types::PromptType;

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
        let wave = task_list::insert(&conn, &req.id, "wave", None, Utc::now()).unwrap();
        (conn, wave.id)
    }

    fn make(conn: &Connection, wave: &Uuid, agent_type: &str) -> Subtask {
        insert(
            conn,
            &NewSubtask {
                task_list_id: wave,
                agent_type,
                agent_name: None,
                description: "implement endpoint",
                depends_on: &[],
                context: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn set_status(conn: &Connection, id: &Uuid, status: SubtaskStatus) -> Subtask {
        patch(
            conn,
            id,
            &SubtaskPatch {
                status: Some(status),
                agent_name: None,
                description: None,
                context: None,
                result: None,
            },
            Utc::now(),
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn running_stamps_started_once() {
        let (conn, wave) = setup();
        let task = make(&conn, &wave, "developer");

        let running = set_status(&conn, &task.id, SubtaskStatus::Running);
        let started = running.started_at.unwrap();
        assert!(running.completed_at.is_none());

        // pausing and resuming must not move started_at
        set_status(&conn, &task.id, SubtaskStatus::Paused);
        let resumed = set_status(&conn, &task.id, SubtaskStatus::Running);
        assert_eq!(resumed.started_at.unwrap(), started);
    }

    #[test]
    fn terminal_status_stamps_completed() {
        let (conn, wave) = setup();
        let task = make(&conn, &wave, "developer");
        set_status(&conn, &task.id, SubtaskStatus::Running);
        let done = set_status(&conn, &task.id, SubtaskStatus::Completed);
        assert!(done.completed_at.is_some());

        let failed_task = make(&conn, &wave, "developer");
        let failed = set_status(&conn, &failed_task.id, SubtaskStatus::Failed);
        assert!(failed.completed_at.is_some());
        assert!(failed.started_at.is_none());
    }

    #[test]
    fn list_for_agent_matches_type_or_name() {
        let (conn, wave) = setup();
        make(&conn, &wave, "backend");
        let named = insert(
            &conn,
            &NewSubtask {
                task_list_id: &wave,
                agent_type: "frontend",
                agent_name: Some("frontend-2"),
                description: "wire UI",
                depends_on: &[],
                context: None,
            },
            Utc::now(),
        )
        .unwrap();

        let by_type = list_for_agent(&conn, "backend", None, 10).unwrap();
        assert_eq!(by_type.len(), 1);

        let by_name = list_for_agent(&conn, "other", Some("frontend-2"), 10).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, named.id);
    }

    #[test]
    fn depends_on_round_trips() {
        let (conn, wave) = setup();
        let first = make(&conn, &wave, "developer");
        let second = insert(
            &conn,
            &NewSubtask {
                task_list_id: &wave,
                agent_type: "developer",
                agent_name: None,
                description: "follow-up",
                depends_on: &[first.id],
                context: None,
            },
            Utc::now(),
        )
        .unwrap();
        let loaded = get(&conn, &second.id).unwrap().unwrap();
        assert_eq!(loaded.depends_on, vec![first.id]);
    }
}
