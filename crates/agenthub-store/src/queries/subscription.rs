use agenthub_types::{Subscription, Topic};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::records::{parse_enum, parse_ts, parse_uuid, parse_uuid_opt, ts};
use crate::Result;

/// Idempotent on (agent, topic): returns the existing row when present.
pub fn subscribe(
    conn: &Connection,
    agent_id: &str,
    topic: Topic,
    project_id: Option<&Uuid>,
    now: DateTime<Utc>,
) -> Result<Subscription> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO subscriptions (id, agent_id, topic, project_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            Uuid::new_v4().to_string(),
            agent_id,
            topic.as_str(),
            project_id.map(Uuid::to_string),
            ts(now),
        ],
    )?;
    get_pair(conn, agent_id, topic)?.ok_or_else(|| {
        crate::Error::Corrupt(format!("subscription vanished after insert: {}/{}", agent_id, topic))
    })
}

/// Idempotent: removing an absent pair is a no-op.
pub fn unsubscribe(conn: &Connection, agent_id: &str, topic: Topic) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM subscriptions WHERE agent_id = ?1 AND topic = ?2",
        params![agent_id, topic.as_str()],
    )?;
    Ok(deleted)
}

pub fn delete_by_id(conn: &Connection, id: &Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1",
        [id.to_string()],
    )?;
    Ok(deleted > 0)
}

pub fn get_pair(conn: &Connection, agent_id: &str, topic: Topic) -> Result<Option<Subscription>> {
    let row = conn
        .query_row(
            &format!("{} WHERE agent_id = ?1 AND topic = ?2", SELECT),
            params![agent_id, topic.as_str()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_subscription).transpose()
}

pub fn list(conn: &Connection) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY agent_id, topic", SELECT))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_subscription).collect()
}

pub fn list_for_agent(conn: &Connection, agent_id: &str) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!("{} WHERE agent_id = ?1 ORDER BY topic", SELECT))?;
    let rows = stmt
        .query_map([agent_id], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_subscription).collect()
}

pub fn topics_for_agent(conn: &Connection, agent_id: &str) -> Result<Vec<Topic>> {
    Ok(list_for_agent(conn, agent_id)?
        .into_iter()
        .map(|s| s.topic)
        .collect())
}

const SELECT: &str = r#"
    SELECT id, agent_id, topic, project_id, created_at
    FROM subscriptions
"#;

struct Row {
    id: String,
    agent_id: String,
    topic: String,
    project_id: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        topic: row.get(2)?,
        project_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Row {
    fn into_subscription(self) -> Result<Subscription> {
        Ok(Subscription {
            id: parse_uuid(&self.id)?,
            agent_id: self.agent_id,
            topic: parse_enum(&self.topic)?,
            project_id: parse_uuid_opt(self.project_id)?,
            created_at: parse_ts(&self.created_at)?,
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
    fn subscribe_twice_returns_same_row() {
        let conn = setup();
        let first = subscribe(&conn, "backend", Topic::SchemaChanged, None, Utc::now()).unwrap();
        let second = subscribe(&conn, "backend", Topic::SchemaChanged, None, Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let conn = setup();
        subscribe(&conn, "backend", Topic::SchemaChanged, None, Utc::now()).unwrap();
        assert_eq!(unsubscribe(&conn, "backend", Topic::SchemaChanged).unwrap(), 1);
        assert_eq!(unsubscribe(&conn, "backend", Topic::SchemaChanged).unwrap(), 0);
    }

    #[test]
    fn topics_for_agent_collects_all() {
        let conn = setup();
        subscribe(&conn, "backend", Topic::SchemaChanged, None, Utc::now()).unwrap();
        subscribe(&conn, "backend", Topic::BuildStatus, None, Utc::now()).unwrap();
        subscribe(&conn, "frontend", Topic::General, None, Utc::now()).unwrap();
        let topics = topics_for_agent(&conn, "backend").unwrap();
        assert_eq!(topics.len(), 2);
        assert!(topics.contains(&Topic::SchemaChanged));
    }
}
