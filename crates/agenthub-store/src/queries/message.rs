use agenthub_types::{AgentMessage, MessageType, Topic};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::records::{
    json_text, parse_enum, parse_json, parse_string_vec, parse_ts, parse_ts_opt, parse_uuid,
    parse_uuid_opt, ts, ts_opt,
};
use crate::Result;

pub struct NewMessage<'a> {
    pub project_id: Option<&'a Uuid>,
    pub from_agent: Option<&'a str>,
    /// None means broadcast to every subscriber of the topic
    pub to_agent: Option<&'a str>,
    pub topic: Topic,
    pub message_type: MessageType,
    pub payload: Option<&'a Value>,
    pub priority: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

pub fn insert(conn: &Connection, new: &NewMessage, now: DateTime<Utc>) -> Result<AgentMessage> {
    let id = Uuid::new_v4();
    let priority = new.priority.clamp(0, 10);
    conn.execute(
        r#"
        INSERT INTO agent_messages
            (id, project_id, from_agent, to_agent, topic, message_type, payload, priority, created_at, expires_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, 'null'), ?8, ?9, ?10)
        "#,
        params![
            id.to_string(),
            new.project_id.map(Uuid::to_string),
            new.from_agent,
            new.to_agent,
            new.topic.as_str(),
            new.message_type.as_str(),
            new.payload.map(json_text),
            priority,
            ts(now),
            ts_opt(new.expires_at),
        ],
    )?;
    Ok(AgentMessage {
        id,
        project_id: new.project_id.copied(),
        from_agent: new.from_agent.map(str::to_string),
        to_agent: new.to_agent.map(str::to_string),
        topic: new.topic,
        message_type: new.message_type,
        payload: new.payload.cloned().unwrap_or(Value::Null),
        priority,
        read_by: Vec::new(),
        created_at: now,
        expires_at: new.expires_at,
    })
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<Option<AgentMessage>> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT),
            [id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(Row::into_message).transpose()
}

/// Unread, unexpired messages visible to an agent: addressed directly, or
/// broadcast on a topic the agent subscribes to. Highest priority first,
/// then newest.
pub fn unread_for_agent(
    conn: &Connection,
    agent_id: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<AgentMessage>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        {}
        WHERE (expires_at IS NULL OR expires_at > ?2)
          AND NOT EXISTS (SELECT 1 FROM json_each(read_by) WHERE json_each.value = ?1)
          AND (
              to_agent = ?1
              OR (to_agent IS NULL AND topic IN (
                  SELECT topic FROM subscriptions WHERE agent_id = ?1
              ))
          )
        ORDER BY priority DESC, created_at DESC
        LIMIT ?3
        "#,
        SELECT
    ))?;
    let rows = stmt
        .query_map(params![agent_id, ts(now), limit as i64], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_message).collect()
}

/// Adds the agent to read_by for each message, skipping ones already read.
pub fn mark_read(conn: &Connection, ids: &[Uuid], agent_id: &str) -> Result<usize> {
    let mut marked = 0;
    for id in ids {
        marked += conn.execute(
            r#"
            UPDATE agent_messages
            SET read_by = json_insert(read_by, '$[#]', ?2)
            WHERE id = ?1
              AND NOT EXISTS (SELECT 1 FROM json_each(read_by) WHERE json_each.value = ?2)
            "#,
            params![id.to_string(), agent_id],
        )?;
    }
    Ok(marked)
}

/// Recent high-priority traffic, used as the "decisions" source of a compact
/// snapshot.
pub fn high_priority_recent(
    conn: &Connection,
    project_id: Option<&Uuid>,
    min_priority: i64,
    limit: usize,
) -> Result<Vec<AgentMessage>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        {}
        WHERE priority >= ?1 AND (?2 IS NULL OR project_id = ?2)
        ORDER BY created_at DESC
        LIMIT ?3
        "#,
        SELECT
    ))?;
    let rows = stmt
        .query_map(
            params![min_priority, project_id.map(Uuid::to_string), limit as i64],
            read_row,
        )?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_message).collect()
}

pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<AgentMessage>> {
    let mut stmt = conn.prepare(&format!(
        "{} ORDER BY created_at DESC LIMIT ?1",
        SELECT
    ))?;
    let rows = stmt
        .query_map([limit as i64], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_message).collect()
}

/// Deletes messages whose expiration is past.
pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM agent_messages WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        [ts(now)],
    )?;
    Ok(deleted)
}

/// Deletes messages older than the cutoff that have been read at least once.
pub fn delete_read_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM agent_messages WHERE created_at < ?1 AND read_by != '[]'",
        [ts(cutoff)],
    )?;
    Ok(deleted)
}

pub fn count_since(conn: &Connection, since: DateTime<Utc>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM agent_messages WHERE created_at >= ?1",
        [ts(since)],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn count_expired(conn: &Connection, now: DateTime<Utc>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM agent_messages WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        [ts(now)],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

const SELECT: &str = r#"
    SELECT id, project_id, from_agent, to_agent, topic, message_type, payload,
           priority, read_by, created_at, expires_at
    FROM agent_messages
"#;

struct Row {
    id: String,
    project_id: Option<String>,
    from_agent: Option<String>,
    to_agent: Option<String>,
    topic: String,
    message_type: String,
    payload: String,
    priority: i64,
    read_by: String,
    created_at: String,
    expires_at: Option<String>,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        project_id: row.get(1)?,
        from_agent: row.get(2)?,
        to_agent: row.get(3)?,
        topic: row.get(4)?,
        message_type: row.get(5)?,
        payload: row.get(6)?,
        priority: row.get(7)?,
        read_by: row.get(8)?,
        created_at: row.get(9)?,
        expires_at: row.get(10)?,
    })
}

impl Row {
    fn into_message(self) -> Result<AgentMessage> {
        Ok(AgentMessage {
            id: parse_uuid(&self.id)?,
            project_id: parse_uuid_opt(self.project_id)?,
            from_agent: self.from_agent,
            to_agent: self.to_agent,
            topic: parse_enum(&self.topic)?,
            message_type: parse_enum(&self.message_type)?,
            payload: parse_json(&self.payload)?,
            priority: self.priority,
            read_by: parse_string_vec(&self.read_by)?,
            created_at: parse_ts(&self.created_at)?,
            expires_at: parse_ts_opt(self.expires_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::subscription;
    use crate::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn send(conn: &Connection, to: Option<&str>, topic: Topic, priority: i64) -> AgentMessage {
        insert(
            conn,
            &NewMessage {
                project_id: None,
                from_agent: Some("backend"),
                to_agent: to,
                topic,
                message_type: MessageType::Info,
                payload: None,
                priority,
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn direct_messages_reach_recipient_only() {
        let conn = setup();
        send(&conn, Some("frontend"), Topic::General, 5);
        assert_eq!(unread_for_agent(&conn, "frontend", Utc::now(), 10).unwrap().len(), 1);
        assert!(unread_for_agent(&conn, "reviewer", Utc::now(), 10).unwrap().is_empty());
    }

    #[test]
    fn broadcasts_require_subscription() {
        let conn = setup();
        send(&conn, None, Topic::ApiEndpointCreated, 5);
        assert!(unread_for_agent(&conn, "frontend", Utc::now(), 10).unwrap().is_empty());

        subscription::subscribe(&conn, "frontend", Topic::ApiEndpointCreated, None, Utc::now())
            .unwrap();
        assert_eq!(unread_for_agent(&conn, "frontend", Utc::now(), 10).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_removes_from_unread_and_is_idempotent() {
        let conn = setup();
        let msg = send(&conn, Some("frontend"), Topic::General, 5);
        assert_eq!(mark_read(&conn, &[msg.id], "frontend").unwrap(), 1);
        assert_eq!(mark_read(&conn, &[msg.id], "frontend").unwrap(), 0);
        assert!(unread_for_agent(&conn, "frontend", Utc::now(), 10).unwrap().is_empty());

        let loaded = get(&conn, &msg.id).unwrap().unwrap();
        assert_eq!(loaded.read_by, vec!["frontend".to_string()]);
    }

    #[test]
    fn priority_is_clipped_and_orders_unread() {
        let conn = setup();
        let low = send(&conn, Some("a"), Topic::General, -3);
        assert_eq!(low.priority, 0);
        let high = send(&conn, Some("a"), Topic::General, 99);
        assert_eq!(high.priority, 10);

        let unread = unread_for_agent(&conn, "a", Utc::now(), 10).unwrap();
        assert_eq!(unread[0].id, high.id);
    }

    #[test]
    fn expiry_sweeps() {
        let conn = setup();
        let now = Utc::now();
        insert(
            &conn,
            &NewMessage {
                project_id: None,
                from_agent: None,
                to_agent: Some("a"),
                topic: Topic::General,
                message_type: MessageType::Info,
                payload: None,
                priority: 5,
                expires_at: Some(now - chrono::Duration::seconds(5)),
            },
            now - chrono::Duration::seconds(60),
        )
        .unwrap();
        send(&conn, Some("a"), Topic::General, 5);

        assert_eq!(count_expired(&conn, now).unwrap(), 1);
        assert_eq!(delete_expired(&conn, now).unwrap(), 1);
        assert_eq!(unread_for_agent(&conn, "a", now, 10).unwrap().len(), 1);
    }

    #[test]
    fn read_messages_age_out() {
        let conn = setup();
        let old = Utc::now() - chrono::Duration::hours(48);
        let msg = insert(
            &conn,
            &NewMessage {
                project_id: None,
                from_agent: None,
                to_agent: Some("a"),
                topic: Topic::General,
                message_type: MessageType::Info,
                payload: None,
                priority: 5,
                expires_at: None,
            },
            old,
        )
        .unwrap();
        mark_read(&conn, &[msg.id], "a").unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        assert_eq!(delete_read_older_than(&conn, cutoff).unwrap(), 1);
    }
}
