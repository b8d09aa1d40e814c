use agenthub_types::Blocking;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::records::{parse_ts, parse_uuid, ts};
use crate::Result;

/// Inserts an active blocking edge; an existing (blocker, blocked) pair is
/// returned unchanged. Self-blocks are refused at the API boundary, not here.
pub fn insert(
    conn: &Connection,
    blocker_id: &str,
    blocked_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Blocking> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO blockings (id, blocker_id, blocked_id, reason, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            Uuid::new_v4().to_string(),
            blocker_id,
            blocked_id,
            reason,
            ts(now)
        ],
    )?;
    get_pair(conn, blocker_id, blocked_id)?.ok_or_else(|| {
        crate::Error::Corrupt(format!(
            "blocking vanished after insert: {} -> {}",
            blocker_id, blocked_id
        ))
    })
}

pub fn get_pair(
    conn: &Connection,
    blocker_id: &str,
    blocked_id: &str,
) -> Result<Option<Blocking>> {
    let row = conn
        .query_row(
            &format!("{} WHERE blocker_id = ?1 AND blocked_id = ?2", SELECT),
            params![blocker_id, blocked_id],
            read_row,
        )
        .optional()?;
    row.map(Row::into_blocking).transpose()
}

/// Removes the pair; absent pairs are a business-level no-op.
pub fn remove_pair(conn: &Connection, blocker_id: &str, blocked_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM blockings WHERE blocker_id = ?1 AND blocked_id = ?2",
        params![blocker_id, blocked_id],
    )?;
    Ok(deleted)
}

pub fn delete_by_id(conn: &Connection, id: &Uuid) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM blockings WHERE id = ?1", [id.to_string()])?;
    Ok(deleted > 0)
}

pub fn check(conn: &Connection, blocker_id: &str, blocked_id: &str) -> Result<bool> {
    Ok(get_pair(conn, blocker_id, blocked_id)?.is_some())
}

/// Rows where the agent is being blocked. This is what "blocked" means for
/// the brief and for coordination checks.
pub fn active_for_blocked(conn: &Connection, blocked_id: &str) -> Result<Vec<Blocking>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE blocked_id = ?1 ORDER BY created_at ASC",
        SELECT
    ))?;
    let rows = stmt
        .query_map([blocked_id], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_blocking).collect()
}

/// Rows where the agent is doing the blocking.
pub fn active_for_blocker(conn: &Connection, blocker_id: &str) -> Result<Vec<Blocking>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE blocker_id = ?1 ORDER BY created_at ASC",
        SELECT
    ))?;
    let rows = stmt
        .query_map([blocker_id], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter().map(Row::into_blocking).collect()
}

pub fn is_blocked(conn: &Connection, agent_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blockings WHERE blocked_id = ?1",
        [agent_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

const SELECT: &str = r#"
    SELECT id, blocker_id, blocked_id, reason, created_at
    FROM blockings
"#;

struct Row {
    id: String,
    blocker_id: String,
    blocked_id: String,
    reason: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        blocker_id: row.get(1)?,
        blocked_id: row.get(2)?,
        reason: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Row {
    fn into_blocking(self) -> Result<Blocking> {
        Ok(Blocking {
            id: parse_uuid(&self.id)?,
            blocker_id: self.blocker_id,
            blocked_id: self.blocked_id,
            reason: self.reason,
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
    fn block_unblock_cycle() {
        let conn = setup();
        insert(&conn, "x", "y", Some("waiting on schema"), Utc::now()).unwrap();
        assert!(check(&conn, "x", "y").unwrap());
        assert!(is_blocked(&conn, "y").unwrap());
        assert!(!is_blocked(&conn, "x").unwrap());

        assert_eq!(remove_pair(&conn, "x", "y").unwrap(), 1);
        assert!(!check(&conn, "x", "y").unwrap());
        // unblock of an absent pair is a no-op
        assert_eq!(remove_pair(&conn, "x", "y").unwrap(), 0);
    }

    #[test]
    fn duplicate_pair_keeps_first_row() {
        let conn = setup();
        let first = insert(&conn, "x", "y", None, Utc::now()).unwrap();
        let second = insert(&conn, "x", "y", Some("again"), Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.reason, None);
    }

    #[test]
    fn blocked_and_blocker_views_are_disjoint() {
        let conn = setup();
        insert(&conn, "x", "y", None, Utc::now()).unwrap();
        insert(&conn, "z", "y", None, Utc::now()).unwrap();
        assert_eq!(active_for_blocked(&conn, "y").unwrap().len(), 2);
        assert_eq!(active_for_blocker(&conn, "x").unwrap().len(), 1);
        assert!(active_for_blocked(&conn, "x").unwrap().is_empty());
    }
}
