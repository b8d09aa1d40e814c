use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::Result;

/// Row counts per table, served by `GET /stats` and the health probe.
#[derive(Debug, Clone, Serialize)]
pub struct StoreCounts {
    pub projects: i64,
    pub sessions: i64,
    pub requests: i64,
    pub task_lists: i64,
    pub subtasks: i64,
    pub actions: i64,
    pub agent_messages: i64,
    pub subscriptions: i64,
    pub blockings: i64,
    pub agent_contexts: i64,
    pub tool_scores: i64,
}

pub fn counts(conn: &Connection) -> Result<StoreCounts> {
    let count = |table: &str| -> Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .map_err(Into::into)
    };
    Ok(StoreCounts {
        projects: count("projects")?,
        sessions: count("sessions")?,
        requests: count("requests")?,
        task_lists: count("task_lists")?,
        subtasks: count("subtasks")?,
        actions: count("actions")?,
        agent_messages: count("agent_messages")?,
        subscriptions: count("subscriptions")?,
        blockings: count("blockings")?,
        agent_contexts: count("agent_contexts")?,
        tool_scores: count("tool_scores")?,
    })
}

/// One periodic `metric.update` payload. The five aggregates the workers
/// broadcast every few seconds.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub active_sessions: i64,
    /// Distinct agents with a running subtask
    pub active_agents: i64,
    pub pending_tasks: i64,
    pub running_tasks: i64,
    pub completed_tasks_last_hour: i64,
    pub messages_last_hour: i64,
    pub actions_per_minute: f64,
    pub avg_task_duration_ms: f64,
}

pub fn metric_snapshot(conn: &Connection, now: DateTime<Utc>) -> Result<MetricSnapshot> {
    let hour_ago = crate::records::ts(now - Duration::hours(1));

    let active_sessions: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE ended_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    let active_agents: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT COALESCE(agent_name, agent_type)) FROM subtasks WHERE status = 'running'",
        [],
        |row| row.get(0),
    )?;
    let (pending_tasks, running_tasks): (i64, i64) = conn.query_row(
        r#"
        SELECT COUNT(*) FILTER (WHERE status = 'pending'),
               COUNT(*) FILTER (WHERE status = 'running')
        FROM subtasks
        "#,
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let completed_tasks_last_hour: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subtasks WHERE status = 'completed' AND completed_at >= ?1",
        [&hour_ago],
        |row| row.get(0),
    )?;
    let messages_last_hour: i64 = conn.query_row(
        "SELECT COUNT(*) FROM agent_messages WHERE created_at >= ?1",
        [&hour_ago],
        |row| row.get(0),
    )?;
    let actions_last_hour: i64 = conn.query_row(
        "SELECT COUNT(*) FROM actions WHERE created_at >= ?1",
        [&hour_ago],
        |row| row.get(0),
    )?;
    let avg_task_duration_ms: f64 = conn.query_row(
        r#"
        SELECT COALESCE(AVG(
            (julianday(completed_at) - julianday(started_at)) * 86400000.0
        ), 0)
        FROM subtasks
        WHERE started_at IS NOT NULL AND completed_at IS NOT NULL
        "#,
        [],
        |row| row.get(0),
    )?;

    Ok(MetricSnapshot {
        active_sessions,
        active_agents,
        pending_tasks,
        running_tasks,
        completed_tasks_last_hour,
        messages_last_hour,
        actions_per_minute: actions_last_hour as f64 / 60.0,
        avg_task_duration_ms,
    })
}
