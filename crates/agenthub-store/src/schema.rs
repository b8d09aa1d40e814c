use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

// NOTE: Storage layout
//
// - Ownership tree projects -> requests -> task_lists -> subtasks -> actions
//   cascades on delete; side structures (messages, subscriptions, blockings,
//   agent_contexts) cascade from projects only.
// - Sessions are referenced by requests via their string id, not a foreign
//   key, so ending or deleting a session never tears down request history.
// - Timestamps are RFC3339 UTC text with fixed width, so lexicographic
//   comparison equals chronological comparison in SQL.
// - Open-shape metadata/payload columns are JSON text; action input/output
//   are gzip blobs (see blob.rs).
// - Compact snapshots live in agent_contexts under the reserved
//   'compact-snapshot' agent_type with agent_id = session id.

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            project_id TEXT REFERENCES projects(id) ON DELETE SET NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            tool_count INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL,
            prompt TEXT NOT NULL,
            prompt_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            completed_at TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS task_lists (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            wave_number INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (request_id, wave_number)
        );

        CREATE TABLE IF NOT EXISTS subtasks (
            id TEXT PRIMARY KEY,
            task_list_id TEXT NOT NULL REFERENCES task_lists(id) ON DELETE CASCADE,
            agent_type TEXT NOT NULL,
            agent_name TEXT,
            description TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            depends_on TEXT NOT NULL DEFAULT '[]',
            context TEXT NOT NULL DEFAULT 'null',
            result TEXT NOT NULL DEFAULT 'null',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS actions (
            id TEXT PRIMARY KEY,
            subtask_id TEXT REFERENCES subtasks(id) ON DELETE CASCADE,
            tool_name TEXT NOT NULL,
            tool_type TEXT NOT NULL,
            input BLOB,
            output BLOB,
            file_paths TEXT NOT NULL DEFAULT '[]',
            exit_code INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS tool_scores (
            keyword TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            tool_type TEXT NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            use_count INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            last_used_at TEXT NOT NULL,
            PRIMARY KEY (keyword, tool_name)
        );

        CREATE TABLE IF NOT EXISTS agent_messages (
            id TEXT PRIMARY KEY,
            project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
            from_agent TEXT,
            to_agent TEXT,
            topic TEXT NOT NULL,
            message_type TEXT NOT NULL DEFAULT 'info',
            payload TEXT NOT NULL DEFAULT 'null',
            priority INTEGER NOT NULL DEFAULT 5,
            read_by TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            expires_at TEXT
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            UNIQUE (agent_id, topic)
        );

        CREATE TABLE IF NOT EXISTS blockings (
            id TEXT PRIMARY KEY,
            blocker_id TEXT NOT NULL,
            blocked_id TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (blocker_id, blocked_id)
        );

        CREATE TABLE IF NOT EXISTS agent_contexts (
            id TEXT PRIMARY KEY,
            project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
            agent_id TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            role_context TEXT NOT NULL DEFAULT 'null',
            skills TEXT NOT NULL DEFAULT '[]',
            tools_used TEXT NOT NULL DEFAULT '[]',
            progress_summary TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE (project_id, agent_id)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_requests_session ON requests(session_id);
        CREATE INDEX IF NOT EXISTS idx_requests_project ON requests(project_id);
        CREATE INDEX IF NOT EXISTS idx_task_lists_request ON task_lists(request_id);
        CREATE INDEX IF NOT EXISTS idx_subtasks_list ON subtasks(task_list_id);
        CREATE INDEX IF NOT EXISTS idx_subtasks_status ON subtasks(status);
        CREATE INDEX IF NOT EXISTS idx_subtasks_agent ON subtasks(agent_type, agent_name);
        CREATE INDEX IF NOT EXISTS idx_actions_subtask ON actions(subtask_id);
        CREATE INDEX IF NOT EXISTS idx_actions_created ON actions(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_recipient ON agent_messages(to_agent);
        CREATE INDEX IF NOT EXISTS idx_messages_topic ON agent_messages(topic);
        CREATE INDEX IF NOT EXISTS idx_messages_created ON agent_messages(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_scores_keyword ON tool_scores(keyword);
        CREATE INDEX IF NOT EXISTS idx_scores_tool ON tool_scores(tool_name);
        CREATE INDEX IF NOT EXISTS idx_blockings_blocked ON blockings(blocked_id);
        CREATE INDEX IF NOT EXISTS idx_contexts_agent ON agent_contexts(agent_id);

        CREATE TRIGGER IF NOT EXISTS trg_projects_updated
        AFTER UPDATE OF path, name, metadata ON projects
        BEGIN
            UPDATE projects
            SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = NEW.id;
        END;

        CREATE TRIGGER IF NOT EXISTS trg_contexts_updated
        AFTER UPDATE OF role_context, skills, tools_used, progress_summary ON agent_contexts
        BEGIN
            UPDATE agent_contexts
            SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = NEW.id;
        END;
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS agent_contexts;
        DROP TABLE IF EXISTS blockings;
        DROP TABLE IF EXISTS subscriptions;
        DROP TABLE IF EXISTS agent_messages;
        DROP TABLE IF EXISTS tool_scores;
        DROP TABLE IF EXISTS actions;
        DROP TABLE IF EXISTS subtasks;
        DROP TABLE IF EXISTS task_lists;
        DROP TABLE IF EXISTS requests;
        DROP TABLE IF EXISTS sessions;
        DROP TABLE IF EXISTS projects;
        "#,
    )?;
    Ok(())
}
