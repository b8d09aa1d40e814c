//! Plain-text brief templates. One of three layouts is chosen by agent
//! category; every section keeps its `#` header even when empty so the
//! truncation pass has stable anchors.

use agenthub_types::{
    ActionRecord, AgentMessage, Blocking, Subtask, SubtaskStatus, truncate,
};

use crate::sources::{BriefSources, message_relevance, subtask_relevance};

const DESCRIPTION_MAX: usize = 120;
const PAYLOAD_MAX: usize = 80;

/// Template families. Unknown categories fall back to specialist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Orchestrator,
    Developer,
    Specialist,
}

impl Template {
    pub fn for_agent_type(agent_type: &str) -> Self {
        match agent_type {
            "orchestrator" => Template::Orchestrator,
            "developer" => Template::Developer,
            _ => Template::Specialist,
        }
    }
}

pub fn render(template: Template, agent_id: &str, session_id: &str, sources: &BriefSources) -> String {
    match template {
        Template::Orchestrator => render_orchestrator(agent_id, session_id, sources),
        Template::Developer => render_developer(agent_id, session_id, sources),
        Template::Specialist => render_specialist(agent_id, session_id, sources),
    }
}

fn render_orchestrator(agent_id: &str, session_id: &str, sources: &BriefSources) -> String {
    let mut out = String::new();

    section(&mut out, "# Mission Status");
    if let Some(request) = &sources.request {
        line(&mut out, &format!(
            "Request [{}]: {} ({})",
            request.prompt_type,
            truncate(&request.prompt, DESCRIPTION_MAX),
            request.status
        ));
    }
    line(&mut out, &format!("Session: {} | Orchestrating as: {}", session_id, agent_id));
    snapshot_lines(&mut out, sources);

    section(&mut out, "# Waves & Tasks");
    for subtask in ordered_subtasks(sources) {
        line(&mut out, &subtask_line(subtask));
    }

    section(&mut out, "# Agent Coordination");
    for blocking in &sources.blockings {
        line(&mut out, &blocking_line(blocking));
    }
    for message in ordered_messages(sources) {
        line(&mut out, &message_line(message));
    }

    section(&mut out, "# Recent Activity");
    for action in &sources.actions {
        line(&mut out, &action_line(action));
    }

    project_section(&mut out, sources);
    out
}

fn render_developer(agent_id: &str, session_id: &str, sources: &BriefSources) -> String {
    let mut out = String::new();

    section(&mut out, "# Your Tasks");
    for subtask in ordered_subtasks(sources) {
        line(&mut out, &subtask_line(subtask));
    }

    section(&mut out, "# Blockers");
    for blocking in &sources.blockings {
        line(&mut out, &blocking_line(blocking));
    }

    section(&mut out, "# Messages");
    for message in ordered_messages(sources) {
        line(&mut out, &message_line(message));
    }

    section(&mut out, "# Recent Actions");
    for action in &sources.actions {
        line(&mut out, &action_line(action));
    }

    section(&mut out, "# Session");
    if let Some(request) = &sources.request {
        line(&mut out, &format!(
            "Working on [{}]: {}",
            request.prompt_type,
            truncate(&request.prompt, DESCRIPTION_MAX)
        ));
    }
    line(&mut out, &format!("Session: {} | You are: {}", session_id, agent_id));
    snapshot_lines(&mut out, sources);

    project_section(&mut out, sources);
    out
}

fn render_specialist(agent_id: &str, session_id: &str, sources: &BriefSources) -> String {
    let mut out = String::new();

    section(&mut out, "# Assignment");
    for subtask in ordered_subtasks(sources) {
        line(&mut out, &subtask_line(subtask));
    }

    section(&mut out, "# Context");
    if let Some(request) = &sources.request {
        line(&mut out, &format!(
            "Request [{}]: {}",
            request.prompt_type,
            truncate(&request.prompt, DESCRIPTION_MAX)
        ));
    }
    line(&mut out, &format!("Session: {} | Agent: {}", session_id, agent_id));
    for blocking in &sources.blockings {
        line(&mut out, &blocking_line(blocking));
    }
    snapshot_lines(&mut out, sources);

    section(&mut out, "# Messages");
    for message in ordered_messages(sources) {
        line(&mut out, &message_line(message));
    }

    section(&mut out, "# Recent Activity");
    for action in &sources.actions {
        line(&mut out, &action_line(action));
    }
    out
}

fn section(out: &mut String, header: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(header);
    out.push('\n');
}

fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

fn project_section(out: &mut String, sources: &BriefSources) {
    section(out, "# Project");
    if let Some(project) = &sources.project {
        line(out, &format!("{} ({})", project.name, project.path));
    }
}

fn snapshot_lines(out: &mut String, sources: &BriefSources) {
    if let Some(snapshot) = &sources.snapshot {
        if let Some(summary) = &snapshot.progress_summary {
            line(out, &format!("Before compaction: {}", truncate(summary, DESCRIPTION_MAX * 2)));
        }
    }
}

/// Running first, then pending/blocked, then the rest; newest first inside a
/// relevance band.
fn ordered_subtasks(sources: &BriefSources) -> Vec<&Subtask> {
    let mut subtasks: Vec<&Subtask> = sources.subtasks.iter().collect();
    subtasks.sort_by(|a, b| {
        subtask_relevance(b)
            .total_cmp(&subtask_relevance(a))
            .then(b.created_at.cmp(&a.created_at))
    });
    subtasks
}

fn ordered_messages(sources: &BriefSources) -> Vec<&AgentMessage> {
    let mut messages: Vec<&AgentMessage> = sources.messages.iter().collect();
    messages.sort_by(|a, b| {
        message_relevance(b)
            .total_cmp(&message_relevance(a))
            .then(b.created_at.cmp(&a.created_at))
    });
    messages
}

fn subtask_line(subtask: &Subtask) -> String {
    let marker = match subtask.status {
        SubtaskStatus::Running => ">",
        SubtaskStatus::Blocked | SubtaskStatus::Paused => "!",
        _ => "-",
    };
    format!(
        "{} [{}] {} ({})",
        marker,
        subtask.status,
        truncate(&subtask.description, DESCRIPTION_MAX),
        subtask.agent_name.as_deref().unwrap_or(&subtask.agent_type)
    )
}

fn message_line(message: &AgentMessage) -> String {
    let from = message.from_agent.as_deref().unwrap_or("system");
    let payload = match &message.payload {
        serde_json::Value::Null => String::new(),
        other => format!(" {}", truncate(&other.to_string(), PAYLOAD_MAX)),
    };
    format!(
        "- (p{}) {} from {} on {}:{}",
        message.priority, message.message_type, from, message.topic, payload
    )
}

fn blocking_line(blocking: &Blocking) -> String {
    format!(
        "! blocked by {}: {}",
        blocking.blocker_id,
        blocking.reason.as_deref().unwrap_or("no reason given")
    )
}

fn action_line(action: &ActionRecord) -> String {
    let outcome = if action.is_success() { "ok" } else { "err" };
    let files = if action.file_paths.is_empty() {
        String::new()
    } else {
        format!(" [{}]", action.file_paths.join(", "))
    };
    format!(
        "- {} ({}) {} {}ms{}",
        action.tool_name, action.tool_type, outcome, action.duration_ms, files
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenthub_types::{MessageType, Topic, ToolType};
    use chrono::Utc;
    use serde_json::Value;
    use uuid::Uuid;

    fn sample_sources() -> BriefSources {
        let now = Utc::now();
        BriefSources {
            subtasks: vec![
                Subtask {
                    id: Uuid::new_v4(),
                    task_list_id: Uuid::new_v4(),
                    agent_type: "developer".into(),
                    agent_name: None,
                    description: "wire the session endpoints".into(),
                    status: SubtaskStatus::Pending,
                    depends_on: vec![],
                    context: Value::Null,
                    result: Value::Null,
                    created_at: now,
                    started_at: None,
                    completed_at: None,
                },
                Subtask {
                    id: Uuid::new_v4(),
                    task_list_id: Uuid::new_v4(),
                    agent_type: "developer".into(),
                    agent_name: Some("developer-1".into()),
                    description: "implement the token endpoint".into(),
                    status: SubtaskStatus::Running,
                    depends_on: vec![],
                    context: Value::Null,
                    result: Value::Null,
                    created_at: now,
                    started_at: Some(now),
                    completed_at: None,
                },
            ],
            messages: vec![AgentMessage {
                id: Uuid::new_v4(),
                project_id: None,
                from_agent: Some("backend".into()),
                to_agent: None,
                topic: Topic::SchemaChanged,
                message_type: MessageType::Notification,
                payload: serde_json::json!({"table": "sessions"}),
                priority: 8,
                read_by: vec![],
                created_at: now,
                expires_at: None,
            }],
            blockings: vec![Blocking {
                id: Uuid::new_v4(),
                blocker_id: "schema-admin".into(),
                blocked_id: "developer-1".into(),
                reason: Some("waiting on migration".into()),
                created_at: now,
            }],
            actions: vec![ActionRecord {
                id: Uuid::new_v4(),
                subtask_id: None,
                tool_name: "Edit".into(),
                tool_type: ToolType::Builtin,
                input: None,
                output: None,
                file_paths: vec!["src/routes.rs".into()],
                exit_code: 0,
                duration_ms: 150,
                created_at: now,
                metadata: serde_json::json!({}),
            }],
            request: None,
            project: None,
            snapshot: None,
        }
    }

    #[test]
    fn every_template_keeps_its_headers() {
        let sources = sample_sources();
        for (template, headers) in [
            (
                Template::Orchestrator,
                vec!["# Mission Status", "# Waves & Tasks", "# Agent Coordination", "# Recent Activity", "# Project"],
            ),
            (
                Template::Developer,
                vec!["# Your Tasks", "# Blockers", "# Messages", "# Recent Actions", "# Session", "# Project"],
            ),
            (
                Template::Specialist,
                vec!["# Assignment", "# Context", "# Messages", "# Recent Activity"],
            ),
        ] {
            let text = render(template, "developer-1", "s1", &sources);
            for header in headers {
                assert!(text.contains(header), "{:?} missing {}", template, header);
            }
            assert!(text.lines().next().unwrap().starts_with('#'));
        }
    }

    #[test]
    fn running_tasks_come_first() {
        let sources = sample_sources();
        let text = render(Template::Developer, "developer-1", "s1", &sources);
        let token_pos = text.find("implement the token endpoint").unwrap();
        let wire_pos = text.find("wire the session endpoints").unwrap();
        assert!(token_pos < wire_pos);
    }

    #[test]
    fn unknown_category_uses_specialist() {
        assert_eq!(Template::for_agent_type("security-auditor"), Template::Specialist);
        assert_eq!(Template::for_agent_type("orchestrator"), Template::Orchestrator);
    }

    #[test]
    fn empty_sources_still_render_headers() {
        let text = render(Template::Developer, "a", "s", &BriefSources::default());
        assert!(text.contains("# Your Tasks"));
        assert!(text.contains("# Project"));
    }
}
