//! Brief generation for agent onboarding and compact restore.
//!
//! A brief is a plain-text, token-bounded summary assembled from six live
//! store sources, rendered through a per-category template, and trimmed from
//! the end without ever dropping a section header.

pub mod compact;
mod error;
mod render;
mod sources;
mod tokens;

use serde::Serialize;

pub use error::{Error, Result};
pub use render::Template;
pub use sources::{
    BriefQuery, BriefSources, DEFAULT_ACTION_LIMIT, RESTORE_ACTION_LIMIT, SourceRef, collect,
};
pub use tokens::{DEFAULT_MAX_TOKENS, estimate_tokens, truncate_to_budget};

use agenthub_store::Database;

/// A rendered brief plus the source references it was assembled from.
#[derive(Debug, Clone, Serialize)]
pub struct Brief {
    pub text: String,
    pub estimated_tokens: usize,
    pub truncated: bool,
    pub sources: Vec<SourceRef>,
}

/// Collects the sources and renders the brief in one step.
pub async fn generate(db: &Database, query: &BriefQuery) -> Result<Brief> {
    let sources = collect(db, query).await?;
    Ok(generate_from_sources(query, &sources))
}

pub(crate) fn generate_from_sources(query: &BriefQuery, sources: &BriefSources) -> Brief {
    let template = Template::for_agent_type(&query.agent_type);
    let text = render::render(template, &query.agent_id, &query.session_id, sources);
    let (text, truncated) = truncate_to_budget(&text, query.max_tokens);
    Brief {
        estimated_tokens: estimate_tokens(&text),
        truncated,
        sources: sources.refs(),
        text,
    }
}
