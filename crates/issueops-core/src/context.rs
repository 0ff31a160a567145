//! Workflow event context.
//!
//! Wraps the event payload GitHub Actions writes to `GITHUB_EVENT_PATH` and
//! extracts the comment a run reacts to.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::Value;

const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Event that started the workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub event_name: String,
    pub payload: Value,
    /// "owner/repo"
    pub repository: String,
    /// Login that triggered the run
    pub actor: String,
    pub server_url: String,
}

impl EventContext {
    pub fn new(event_name: impl Into<String>, payload: Value, repository: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            payload,
            repository: repository.into(),
            actor: String::new(),
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }

    /// Read the context from the Actions runner environment.
    pub fn from_env<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let event_name = lookup("GITHUB_EVENT_NAME").unwrap_or_default();
        let repository = lookup("GITHUB_REPOSITORY")
            .ok_or_else(|| anyhow::anyhow!("GITHUB_REPOSITORY is not set"))?;

        let payload = match lookup("GITHUB_EVENT_PATH") {
            Some(path) => {
                let path = PathBuf::from(path);
                let content = std::fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read event payload: {}", path.display())
                })?;
                serde_json::from_str(&content).with_context(|| {
                    format!("Failed to parse event payload: {}", path.display())
                })?
            }
            None => Value::Null,
        };

        Ok(Self {
            event_name,
            payload,
            repository,
            actor: lookup("GITHUB_ACTOR").unwrap_or_default(),
            server_url: lookup("GITHUB_SERVER_URL")
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
        })
    }

    /// True for a comment on a pull request.
    pub fn context_check(&self) -> bool {
        self.event_name == "issue_comment"
            && !self.payload["issue"]["pull_request"].is_null()
            && self.payload["comment"].is_object()
    }
}

/// The pull request comment a run was triggered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEvent {
    pub issue_number: u64,
    /// Missing on some synthetic payloads; reactions are skipped then
    pub comment_id: Option<u64>,
    pub body: String,
    pub actor: String,
    pub repository: String,
}

impl CommentEvent {
    pub fn from_context(context: &EventContext) -> anyhow::Result<Self> {
        let payload = &context.payload;
        let issue_number = payload["issue"]["number"]
            .as_u64()
            .context("Event payload has no issue number")?;
        let body = payload["comment"]["body"]
            .as_str()
            .context("Event payload has no comment body")?
            .to_string();

        let actor = payload["comment"]["user"]["login"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| context.actor.clone());
        if actor.is_empty() {
            anyhow::bail!("Event payload has no commenter login");
        }

        Ok(Self {
            issue_number,
            comment_id: payload["comment"]["id"].as_u64(),
            body,
            actor,
            repository: context.repository.clone(),
        })
    }

    /// Permalink to the comment, recorded on locks it creates.
    pub fn link(&self, server_url: &str) -> String {
        let base = format!(
            "{}/{}/pull/{}",
            server_url.trim_end_matches('/'),
            self.repository,
            self.issue_number
        );
        match self.comment_id {
            Some(id) => format!("{}#issuecomment-{}", base, id),
            None => base,
        }
    }
}
