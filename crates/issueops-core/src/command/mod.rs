//! IssueOps command model.
//!
//! A comment yields at most one [`Command`]. Parsing is pure; dispatch lives
//! in [`crate::orchestration`].

pub mod parser;

use serde::Serialize;

pub use parser::{CommandParser, ParseError};

/// What a comment asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    /// Deploy (or noop deploy) to an environment
    Deploy,
    /// Claim a lock
    Lock,
    /// Release a lock
    Unlock,
    /// Report who holds a lock
    LockInfo,
    /// No recognized trigger
    None,
}

impl CommandKind {
    pub fn is_lock_family(&self) -> bool {
        matches!(
            self,
            CommandKind::Lock | CommandKind::Unlock | CommandKind::LockInfo
        )
    }

    /// Value of the `type` output, if the comment was for us.
    pub fn output_type(&self) -> Option<&'static str> {
        match self {
            CommandKind::Deploy => Some("deploy"),
            CommandKind::Lock | CommandKind::Unlock | CommandKind::LockInfo => Some("lock"),
            CommandKind::None => None,
        }
    }
}

/// Parsed intent of a single comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub kind: CommandKind,
    /// Deploy without changing live state
    pub noop: bool,
    /// Target environment; the configured default when the comment names none
    pub environment: Option<String>,
    /// Free text given with `--reason`
    pub reason: Option<String>,
    /// Lock applies to every environment
    pub is_global: bool,
    /// Lock outlives the operation that created it
    pub sticky: bool,
    /// Release another holder's sticky lock
    pub force: bool,
    /// Deploy the stable branch instead of the pull request head
    pub stable_branch: bool,
    /// Trimmed comment body
    pub raw_body: String,
}

impl Command {
    /// A comment that carries no command.
    pub fn none(raw_body: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::None,
            noop: false,
            environment: None,
            reason: None,
            is_global: false,
            sticky: false,
            force: false,
            stable_branch: false,
            raw_body: raw_body.into(),
        }
    }

    pub(crate) fn new(kind: CommandKind, raw_body: impl Into<String>) -> Self {
        Self {
            kind,
            sticky: kind.is_lock_family(),
            ..Self::none(raw_body)
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == CommandKind::None
    }

    /// Environment the command targets, falling back to `default`.
    pub fn environment_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.environment.as_deref().unwrap_or(default)
    }
}
