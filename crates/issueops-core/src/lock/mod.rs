//! Deployment locks backed by versioned refs.
//!
//! Each lock is a branch (`<environment>-branch-deploy-lock`, or
//! `global-branch-deploy-lock`) whose single root commit holds `lock.json`.
//! The ref database is the mutex: creating a ref that already exists fails,
//! and deletion only proceeds while the ref still points at the version the
//! caller read.

pub mod coordinator;
pub mod git;
pub mod github;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::github::{ApiError, GitHubClient};

pub use coordinator::{AcquireOutcome, LockCoordinator, LockRequest, ReleaseOutcome};
pub use git::GitRefLockStore;
pub use github::GitHubLockStore;
pub use store::{CreateOutcome, DeleteOutcome, LockStore};

/// Environment name recorded on a global lock.
pub const GLOBAL_ENVIRONMENT: &str = "global";

/// Suffix shared by every lock branch.
pub const LOCK_BRANCH_SUFFIX: &str = "branch-deploy-lock";

/// File holding the serialized [`LockRecord`] inside a lock branch.
pub const LOCK_FILE: &str = "lock.json";

/// Key a lock is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockScope {
    Environment(String),
    Global,
}

impl LockScope {
    pub fn environment(name: impl Into<String>) -> Self {
        LockScope::Environment(name.into())
    }

    /// Branch name backing this lock.
    pub fn branch_name(&self) -> String {
        match self {
            LockScope::Environment(env) => format!("{}-{}", env, LOCK_BRANCH_SUFFIX),
            LockScope::Global => format!("{}-{}", GLOBAL_ENVIRONMENT, LOCK_BRANCH_SUFFIX),
        }
    }

    /// Fully qualified ref name.
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.branch_name())
    }

    pub fn is_global(&self) -> bool {
        matches!(self, LockScope::Global)
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Environment(env) => f.write_str(env),
            LockScope::Global => f.write_str(GLOBAL_ENVIRONMENT),
        }
    }
}

/// Persisted lock state (`lock.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Environment name, or `global`
    pub environment: String,

    /// Lock covers every environment
    #[serde(default)]
    pub global: bool,

    /// Login of the lock holder
    pub holder: String,

    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Survives the operation that created it
    pub sticky: bool,

    /// Link to the comment that requested the lock
    #[serde(default)]
    pub link: Option<String>,
}

impl LockRecord {
    pub fn new(scope: &LockScope, holder: impl Into<String>) -> Self {
        Self {
            environment: scope.to_string(),
            global: scope.is_global(),
            holder: holder.into(),
            reason: None,
            created_at: Utc::now(),
            sticky: false,
            link: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }

    pub fn scope(&self) -> LockScope {
        if self.global {
            LockScope::Global
        } else {
            LockScope::Environment(self.environment.clone())
        }
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.holder == holder
    }
}

/// A lock record together with the ref version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLock {
    pub record: LockRecord,
    /// Commit id the lock ref pointed to
    pub version: String,
}

#[derive(Debug, Error)]
pub enum LockStoreError {
    #[error("git ref store error: {0}")]
    Git(#[from] git2::Error),

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("lock record on '{key}' is unreadable: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("lock store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error(transparent)]
    Store(#[from] LockStoreError),

    #[error("lock '{0}' changed while it was being updated, retry the command")]
    Contended(String),
}

/// Where lock refs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSpec {
    /// The repository the event came from, through the GitHub API
    GitHub,
    /// A local repository, through git2
    Git(PathBuf),
}

impl StoreSpec {
    /// Parse `github` or `git:<path>`.
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let spec = spec.trim();
        if spec == "github" {
            return Ok(StoreSpec::GitHub);
        }
        if let Some(path) = spec.strip_prefix("git:") {
            if path.is_empty() {
                anyhow::bail!("git lock store needs a repository path: git:<path>");
            }
            return Ok(StoreSpec::Git(PathBuf::from(path)));
        }
        anyhow::bail!("Unknown lock store: {}. Use 'github' or 'git:<path>'", spec)
    }

    /// Open the store. The GitHub store needs an API client.
    pub fn open(&self, client: Option<GitHubClient>) -> anyhow::Result<Arc<dyn LockStore>> {
        match self {
            StoreSpec::GitHub => {
                let client = client
                    .ok_or_else(|| anyhow::anyhow!("GitHub lock store requires an API client"))?;
                Ok(Arc::new(GitHubLockStore::new(client)))
            }
            StoreSpec::Git(path) => Ok(Arc::new(GitRefLockStore::open(path)?)),
        }
    }
}
