//! Collaborator interfaces consumed by the orchestrator.
//!
//! Each is an injected trait object so runs can be driven against the GitHub
//! implementations in [`crate::github`] or against test doubles.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionVerdict {
    Allowed,
    /// Explanation shown to the user verbatim
    Denied(String),
}

#[async_trait]
pub trait PermissionsGate: Send + Sync {
    async fn check(&self, actor: &str) -> anyhow::Result<PermissionVerdict>;
}

/// Outcome of the pre-deployment checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrecheckResult {
    /// Ref to deploy
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub status: bool,
    pub message: String,
    pub noop: bool,
}

#[async_trait]
pub trait PrecheckGate: Send + Sync {
    async fn run(&self, body: &str, issue_number: u64) -> anyhow::Result<PrecheckResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub git_ref: String,
    pub environment: String,
    pub noop: bool,
}

/// Response of a deployment creation. GitHub answers 202 with only a
/// message when it merged the base branch into the ref instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeploymentCreated {
    pub id: Option<u64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    InProgress,
    Success,
    Failure,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::InProgress => "in_progress",
            DeploymentState::Success => "success",
            DeploymentState::Failure => "failure",
        }
    }
}

#[async_trait]
pub trait DeployApi: Send + Sync {
    async fn create_deployment(
        &self,
        request: &DeploymentRequest,
    ) -> anyhow::Result<DeploymentCreated>;

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        state: DeploymentState,
        environment: &str,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn react(&self, comment_id: u64, reaction: &str) -> anyhow::Result<()>;

    async fn comment(&self, issue_number: u64, body: &str) -> anyhow::Result<()>;
}
