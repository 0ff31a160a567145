//! The post phase: runs after the workflow job, whatever its result.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::gates::{DeployApi, DeploymentState};
use crate::lock::{LockCoordinator, LockScope, ReleaseOutcome};
use crate::report::{SavedState, keys};
use crate::types::JobStatus;

/// What the post phase did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReport {
    /// The main phase never reached the point of saving state
    pub skipped: bool,
    pub deployment_status: Option<DeploymentState>,
    pub released: bool,
}

pub struct PostPhase {
    locks: LockCoordinator,
    deployments: Arc<dyn DeployApi>,
}

impl PostPhase {
    pub fn new(locks: LockCoordinator, deployments: Arc<dyn DeployApi>) -> Self {
        Self { locks, deployments }
    }

    /// Record the final deployment status and release the deploy lock the
    /// main phase left owed.
    ///
    /// The lock is released even when the status update fails; the status
    /// error is returned afterwards.
    pub async fn run(&self, state: &SavedState, job: JobStatus) -> anyhow::Result<PostReport> {
        if !state.flag(keys::IS_POST) {
            debug!("no saved state, skipping post phase");
            return Ok(PostReport {
                skipped: true,
                ..PostReport::default()
            });
        }

        let environment = state
            .get(keys::ENVIRONMENT)
            .context("Saved state has no environment")?;
        let mut report = PostReport::default();

        let status_result = match state.get(keys::DEPLOYMENT_ID) {
            Some(id) => {
                let result = self.record_status(id, job, environment).await;
                if let Ok(status) = &result {
                    report.deployment_status = Some(*status);
                }
                result.map(|_| ())
            }
            None => Ok(()),
        };
        if let Err(e) = &status_result {
            warn!(error = %e, "failed to record deployment status");
        }

        if !state.flag(keys::BYPASS) {
            let actor = state.get(keys::ACTOR).context("Saved state has no actor")?;
            let outcome = self
                .locks
                .release_own(&LockScope::environment(environment), actor)
                .await?;
            report.released = matches!(outcome, ReleaseOutcome::Released(_));
            info!(environment, released = report.released, "post phase lock release");
        }

        status_result?;
        Ok(report)
    }

    async fn record_status(
        &self,
        id: &str,
        job: JobStatus,
        environment: &str,
    ) -> anyhow::Result<DeploymentState> {
        let id: u64 = id
            .parse()
            .with_context(|| format!("Invalid saved deployment id: {}", id))?;
        let status = match job {
            JobStatus::Success => DeploymentState::Success,
            JobStatus::Failure | JobStatus::Cancelled => DeploymentState::Failure,
        };
        self.deployments
            .create_deployment_status(id, status, environment)
            .await?;
        Ok(status)
    }
}
