//! Shared core types used across orchestration, reporting and the CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Terminal outcome of one orchestrator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunOutcome {
    /// A deployment was created and should proceed.
    Success,
    /// A noop deployment was created.
    SuccessNoop,
    /// The run failed; the failure message explains why.
    Failure,
    /// The run intentionally stopped without doing anything erroneous.
    #[default]
    SafeExit,
}

impl RunOutcome {
    /// Process result string printed by the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::SuccessNoop => "success - noop",
            RunOutcome::Failure => "failure",
            RunOutcome::SafeExit => "safe-exit",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failure)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of the workflow job, as seen by the post phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Success,
    Failure,
    Cancelled,
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(JobStatus::Success),
            "failure" => Ok(JobStatus::Failure),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => anyhow::bail!(
                "Unknown job status: {}. Use 'success', 'failure' or 'cancelled'",
                other
            ),
        }
    }
}
