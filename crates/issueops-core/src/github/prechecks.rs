//! Pull request readiness checks run before a deployment is created.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::client::{ApiError, GitHubClient};
use crate::command::CommandParser;
use crate::config::{ActionConfig, RequiredContexts};
use crate::gates::{PrecheckGate, PrecheckResult};

const PASSING_CONCLUSIONS: &[&str] = &["success", "neutral", "skipped"];

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: Head,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Review {
    user: Option<User>,
    state: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CheckRuns {
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CheckRun {
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

/// Aggregate review state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReviewDecision {
    Approved,
    ChangesRequested,
    /// No reviewer has approved or requested changes
    None,
}

impl ReviewDecision {
    fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approved => "APPROVED",
            ReviewDecision::ChangesRequested => "CHANGES_REQUESTED",
            ReviewDecision::None => "null",
        }
    }
}

/// Checks reviews and CI of the pull request behind a comment.
#[derive(Debug, Clone)]
pub struct GitHubPrechecks {
    client: GitHubClient,
    parser: CommandParser,
    stable_branch: String,
    required_contexts: RequiredContexts,
}

impl GitHubPrechecks {
    pub fn new(client: GitHubClient, config: &ActionConfig) -> Self {
        Self {
            client,
            parser: CommandParser::from_config(config),
            stable_branch: config.stable_branch.clone(),
            required_contexts: config.required_contexts.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let response = self
            .client
            .get(path)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", path))?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        response
            .json()
            .await
            .with_context(|| format!("Invalid response from {}", path))
    }
}

#[async_trait]
impl PrecheckGate for GitHubPrechecks {
    async fn run(&self, body: &str, issue_number: u64) -> anyhow::Result<PrecheckResult> {
        let command = self.parser.parse(body)?;

        if command.stable_branch {
            return Ok(PrecheckResult {
                git_ref: self.stable_branch.clone(),
                status: true,
                message: format!(
                    "✔️ Deployment to the **{}** branch requested - OK",
                    self.stable_branch
                ),
                noop: command.noop,
            });
        }

        let pull: PullRequest = self.get_json(&format!("pulls/{}", issue_number)).await?;
        let reviews: Vec<Review> = self
            .get_json(&format!("pulls/{}/reviews?per_page=100", issue_number))
            .await?;
        let runs: CheckRuns = self
            .get_json(&format!(
                "commits/{}/check-runs?per_page=100",
                pull.head.sha
            ))
            .await?;

        let decision = review_decision(&reviews);
        debug!(pull = issue_number, head = %pull.head.git_ref, decision = decision.as_str(), runs = runs.check_runs.len(), "precheck inputs");

        Ok(evaluate(
            pull.head.git_ref,
            decision,
            &runs.check_runs,
            &self.required_contexts,
            command.noop,
        ))
    }
}

/// Latest APPROVED / CHANGES_REQUESTED review of each reviewer decides.
fn review_decision(reviews: &[Review]) -> ReviewDecision {
    let mut latest: BTreeMap<&str, &str> = BTreeMap::new();
    for review in reviews {
        let Some(user) = &review.user else { continue };
        if matches!(review.state.as_str(), "APPROVED" | "CHANGES_REQUESTED") {
            latest.insert(user.login.as_str(), review.state.as_str());
        }
    }

    if latest.values().any(|state| *state == "CHANGES_REQUESTED") {
        ReviewDecision::ChangesRequested
    } else if latest.values().any(|state| *state == "APPROVED") {
        ReviewDecision::Approved
    } else {
        ReviewDecision::None
    }
}

/// `Ok(())` when every relevant check run finished with a passing conclusion.
fn ci_status(runs: &[CheckRun], required: &RequiredContexts) -> Result<(), String> {
    let passing = |run: &CheckRun| {
        run.status == "completed"
            && run
                .conclusion
                .as_deref()
                .is_some_and(|c| PASSING_CONCLUSIONS.contains(&c))
    };

    match required {
        RequiredContexts::Disabled => match runs.iter().find(|run| !passing(run)) {
            None => Ok(()),
            Some(run) => Err(format!("`{}` has not passed", run.name)),
        },
        RequiredContexts::Only(names) => {
            for name in names {
                match runs.iter().find(|run| &run.name == name) {
                    Some(run) if passing(run) => {}
                    Some(_) => return Err(format!("`{}` has not passed", name)),
                    None => return Err(format!("required check `{}` has not run", name)),
                }
            }
            Ok(())
        }
    }
}

pub(crate) fn evaluate(
    git_ref: String,
    decision: ReviewDecision,
    runs: &[CheckRun],
    required: &RequiredContexts,
    noop: bool,
) -> PrecheckResult {
    let ci = ci_status(runs, required);

    let outcome = match (&ci, decision, noop) {
        (Err(reason), _, _) => Err(format!("CI checks are not passing: {}", reason)),
        (Ok(()), ReviewDecision::ChangesRequested, false) => {
            Err("changes were requested on this pull request".to_string())
        }
        (Ok(()), _, true) => Ok("✔️ All CI checks passed and **noop** requested - OK"),
        (Ok(()), ReviewDecision::Approved, false) => {
            Ok("✔️ PR is approved and all CI checks passed - OK")
        }
        (Ok(()), ReviewDecision::None, false) => {
            Ok("✔️ CI checks passed and no reviews are blocking - OK")
        }
    };

    match outcome {
        Ok(message) => PrecheckResult {
            git_ref,
            status: true,
            message: message.to_string(),
            noop,
        },
        Err(reason) => PrecheckResult {
            git_ref,
            status: false,
            message: format!(
                "### ⚠️ Cannot proceed with deployment\n\n- reviewDecision: `{}`\n- commitStatus: `{}`\n\n> {}",
                decision.as_str(),
                if ci.is_ok() { "SUCCESS" } else { "FAILURE" },
                reason
            ),
            noop,
        },
    }
}
