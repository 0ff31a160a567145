//! The main phase: one comment event in, one terminal outcome out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::messages;
use crate::command::{Command, CommandKind, CommandParser};
use crate::config::ActionConfig;
use crate::context::{CommentEvent, EventContext};
use crate::gates::{
    CommentApi, DeployApi, DeploymentRequest, DeploymentState, PermissionVerdict,
    PermissionsGate, PrecheckGate,
};
use crate::lock::{AcquireOutcome, LockCoordinator, LockRequest, LockScope, ReleaseOutcome};
use crate::report::{RunReport, keys};
use crate::types::RunOutcome;

/// Marker GitHub puts in the message of a deployment it refused to create
/// because it merged the base branch into the ref first.
const AUTO_MERGED: &str = "Auto-merged";

/// External services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionsGate>,
    pub prechecks: Arc<dyn PrecheckGate>,
    pub deployments: Arc<dyn DeployApi>,
    pub comments: Arc<dyn CommentApi>,
}

/// Terminal state of a run. Built once, at the exit point.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Terminal {
    outcome: RunOutcome,
    /// No lock release is owed by the post phase
    bypass: bool,
    failure: Option<String>,
}

impl Terminal {
    fn safe_exit(bypass: bool) -> Self {
        Self {
            outcome: RunOutcome::SafeExit,
            bypass,
            failure: None,
        }
    }

    fn failure(message: impl Into<String>, bypass: bool) -> Self {
        Self {
            outcome: RunOutcome::Failure,
            bypass,
            failure: Some(message.into()),
        }
    }

    fn success(noop: bool, bypass: bool) -> Self {
        Self {
            outcome: if noop {
                RunOutcome::SuccessNoop
            } else {
                RunOutcome::Success
            },
            bypass,
            failure: None,
        }
    }
}

/// How far a deployment got once its lock was held.
enum Dispatch {
    Deployed { noop: bool },
    /// Prechecks failed; carries their message
    Rejected(String),
    /// GitHub updated the branch instead of deploying it
    StaleBranch,
}

pub struct DeploymentOrchestrator {
    config: ActionConfig,
    parser: CommandParser,
    token: String,
    locks: LockCoordinator,
    gates: Collaborators,
}

impl DeploymentOrchestrator {
    pub fn new(
        config: ActionConfig,
        token: impl Into<String>,
        locks: LockCoordinator,
        gates: Collaborators,
    ) -> Self {
        Self {
            parser: CommandParser::from_config(&config),
            config,
            token: token.into(),
            locks,
            gates,
        }
    }

    /// Handle one event. Never fails: every fault ends the run in
    /// [`RunOutcome::Failure`] with the fault as the failure message.
    pub async fn run(&self, context: &EventContext) -> RunReport {
        let mut report = RunReport::new();

        if !context.context_check() {
            info!(event = %context.event_name, "event is not a pull request comment, nothing to do");
            return report.finish(RunOutcome::SafeExit);
        }

        let event = match CommentEvent::from_context(context) {
            Ok(event) => event,
            Err(e) => {
                let terminal = Terminal::failure(format!("{:#}", e), true);
                return self.conclude(report, None, terminal).await;
            }
        };

        let terminal = self.handle(context, &event, &mut report).await;
        self.conclude(report, Some(&event), terminal).await
    }

    async fn handle(
        &self,
        context: &EventContext,
        event: &CommentEvent,
        report: &mut RunReport,
    ) -> Terminal {
        let body = event.body.trim();
        report.set_output("comment_body", body);
        report.save_state(keys::IS_POST, true);
        report.save_state(keys::TOKEN, &self.token);
        report.save_state(keys::ENVIRONMENT, &self.config.environment);
        report.save_state(keys::ACTOR, &event.actor);

        let command = match self.parser.parse(body) {
            Ok(command) if command.is_none() => {
                debug!("no trigger in comment");
                report.set_output("triggered", false);
                return Terminal::safe_exit(true);
            }
            Ok(command) => command,
            Err(e) => {
                info!(error = %e, "comment rejected");
                report.set_output("triggered", false);
                return Terminal::failure(e.to_string(), true);
            }
        };

        let environment = command
            .environment_or(&self.config.environment)
            .to_string();
        report.set_output("triggered", true);
        if let Some(id) = event.comment_id {
            report.set_output("comment_id", id);
            report.save_state(keys::COMMENT_ID, id);
        }
        if let Some(kind) = command.kind.output_type() {
            report.set_output("type", kind);
        }
        report.save_state(keys::ENVIRONMENT, &environment);
        info!(kind = ?command.kind, environment = %environment, actor = %event.actor, "command parsed");

        if let Err(e) = self.check_actor(event).await {
            return e;
        }

        if command.kind.is_lock_family() {
            return match self.lock_flow(context, event, &command, &environment).await {
                Ok(terminal) => terminal,
                Err(e) => Terminal::failure(format!("{:#}", e), true),
            };
        }

        self.deploy_flow(context, event, &command, &environment, report)
            .await
    }

    /// React to the comment and consult the permissions gate.
    async fn check_actor(&self, event: &CommentEvent) -> Result<(), Terminal> {
        if let Some(id) = event.comment_id {
            self.gates
                .comments
                .react(id, &self.config.reaction)
                .await
                .map_err(|e| Terminal::failure(format!("{:#}", e), true))?;
        }

        match self.gates.permissions.check(&event.actor).await {
            Ok(PermissionVerdict::Allowed) => Ok(()),
            Ok(PermissionVerdict::Denied(message)) => {
                info!(actor = %event.actor, "permission denied");
                Err(Terminal::failure(message, true))
            }
            Err(e) => Err(Terminal::failure(format!("{:#}", e), true)),
        }
    }

    async fn lock_flow(
        &self,
        context: &EventContext,
        event: &CommentEvent,
        command: &Command,
        environment: &str,
    ) -> anyhow::Result<Terminal> {
        let scope = if command.is_global {
            LockScope::Global
        } else {
            LockScope::environment(environment)
        };

        match command.kind {
            CommandKind::Lock => {
                let request = LockRequest {
                    environment: environment.to_string(),
                    holder: event.actor.clone(),
                    reason: command.reason.clone(),
                    sticky: command.sticky,
                    global: command.is_global,
                    link: Some(event.link(&context.server_url)),
                };
                match self.locks.acquire(&request).await? {
                    AcquireOutcome::Acquired { record, fresh } => {
                        self.notify(event, &messages::lock_claimed(&record, fresh))
                            .await;
                        Ok(Terminal::safe_exit(true))
                    }
                    AcquireOutcome::Denied(existing) => Ok(Terminal::failure(
                        messages::lock_conflict(&existing, &scope),
                        true,
                    )),
                    AcquireOutcome::Lost(requested) => {
                        Ok(Terminal::failure(messages::lock_lost(&requested), true))
                    }
                }
            }
            CommandKind::Unlock => {
                match self
                    .locks
                    .release(&scope, &event.actor, command.force)
                    .await?
                {
                    ReleaseOutcome::Released(record) => {
                        self.notify(event, &messages::lock_released(&record)).await;
                        Ok(Terminal::safe_exit(true))
                    }
                    ReleaseOutcome::NotHeld => {
                        self.notify(event, &messages::lock_not_held(&scope)).await;
                        Ok(Terminal::safe_exit(true))
                    }
                    ReleaseOutcome::Forbidden(record) => Ok(Terminal::failure(
                        messages::release_forbidden(&record),
                        true,
                    )),
                }
            }
            CommandKind::LockInfo => {
                let record = if command.is_global {
                    self.locks.check_status(&scope).await?
                } else {
                    self.locks.covering_lock(environment).await?
                };
                self.notify(event, &messages::lock_info(&scope, record.as_ref()))
                    .await;
                Ok(Terminal::safe_exit(true))
            }
            CommandKind::Deploy | CommandKind::None => Ok(Terminal::safe_exit(true)),
        }
    }

    async fn deploy_flow(
        &self,
        context: &EventContext,
        event: &CommentEvent,
        command: &Command,
        environment: &str,
        report: &mut RunReport,
    ) -> Terminal {
        let request = LockRequest {
            link: Some(event.link(&context.server_url)),
            ..LockRequest::deploy(environment, event.actor.clone())
        };

        let fresh = match self.locks.acquire(&request).await {
            Ok(AcquireOutcome::Acquired { fresh, .. }) => fresh,
            Ok(AcquireOutcome::Denied(existing)) => {
                info!(environment, holder = %existing.holder, "environment is locked, yielding");
                self.notify(event, &messages::lock_conflict(&existing, &request.scope()))
                    .await;
                return Terminal::safe_exit(true);
            }
            Ok(AcquireOutcome::Lost(requested)) => {
                info!(environment, "lost the lock race, yielding");
                self.notify(event, &messages::lock_lost(&requested)).await;
                return Terminal::safe_exit(true);
            }
            Err(e) => return Terminal::failure(format!("{:#}", e), true),
        };

        match self.dispatch(event, command, environment, report).await {
            Ok(Dispatch::Deployed { noop }) => Terminal::success(noop, !fresh),
            Ok(Dispatch::Rejected(message)) => {
                let bypass = self.unwind(fresh, environment, &event.actor).await;
                Terminal::failure(message, bypass)
            }
            Ok(Dispatch::StaleBranch) => {
                let bypass = self.unwind(fresh, environment, &event.actor).await;
                Terminal::safe_exit(bypass)
            }
            Err(e) => {
                let bypass = self.unwind(fresh, environment, &event.actor).await;
                Terminal::failure(format!("{:#}", e), bypass)
            }
        }
    }

    async fn dispatch(
        &self,
        event: &CommentEvent,
        command: &Command,
        environment: &str,
        report: &mut RunReport,
    ) -> anyhow::Result<Dispatch> {
        let precheck = self
            .gates
            .prechecks
            .run(&command.raw_body, event.issue_number)
            .await?;
        report.set_output("ref", &precheck.git_ref);
        report.set_output("noop", precheck.noop);
        report.save_state(keys::REF, &precheck.git_ref);
        report.save_state(keys::NOOP, precheck.noop);

        if !precheck.status {
            info!(git_ref = %precheck.git_ref, "prechecks failed");
            return Ok(Dispatch::Rejected(precheck.message));
        }

        let request = DeploymentRequest {
            git_ref: precheck.git_ref.clone(),
            environment: environment.to_string(),
            noop: precheck.noop,
        };
        let created = self.gates.deployments.create_deployment(&request).await?;

        let Some(deployment_id) = created.id else {
            return match created.message {
                Some(message) if message.contains(AUTO_MERGED) => {
                    info!(git_ref = %precheck.git_ref, "branch was out of date and has been updated");
                    self.notify(event, &messages::stale_branch(&precheck.git_ref, &message))
                        .await;
                    Ok(Dispatch::StaleBranch)
                }
                message => anyhow::bail!(
                    "Deployment was not created: {}",
                    message.unwrap_or_else(|| "no deployment id returned".to_string())
                ),
            };
        };

        report.save_state(keys::DEPLOYMENT_ID, deployment_id);
        self.gates
            .deployments
            .create_deployment_status(deployment_id, DeploymentState::InProgress, environment)
            .await?;
        self.notify(
            event,
            &messages::deployment_started(
                environment,
                &precheck.git_ref,
                precheck.noop,
                &event.actor,
            ),
        )
        .await;

        report.set_output("continue", true);
        info!(deployment_id, environment, noop = precheck.noop, "deployment started");
        Ok(Dispatch::Deployed {
            noop: precheck.noop,
        })
    }

    /// Release the deploy lock of a run that will not deploy. Returns the
    /// bypass flag: true when nothing is left for the post phase to release.
    async fn unwind(&self, fresh: bool, environment: &str, holder: &str) -> bool {
        if !fresh {
            return true;
        }
        match self
            .locks
            .release_own(&LockScope::environment(environment), holder)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(environment, error = %e, "failed to release deploy lock, leaving it to the post phase");
                false
            }
        }
    }

    async fn notify(&self, event: &CommentEvent, body: &str) {
        if let Err(e) = self.gates.comments.comment(event.issue_number, body).await {
            let error = format!("{:#}", e);
            warn!(issue = event.issue_number, error = %error, "failed to post comment");
        }
    }

    async fn conclude(
        &self,
        mut report: RunReport,
        event: Option<&CommentEvent>,
        terminal: Terminal,
    ) -> RunReport {
        report.save_state(keys::BYPASS, terminal.bypass);
        if let Some(message) = &terminal.failure {
            report.set_failed(message.clone());
            if let Some(event) = event {
                self.notify(event, message).await;
            }
        }
        info!(outcome = %terminal.outcome, bypass = terminal.bypass, "run finished");
        report.finish(terminal.outcome)
    }
}
