//! Run results: step outputs, cross-phase state and the failure message.

pub mod actions;

use std::collections::BTreeMap;

use crate::types::RunOutcome;

pub use actions::ActionsWriter;

/// State keys shared between the main and post phases.
pub mod keys {
    pub const IS_POST: &str = "isPost";
    pub const TOKEN: &str = "actionsToken";
    pub const ENVIRONMENT: &str = "environment";
    pub const ACTOR: &str = "actor";
    pub const COMMENT_ID: &str = "comment_id";
    pub const REF: &str = "ref";
    pub const NOOP: &str = "noop";
    pub const BYPASS: &str = "bypass";
    pub const DEPLOYMENT_ID: &str = "deployment_id";

    pub const ALL: &[&str] = &[
        IS_POST,
        TOKEN,
        ENVIRONMENT,
        ACTOR,
        COMMENT_ID,
        REF,
        NOOP,
        BYPASS,
        DEPLOYMENT_ID,
    ];
}

/// Everything a run reports back to the workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    outputs: BTreeMap<String, String>,
    state: BTreeMap<String, String>,
    failure: Option<String>,
    outcome: RunOutcome,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report for a run that failed before the event could be handled. No
    /// state is saved, so the post phase has nothing to clean up.
    pub fn failed(message: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.set_failed(message);
        report.finish(RunOutcome::Failure)
    }

    pub fn set_output(&mut self, name: &str, value: impl ToString) {
        self.outputs.insert(name.to_string(), value.to_string());
    }

    pub fn save_state(&mut self, name: &str, value: impl ToString) {
        self.state.insert(name.to_string(), value.to_string());
    }

    /// Record the failure message. A run fails at most once; later calls keep
    /// the first message.
    pub fn set_failed(&mut self, message: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(message.into());
        }
    }

    pub fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    pub fn state(&self, name: &str) -> Option<&str> {
        self.state.get(name).map(String::as_str)
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn states(&self) -> &BTreeMap<String, String> {
        &self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }
}

/// State saved by the main phase, as seen by the post phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedState {
    values: BTreeMap<String, String>,
}

impl SavedState {
    /// Read `STATE_<name>` variables, the form the runner hands saved state
    /// back to the post step in.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = keys::ALL
            .iter()
            .filter_map(|key| {
                lookup(&format!("STATE_{}", key))
                    .filter(|value| !value.is_empty())
                    .map(|value| (key.to_string(), value))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }
}

impl From<&RunReport> for SavedState {
    fn from(report: &RunReport) -> Self {
        Self {
            values: report.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins() {
        let mut report = RunReport::new();
        report.set_failed("first");
        report.set_failed("second");
        assert_eq!(report.failure(), Some("first"));
    }

    #[test]
    fn test_default_outcome_is_safe_exit() {
        let report = RunReport::new();
        assert_eq!(report.outcome(), RunOutcome::SafeExit);
        assert_eq!(report.finish(RunOutcome::Success).outcome(), RunOutcome::Success);
    }

    #[test]
    fn test_failed_report_saves_no_state() {
        let report = RunReport::failed("No GitHub token found");
        assert_eq!(report.outcome(), RunOutcome::Failure);
        assert_eq!(report.failure(), Some("No GitHub token found"));
        assert!(report.states().is_empty());
        assert!(!SavedState::from(&report).flag(keys::IS_POST));
    }

    #[test]
    fn test_saved_state_from_lookup() {
        let state = SavedState::from_lookup(|key| match key {
            "STATE_isPost" => Some("true".to_string()),
            "STATE_environment" => Some("staging".to_string()),
            "STATE_bypass" => Some(String::new()),
            _ => None,
        });
        assert!(state.flag(keys::IS_POST));
        assert_eq!(state.get(keys::ENVIRONMENT), Some("staging"));
        assert_eq!(state.get(keys::BYPASS), None);
        assert!(!state.flag(keys::BYPASS));
    }

    #[test]
    fn test_saved_state_from_report() {
        let mut report = RunReport::new();
        report.save_state(keys::BYPASS, true);
        report.set_output("triggered", false);
        let state = SavedState::from(&report);
        assert!(state.flag(keys::BYPASS));
        assert_eq!(state.get("triggered"), None);
    }
}
