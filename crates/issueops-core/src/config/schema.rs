//! Configuration schema for the deployment coordinator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lock::GLOBAL_ENVIRONMENT;

/// Default GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Recognized options for one coordinator run.
///
/// Every field has a default so a TOML file only needs to name what it
/// changes; workflow inputs are layered on top by [`ActionConfig::apply_inputs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Trigger for deployments, e.g. `.deploy`
    pub trigger: String,

    /// Trigger for the lock family (lock, unlock, lock info)
    pub lock_trigger: String,

    /// Shorthand that asks where a deployment is currently possible
    pub lock_info_alias: String,

    /// Marker that turns a deploy into a noop deploy
    pub noop_trigger: String,

    /// Environment used when a command names none
    pub environment: String,

    /// Environments a command may target. Empty accepts any name.
    pub environment_targets: Vec<String>,

    /// Stable/base branch; `.deploy <stable_branch>` deploys it directly
    pub stable_branch: String,

    /// Status contexts the deployment API must verify
    pub required_contexts: RequiredContexts,

    /// Reaction added to the triggering comment
    pub reaction: String,

    /// Require the trigger to start the comment
    pub prefix_only: bool,

    /// GitHub REST API base URL
    pub github_api_url: String,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            trigger: ".deploy".to_string(),
            lock_trigger: ".lock".to_string(),
            lock_info_alias: ".wcid".to_string(),
            noop_trigger: "noop".to_string(),
            environment: "production".to_string(),
            environment_targets: vec![
                "production".to_string(),
                "development".to_string(),
                "staging".to_string(),
            ],
            stable_branch: "main".to_string(),
            required_contexts: RequiredContexts::Disabled,
            reaction: "eyes".to_string(),
            prefix_only: true,
            github_api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl ActionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trigger.trim().is_empty() {
            anyhow::bail!("trigger must not be empty");
        }
        if self.lock_trigger.trim().is_empty() {
            anyhow::bail!("lock_trigger must not be empty");
        }
        if self.trigger == self.lock_trigger {
            anyhow::bail!(
                "trigger and lock_trigger must differ (both are '{}')",
                self.trigger
            );
        }
        if self.noop_trigger.trim().is_empty() {
            anyhow::bail!("noop_trigger must not be empty");
        }
        if self.environment.trim().is_empty() {
            anyhow::bail!("environment must not be empty");
        }
        if let Some(reserved) = self
            .environment_targets
            .iter()
            .chain(std::iter::once(&self.environment))
            .find(|env| env.eq_ignore_ascii_case(GLOBAL_ENVIRONMENT))
        {
            anyhow::bail!(
                "'{}' is reserved for the global lock and cannot be an environment",
                reserved
            );
        }
        if !self.environment_targets.is_empty()
            && !self.environment_targets.contains(&self.environment)
        {
            anyhow::bail!(
                "default environment '{}' is not listed in environment_targets ({})",
                self.environment,
                self.environment_targets.join(", ")
            );
        }
        url::Url::parse(&self.github_api_url)
            .map_err(|e| anyhow::anyhow!("Invalid github_api_url '{}': {}", self.github_api_url, e))?;
        Ok(())
    }

    /// Overlay workflow inputs (`INPUT_<NAME>` variables) on this config.
    ///
    /// Empty values are ignored: the runner exports unset inputs as empty strings.
    pub fn apply_inputs<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input = |name: &str| {
            lookup(&format!("INPUT_{}", name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = input("TRIGGER") {
            self.trigger = v;
        }
        if let Some(v) = input("LOCK_TRIGGER") {
            self.lock_trigger = v;
        }
        if let Some(v) = input("LOCK_INFO_ALIAS") {
            self.lock_info_alias = v;
        }
        if let Some(v) = input("NOOP_TRIGGER") {
            self.noop_trigger = v;
        }
        if let Some(v) = input("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = input("ENVIRONMENT_TARGETS") {
            self.environment_targets = split_list(&v);
        }
        if let Some(v) = input("STABLE_BRANCH") {
            self.stable_branch = v;
        }
        if let Some(v) = input("REQUIRED_CONTEXTS") {
            self.required_contexts = v.parse()?;
        }
        if let Some(v) = input("REACTION") {
            self.reaction = v;
        }
        if let Some(v) = input("PREFIX_ONLY") {
            self.prefix_only = parse_bool("prefix_only", &v)?;
        }
        if let Some(v) = lookup("GITHUB_API_URL").filter(|v| !v.trim().is_empty()) {
            self.github_api_url = v.trim().to_string();
        }
        Ok(())
    }
}

/// Status contexts handed to the deployment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequiredContexts {
    /// Skip commit status verification on deployment creation
    Disabled,
    /// Only these contexts must pass
    Only(Vec<String>),
}

impl FromStr for RequiredContexts {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "false" || trimmed == "disabled" {
            return Ok(RequiredContexts::Disabled);
        }
        let contexts = split_list(trimmed);
        if contexts.is_empty() {
            anyhow::bail!("required_contexts has no context names: '{}'", s);
        }
        Ok(RequiredContexts::Only(contexts))
    }
}

impl TryFrom<String> for RequiredContexts {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequiredContexts> for String {
    fn from(value: RequiredContexts) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RequiredContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredContexts::Disabled => f.write_str("false"),
            RequiredContexts::Only(contexts) => f.write_str(&contexts.join(",")),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => anyhow::bail!("{} must be 'true' or 'false', got '{}'", name, value),
    }
}
