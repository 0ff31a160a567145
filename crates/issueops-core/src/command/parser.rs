//! Comment body parser.
//!
//! Classifies a trimmed comment into at most one command. Trigger detection
//! is substring based so that a comment naming two different commands is
//! rejected instead of silently running the first one.

use std::ops::Range;

use thiserror::Error;

use super::{Command, CommandKind};
use crate::config::ActionConfig;

/// Flags recognized after the lock trigger.
const LOCK_FLAGS: &[&str] = &[
    "--reason",
    "--global",
    "-g",
    "--no-sticky",
    "--release",
    "--remove",
    "-r",
    "--info",
    "-d",
    "--force",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("IssueOps message contains multiple commands, only one is allowed")]
    MultipleCommands,

    #[error("No environment named `{name}` is configured. Valid environments: {valid}")]
    UnknownEnvironment { name: String, valid: String },

    #[error("Unknown flag `{0}`")]
    UnknownFlag(String),
}

/// Parser built from the trigger configuration of a run.
#[derive(Debug, Clone)]
pub struct CommandParser {
    deploy_trigger: String,
    lock_trigger: String,
    lock_info_alias: String,
    noop_trigger: String,
    default_environment: String,
    environment_targets: Vec<String>,
    stable_branch: String,
    prefix_only: bool,
}

impl CommandParser {
    pub fn from_config(config: &ActionConfig) -> Self {
        Self {
            deploy_trigger: config.trigger.trim().to_string(),
            lock_trigger: config.lock_trigger.trim().to_string(),
            lock_info_alias: config.lock_info_alias.trim().to_string(),
            noop_trigger: config.noop_trigger.trim().to_string(),
            default_environment: config.environment.clone(),
            environment_targets: config.environment_targets.clone(),
            stable_branch: config.stable_branch.clone(),
            prefix_only: config.prefix_only,
        }
    }

    /// Parse a comment body.
    ///
    /// Returns a [`CommandKind::None`] command when no trigger applies and
    /// [`ParseError::MultipleCommands`] when more than one distinct trigger
    /// appears anywhere in the body.
    pub fn parse(&self, body: &str) -> Result<Command, ParseError> {
        let body = body.trim();
        let triggers = self.triggers();

        let matched: Vec<(CommandKind, &str, Vec<Range<usize>>)> = triggers
            .iter()
            .map(|(kind, trigger)| (*kind, *trigger, standalone(body, trigger, &triggers)))
            .filter(|(_, _, ranges)| !ranges.is_empty())
            .collect();

        let (kind, trigger, ranges) = match matched.as_slice() {
            [] => return Ok(Command::none(body)),
            [single] => single,
            _ => return Err(ParseError::MultipleCommands),
        };

        if self.prefix_only && !body.starts_with(trigger) {
            return Ok(Command::none(body));
        }
        let start = if self.prefix_only {
            Some(0)
        } else {
            ranges
                .iter()
                .map(|range| range.start)
                .find(|start| ends_word(&body[start + trigger.len()..]))
        };
        // `.deployment` is not `.deploy`
        let Some(rest) = start
            .map(|start| &body[start + trigger.len()..])
            .filter(|rest| ends_word(rest))
        else {
            return Ok(Command::none(body));
        };

        match *kind {
            CommandKind::Deploy => self.parse_deploy(body, rest),
            CommandKind::Lock => self.parse_lock(body, rest),
            CommandKind::LockInfo => {
                let mut command = self.parse_lock(body, rest)?;
                command.kind = CommandKind::LockInfo;
                Ok(command)
            }
            CommandKind::Unlock | CommandKind::None => Ok(Command::none(body)),
        }
    }

    fn triggers(&self) -> Vec<(CommandKind, &str)> {
        [
            (CommandKind::Deploy, self.deploy_trigger.as_str()),
            (CommandKind::Lock, self.lock_trigger.as_str()),
            (CommandKind::LockInfo, self.lock_info_alias.as_str()),
        ]
        .into_iter()
        .filter(|(_, trigger)| !trigger.is_empty())
        .collect()
    }

    fn parse_deploy(&self, body: &str, rest: &str) -> Result<Command, ParseError> {
        let mut command = Command::new(CommandKind::Deploy, body);

        for token in rest.split_whitespace() {
            if token == self.noop_trigger {
                command.noop = true;
            } else if token == "to" {
                continue;
            } else if token == self.stable_branch {
                command.stable_branch = true;
            } else if token.starts_with('-') {
                return Err(ParseError::UnknownFlag(token.to_string()));
            } else {
                command.environment = Some(self.environment(token)?);
            }
        }

        command
            .environment
            .get_or_insert_with(|| self.default_environment.clone());
        Ok(command)
    }

    fn parse_lock(&self, body: &str, rest: &str) -> Result<Command, ParseError> {
        let mut command = Command::new(CommandKind::Lock, body);
        let mut release = false;
        let mut info = false;

        let mut tokens = rest.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            match token {
                "--reason" => {
                    let mut words = Vec::new();
                    while let Some(next) = tokens.next_if(|t| !LOCK_FLAGS.contains(t)) {
                        words.push(next);
                    }
                    if !words.is_empty() {
                        command.reason = Some(words.join(" "));
                    }
                }
                "--global" | "-g" => command.is_global = true,
                "--no-sticky" => command.sticky = false,
                "--release" | "--remove" | "-r" => release = true,
                "--info" | "-d" => info = true,
                "--force" => command.force = true,
                flag if flag.starts_with('-') => {
                    return Err(ParseError::UnknownFlag(flag.to_string()));
                }
                env => command.environment = Some(self.environment(env)?),
            }
        }

        command.kind = if info {
            CommandKind::LockInfo
        } else if release {
            CommandKind::Unlock
        } else {
            CommandKind::Lock
        };
        command
            .environment
            .get_or_insert_with(|| self.default_environment.clone());
        Ok(command)
    }

    fn environment(&self, token: &str) -> Result<String, ParseError> {
        if self.environment_targets.is_empty()
            || self.environment_targets.iter().any(|t| t == token)
        {
            return Ok(token.to_string());
        }
        Err(ParseError::UnknownEnvironment {
            name: token.to_string(),
            valid: self.environment_targets.join(", "),
        })
    }
}

fn occurrences<'a>(body: &'a str, pattern: &'a str) -> impl Iterator<Item = Range<usize>> + 'a {
    body.match_indices(pattern)
        .map(|(start, m)| start..start + m.len())
}

/// Occurrences of `trigger` that are not part of a longer trigger.
fn standalone(body: &str, trigger: &str, triggers: &[(CommandKind, &str)]) -> Vec<Range<usize>> {
    let shadowing: Vec<Range<usize>> = triggers
        .iter()
        .filter(|(_, other)| other.len() > trigger.len() && other.contains(trigger))
        .flat_map(|(_, other)| occurrences(body, other))
        .collect();

    occurrences(body, trigger)
        .filter(|range| {
            !shadowing
                .iter()
                .any(|outer| outer.start <= range.start && range.end <= outer.end)
        })
        .collect()
}

fn ends_word(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::from_config(&ActionConfig::default())
    }

    fn substring_parser() -> CommandParser {
        CommandParser::from_config(&ActionConfig {
            prefix_only: false,
            ..ActionConfig::default()
        })
    }

    #[test]
    fn test_parse_plain_deploy() {
        let command = parser().parse(".deploy").unwrap();
        assert_eq!(command.kind, CommandKind::Deploy);
        assert!(!command.noop);
        assert_eq!(command.environment.as_deref(), Some("production"));
        assert_eq!(command.raw_body, ".deploy");
    }

    #[test]
    fn test_parse_noop_deploy() {
        let command = parser().parse(".deploy noop").unwrap();
        assert_eq!(command.kind, CommandKind::Deploy);
        assert!(command.noop);
    }

    #[test]
    fn test_trailing_whitespace_is_trimmed() {
        let messy = parser().parse(".deploy noop    \n\t\n   ").unwrap();
        let clean = parser().parse(".deploy noop").unwrap();
        assert_eq!(messy, clean);
        assert_eq!(messy.raw_body, ".deploy noop");
    }

    #[test]
    fn test_parse_deploy_environment() {
        let command = parser().parse(".deploy to staging").unwrap();
        assert_eq!(command.environment.as_deref(), Some("staging"));

        let command = parser().parse(".deploy noop development").unwrap();
        assert!(command.noop);
        assert_eq!(command.environment.as_deref(), Some("development"));
    }

    #[test]
    fn test_parse_stable_branch_deploy() {
        let command = parser().parse(".deploy main").unwrap();
        assert!(command.stable_branch);
        assert_eq!(command.environment.as_deref(), Some("production"));
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let err = parser().parse(".deploy to mars").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownEnvironment {
                name: "mars".to_string(),
                valid: "production, development, staging".to_string(),
            }
        );
    }

    #[test]
    fn test_multiple_commands_rejected() {
        let err = substring_parser().parse(".deploy .lock").unwrap_err();
        assert_eq!(err, ParseError::MultipleCommands);
        assert_eq!(
            err.to_string(),
            "IssueOps message contains multiple commands, only one is allowed"
        );

        // detection does not depend on prefix matching
        assert_eq!(
            parser().parse(".deploy .lock").unwrap_err(),
            ParseError::MultipleCommands
        );
        assert_eq!(
            substring_parser().parse("please .wcid and .deploy").unwrap_err(),
            ParseError::MultipleCommands
        );
    }

    #[test]
    fn test_no_trigger_yields_none() {
        let command = parser().parse("looks good to me").unwrap();
        assert!(command.is_none());
        assert_eq!(command.kind.output_type(), None);
    }

    #[test]
    fn test_prefix_only_requires_leading_trigger() {
        assert!(parser().parse("can we .deploy this?").unwrap().is_none());

        let command = substring_parser().parse("can we .deploy").unwrap();
        assert_eq!(command.kind, CommandKind::Deploy);
    }

    #[test]
    fn test_trigger_must_end_at_word_boundary() {
        assert!(parser().parse(".deployment is broken").unwrap().is_none());
        assert!(parser().parse(".locked").unwrap().is_none());
    }

    #[test]
    fn test_substring_trigger_skips_longer_words() {
        let command = substring_parser()
            .parse("see .deployment notes, then .deploy staging")
            .unwrap();
        assert_eq!(command.kind, CommandKind::Deploy);
        assert_eq!(command.environment.as_deref(), Some("staging"));

        assert!(substring_parser().parse("see .deployment notes").unwrap().is_none());
    }

    #[test]
    fn test_parse_lock_with_reason() {
        let command = parser().parse(".lock --reason testing a new feature").unwrap();
        assert_eq!(command.kind, CommandKind::Lock);
        assert!(command.sticky);
        assert!(!command.is_global);
        assert_eq!(command.reason.as_deref(), Some("testing a new feature"));
        assert_eq!(command.kind.output_type(), Some("lock"));
    }

    #[test]
    fn test_reason_stops_at_next_flag() {
        let command = parser()
            .parse(".lock --reason db migration --global")
            .unwrap();
        assert_eq!(command.reason.as_deref(), Some("db migration"));
        assert!(command.is_global);
    }

    #[test]
    fn test_parse_lock_flags() {
        let command = parser().parse(".lock staging --no-sticky").unwrap();
        assert_eq!(command.kind, CommandKind::Lock);
        assert!(!command.sticky);
        assert_eq!(command.environment.as_deref(), Some("staging"));

        let command = parser().parse(".lock -g").unwrap();
        assert!(command.is_global);
    }

    #[test]
    fn test_parse_unlock() {
        for body in [".lock --release", ".lock --remove", ".lock -r"] {
            let command = parser().parse(body).unwrap();
            assert_eq!(command.kind, CommandKind::Unlock, "body: {}", body);
            assert!(!command.force);
        }

        let command = parser().parse(".lock -r --global --force").unwrap();
        assert_eq!(command.kind, CommandKind::Unlock);
        assert!(command.is_global);
        assert!(command.force);
    }

    #[test]
    fn test_parse_lock_info() {
        let command = parser().parse(".lock --info staging").unwrap();
        assert_eq!(command.kind, CommandKind::LockInfo);
        assert_eq!(command.environment.as_deref(), Some("staging"));

        let command = parser().parse(".wcid").unwrap();
        assert_eq!(command.kind, CommandKind::LockInfo);
        assert_eq!(command.environment.as_deref(), Some("production"));
    }

    #[test]
    fn test_unknown_lock_flag() {
        assert_eq!(
            parser().parse(".lock --forever").unwrap_err(),
            ParseError::UnknownFlag("--forever".to_string())
        );
    }

    #[test]
    fn test_nested_triggers_do_not_collide() {
        let parser = CommandParser::from_config(&ActionConfig {
            lock_trigger: ".deploy-lock".to_string(),
            ..ActionConfig::default()
        });

        let command = parser.parse(".deploy-lock").unwrap();
        assert_eq!(command.kind, CommandKind::Lock);

        let command = parser.parse(".deploy").unwrap();
        assert_eq!(command.kind, CommandKind::Deploy);

        assert_eq!(
            parser.parse(".deploy-lock .deploy").unwrap_err(),
            ParseError::MultipleCommands
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = parser();
        let first = parser.parse(".lock --reason hotfix").unwrap();
        let second = parser.parse(".lock --reason hotfix").unwrap();
        assert_eq!(first, second);
    }
}
