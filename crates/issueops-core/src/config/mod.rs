//! Configuration loading
//!
//! Layers, lowest precedence first:
//! - built-in defaults
//! - an optional `issueops.toml` file
//! - workflow inputs exported as `INPUT_<NAME>` environment variables

pub mod parser;
pub mod schema;

use std::path::{Path, PathBuf};

pub use parser::{parse_config_file, parse_config_str};
pub use schema::{ActionConfig, DEFAULT_API_URL, RequiredContexts};

/// Default config file location (`~/.config/issueops/issueops.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("issueops").join("issueops.toml"))
}

/// Load the effective configuration.
///
/// `path` is read when given; otherwise the default location is used if it
/// exists. `lookup` resolves environment variables and is injected so the
/// caller decides where inputs come from.
pub fn load<F>(path: Option<&Path>, lookup: F) -> anyhow::Result<ActionConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => parse_config_file(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(default_path) => parse_config_file(&default_path)?,
            None => ActionConfig::default(),
        },
    };

    config.apply_inputs(lookup)?;
    config.validate()?;
    Ok(config)
}

/// API token for the run. Never read from the config file.
pub fn github_token<F>(lookup: F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    // unset inputs arrive as empty strings
    let non_blank = |key: &str| {
        lookup(key)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    };
    non_blank("INPUT_GITHUB_TOKEN")
        .or_else(|| non_blank("GITHUB_TOKEN"))
        .ok_or_else(|| {
            anyhow::anyhow!("No GitHub token found: set the github_token input or GITHUB_TOKEN")
        })
}
