//! GitHub Actions file-command writer.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use super::RunReport;

/// Writes a [`RunReport`] to the files named by `GITHUB_OUTPUT` and
/// `GITHUB_STATE`. Either may be absent when running outside a runner; its
/// entries are skipped then.
#[derive(Debug, Clone, Default)]
pub struct ActionsWriter {
    output_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
}

impl ActionsWriter {
    pub fn new(output_path: Option<PathBuf>, state_path: Option<PathBuf>) -> Self {
        Self {
            output_path,
            state_path,
        }
    }

    pub fn from_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self::new(path("GITHUB_OUTPUT"), path("GITHUB_STATE"))
    }

    pub fn write(&self, report: &RunReport) -> anyhow::Result<()> {
        if let Some(path) = &self.output_path {
            append_entries(path, report.outputs())?;
        }
        if let Some(path) = &self.state_path {
            append_entries(path, report.states())?;
        }
        if let Some(message) = report.failure() {
            println!("::error::{}", escape_data(message));
        }
        Ok(())
    }
}

fn append_entries<'a>(
    path: &Path,
    entries: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    for (name, value) in entries {
        file.write_all(format_entry(name, value).as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// `name<<DELIM\nvalue\nDELIM\n`, with a delimiter that cannot occur in
/// `value`.
fn format_entry(name: &str, value: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut delimiter = format!("ghadelimiter_{}", nanos);
    while value.contains(&delimiter) {
        delimiter.push('_');
    }
    format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter)
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
