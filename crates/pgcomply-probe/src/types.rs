//! Probe result types and the observations extracted from them

use pgcomply_core::{Capture, Extract, StatField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A value observed on the target, as fed to the assertion evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Observed {
    Text(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    /// Nothing to observe: empty query result, NULL scalar, missing path
    Absent,
}

impl Observed {
    /// Render for report output
    pub fn render(&self) -> String {
        match self {
            Observed::Text(s) => s.clone(),
            Observed::Int(i) => i.to_string(),
            Observed::Bool(b) => b.to_string(),
            Observed::List(items) => items.join(", "),
            Observed::Absent => String::from("<absent>"),
        }
    }
}

impl std::fmt::Display for Observed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Rows returned by a parameterized query. Cells are rendered to text by
/// the driver layer; NULL stays distinguishable from the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryRows {
    pub fn new(rows: Vec<Vec<Option<String>>>) -> Self {
        Self { rows }
    }

    /// Convenience for scripting single-column results
    pub fn column(values: &[&str]) -> Self {
        Self {
            rows: values.iter().map(|v| vec![Some(v.to_string())]).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Apply the check's extract selector
    pub fn extract(&self, extract: Extract) -> Observed {
        match extract {
            Extract::Scalar => match self.rows.first().and_then(|r| r.first()) {
                Some(Some(value)) => Observed::Text(value.clone()),
                _ => Observed::Absent,
            },
            Extract::Column => Observed::List(
                self.rows
                    .iter()
                    .filter_map(|r| r.first().cloned().flatten())
                    .collect(),
            ),
            Extract::RowCount => Observed::Int(self.rows.len() as i64),
        }
    }
}

/// Filesystem metadata for one path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub exists: bool,
    pub is_directory: bool,
    /// Permission bits masked to 0o7777
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

impl FileMeta {
    /// Apply the check's stat field selector
    pub fn field(&self, field: StatField) -> Observed {
        match field {
            StatField::Exists => Observed::Bool(self.exists),
            StatField::IsDirectory => Observed::Bool(self.is_directory),
            StatField::Mode => Observed::Text(format!("{:04o}", self.mode)),
            StatField::Owner => Observed::Text(self.owner.clone()),
            StatField::Group => Observed::Text(self.group.clone()),
        }
    }
}

/// An external command to execute, with its bounded timeout
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// One-line rendering for log and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Apply the check's capture selector. Exit status alone is never
    /// trusted as a pass; callers assert on whichever stream matters.
    pub fn capture(&self, capture: Capture) -> Observed {
        match capture {
            Capture::Stdout => Observed::Text(self.stdout.trim_end().to_string()),
            Capture::Stderr => Observed::Text(self.stderr.trim_end().to_string()),
            Capture::ExitCode => Observed::Int(self.exit_code as i64),
        }
    }
}

/// Parsed key=value configuration file
pub type ConfigMap = BTreeMap<String, String>;
