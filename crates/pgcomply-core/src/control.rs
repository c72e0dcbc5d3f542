//! Control definitions - the declarative form of one compliance rule
//!
//! A control is data, not code: identifier, metadata, the inputs it
//! depends on, and an ordered list of checks. Each check pairs a probe
//! request (what to observe on the target) with an expectation (what the
//! observation must look like). The evaluator interprets these records;
//! nothing here executes.

use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One compliance rule from the catalog. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlDefinition {
    /// Stable identifier (e.g., "V-72841")
    pub id: String,

    /// Human-readable title
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub severity: Severity,

    /// Metadata tags (framework refs, topic groupings); insertion order irrelevant
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,

    /// Names of the configuration inputs this control depends on
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Present when the control opts out of automated evaluation entirely
    #[serde(default)]
    pub skip: Option<SkipGate>,

    /// Ordered checks; later checks may depend on earlier probe effects
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

impl ControlDefinition {
    /// Whether the control carries a given tag value
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags
            .get(key)
            .map(|vals| vals.iter().any(|v| v == value))
            .unwrap_or(false)
    }

    /// Every input name referenced by this control: declared list plus any
    /// names used in probe params or expectation values.
    pub fn referenced_inputs(&self) -> Vec<String> {
        let mut names = self.inputs.clone();
        for check in &self.checks {
            check.probe.collect_input_refs(&mut names);
            check.expect.collect_input_refs(&mut names);
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Declares a control skipped, with the justification that goes in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipGate {
    pub reason: String,
}

/// One assertion: a probe request plus the expectation on its observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    /// What is being verified, in report-ready form
    pub description: String,

    pub probe: ProbeRequest,

    pub expect: Expectation,
}

/// A request to the System Probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProbeRequest {
    /// Parameterized SQL against the control's database session. Dynamic
    /// values are always bound parameters, never spliced into the text.
    Query {
        sql: String,
        #[serde(default)]
        params: Vec<ParamSpec>,
        #[serde(default)]
        extract: Extract,
    },
    /// Filesystem metadata lookup
    Stat { path: String, field: StatField },
    /// External command with a bounded timeout
    Exec {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        capture: Capture,
    },
    /// Field lookup in a key=value configuration file (postgresql.conf grammar)
    ConfigValue { file: String, key: String },
}

impl ProbeRequest {
    fn collect_input_refs(&self, out: &mut Vec<String>) {
        if let ProbeRequest::Query { params, .. } = self {
            for param in params {
                if let ParamSpec::Input { input } = param {
                    out.push(input.clone());
                }
            }
        }
    }

    /// Short label for log messages
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeRequest::Query { .. } => "query",
            ProbeRequest::Stat { .. } => "stat",
            ProbeRequest::Exec { .. } => "exec",
            ProbeRequest::ConfigValue { .. } => "config-value",
        }
    }
}

/// A bound query parameter: a literal, or a reference to a named input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    Input { input: String },
    Literal { value: serde_yaml::Value },
}

/// What to extract from a query result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Extract {
    /// First column of the first row (absent when the result is empty)
    #[default]
    Scalar,
    /// First column of every row, as a list
    Column,
    /// Number of rows returned
    RowCount,
}

/// Which piece of file metadata to observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatField {
    Exists,
    IsDirectory,
    Mode,
    Owner,
    Group,
}

/// Which command output stream to observe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capture {
    #[default]
    Stdout,
    Stderr,
    ExitCode,
}

/// An expected value: a literal, or a reference to a named input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Input { input: String },
    Literal(serde_yaml::Value),
}

impl ValueSpec {
    fn collect_input_refs(&self, out: &mut Vec<String>) {
        if let ValueSpec::Input { input } = self {
            out.push(input.clone());
        }
    }
}

/// Comparison type for an expectation. Coercion is centralized in the
/// evaluator; string "0" and integer 0 are distinct, and "0700" compares
/// as permission bits only under `octal-mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueType {
    #[default]
    String,
    Integer,
    Boolean,
    OctalMode,
    StringList,
}

/// An expectation on an observed value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Expectation {
    Equals {
        value: ValueSpec,
        #[serde(default)]
        value_type: ValueType,
    },
    NotEquals {
        value: ValueSpec,
        #[serde(default)]
        value_type: ValueType,
    },
    /// Regex match on the textual observation
    Matches { pattern: String },
    NotEmpty,
    Lt {
        value: ValueSpec,
        #[serde(default = "integer_type")]
        value_type: ValueType,
    },
    Le {
        value: ValueSpec,
        #[serde(default = "integer_type")]
        value_type: ValueType,
    },
    Gt {
        value: ValueSpec,
        #[serde(default = "integer_type")]
        value_type: ValueType,
    },
    Ge {
        value: ValueSpec,
        #[serde(default = "integer_type")]
        value_type: ValueType,
    },
    /// Observed scalar is one of the given values
    MemberOf { values: ValueSpec },
    /// Observed list is contained in the given set
    SubsetOf { values: ValueSpec },
    /// OR-group: passes when any alternative passes
    AnyOf { alternatives: Vec<Expectation> },
}

fn integer_type() -> ValueType {
    ValueType::Integer
}

impl Expectation {
    fn collect_input_refs(&self, out: &mut Vec<String>) {
        match self {
            Expectation::Equals { value, .. }
            | Expectation::NotEquals { value, .. }
            | Expectation::Lt { value, .. }
            | Expectation::Le { value, .. }
            | Expectation::Gt { value, .. }
            | Expectation::Ge { value, .. }
            | Expectation::MemberOf { values: value }
            | Expectation::SubsetOf { values: value } => value.collect_input_refs(out),
            Expectation::AnyOf { alternatives } => {
                for alt in alternatives {
                    alt.collect_input_refs(out);
                }
            }
            Expectation::Matches { .. } | Expectation::NotEmpty => {}
        }
    }

    /// Every regex pattern in this expectation tree, for static validation
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            Expectation::Matches { pattern } => vec![pattern.as_str()],
            Expectation::AnyOf { alternatives } => {
                alternatives.iter().flat_map(|a| a.patterns()).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_yaml() {
        let yaml = r#"
id: "V-72841"
title: "The audit log directory must be owned by the database owner"
severity: medium
tags:
  framework: ["DISA-STIG"]
  topic: ["auditing"]
inputs:
  - pg_data_dir
  - pg_owner
checks:
  - description: "audit log directory owner"
    probe:
      type: stat
      path: "/var/lib/pgsql/9.5/data/pg_log"
      field: owner
    expect:
      type: equals
      value: { input: pg_owner }
"#;

        let control: ControlDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(control.id, "V-72841");
        assert_eq!(control.severity, Severity::Medium);
        assert!(control.has_tag("framework", "DISA-STIG"));
        assert!(!control.has_tag("framework", "CIS"));
        assert_eq!(control.checks.len(), 1);

        let refs = control.referenced_inputs();
        assert_eq!(refs, vec!["pg_data_dir".to_string(), "pg_owner".to_string()]);
    }

    #[test]
    fn test_parse_query_with_bound_params() {
        let yaml = r#"
description: "role must not be superuser"
probe:
  type: query
  sql: "SELECT rolsuper FROM pg_roles WHERE rolname = $1"
  params:
    - { input: pg_owner }
    - { value: 42 }
  extract: scalar
expect:
  type: equals
  value: "false"
  value_type: string
"#;

        let check: CheckSpec = serde_yaml::from_str(yaml).unwrap();
        match &check.probe {
            ProbeRequest::Query { params, extract, .. } => {
                assert_eq!(params.len(), 2);
                assert!(matches!(&params[0], ParamSpec::Input { input } if input == "pg_owner"));
                assert!(matches!(&params[1], ParamSpec::Literal { .. }));
                assert_eq!(*extract, Extract::Scalar);
            }
            other => panic!("unexpected probe: {:?}", other),
        }
    }

    #[test]
    fn test_parse_or_group() {
        let yaml = r#"
type: any-of
alternatives:
  - type: matches
    pattern: "^hostssl"
  - type: equals
    value: "cert"
"#;

        let expect: Expectation = serde_yaml::from_str(yaml).unwrap();
        match &expect {
            Expectation::AnyOf { alternatives } => assert_eq!(alternatives.len(), 2),
            other => panic!("unexpected expectation: {:?}", other),
        }
        assert_eq!(expect.patterns(), vec!["^hostssl"]);
    }

    #[test]
    fn test_skip_gate_parses() {
        let yaml = r#"
id: "V-72879"
title: "Organization-defined audit review"
skip:
  reason: "manual/organizational check; not automatable"
"#;

        let control: ControlDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(control.skip.is_some());
        assert!(control.checks.is_empty());
    }
}
