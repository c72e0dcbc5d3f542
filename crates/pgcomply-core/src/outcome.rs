//! Assertion outcomes - the typed result of evaluating one expectation

use crate::control::ControlDefinition;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result tag for one evaluated expectation.
///
/// `Error` means the probe/operation itself could not be completed;
/// `Fail` means the probe succeeded and the value mismatched. The two are
/// never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Pass,
    Fail,
    Skip,
    Error,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pass => "pass",
            OutcomeKind::Fail => "fail",
            OutcomeKind::Skip => "skip",
            OutcomeKind::Error => "error",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One evaluated expectation, ready for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionOutcome {
    /// Control that produced this outcome
    pub control_id: String,

    /// Severity inherited from the control
    pub severity: Severity,

    /// What was checked
    pub description: String,

    /// Rendered expected value (empty for skip/error outcomes)
    #[serde(default)]
    pub expected: String,

    /// Rendered observed value
    #[serde(default)]
    pub actual: String,

    pub kind: OutcomeKind,

    /// Mandatory for skip outcomes; carries the error message for errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

impl AssertionOutcome {
    pub fn pass(control: &ControlDefinition, description: &str, actual: &str) -> Self {
        Self::new(control, description, OutcomeKind::Pass)
            .with_actual(actual)
    }

    pub fn fail(
        control: &ControlDefinition,
        description: &str,
        actual: &str,
        expected: &str,
    ) -> Self {
        let mut outcome = Self::new(control, description, OutcomeKind::Fail).with_actual(actual);
        outcome.expected = expected.to_string();
        outcome
    }

    /// Skip outcomes always carry a human-readable justification
    pub fn skip(control: &ControlDefinition, reason: &str) -> Self {
        let mut outcome = Self::new(control, &control.title, OutcomeKind::Skip);
        outcome.reason = Some(reason.to_string());
        outcome
    }

    pub fn error(control: &ControlDefinition, description: &str, message: &str) -> Self {
        let mut outcome = Self::new(control, description, OutcomeKind::Error);
        outcome.reason = Some(message.to_string());
        outcome
    }

    fn new(control: &ControlDefinition, description: &str, kind: OutcomeKind) -> Self {
        Self {
            control_id: control.id.clone(),
            severity: control.severity,
            description: description.to_string(),
            expected: String::new(),
            actual: String::new(),
            kind,
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    fn with_actual(mut self, actual: &str) -> Self {
        self.actual = actual.to_string();
        self
    }

    pub fn with_expected(mut self, expected: &str) -> Self {
        self.expected = expected.to_string();
        self
    }
}

/// Terminal state of one control's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    /// All declared checks ran to completion, pass or fail
    Completed,
    /// The control declared itself inapplicable
    Skipped,
    /// Input resolution or an unrecoverable probe failure stopped the control
    Errored,
}

/// A control's terminal state plus every outcome it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRecord {
    pub control_id: String,
    pub state: ControlState,
    pub outcomes: Vec<AssertionOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ControlDefinition {
        serde_yaml::from_str(
            r#"
id: "V-73049"
title: "max_connections must be limited"
severity: medium
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fail_carries_expected_and_actual() {
        let outcome = AssertionOutcome::fail(&control(), "max_connections", "150", "<= 100");
        assert_eq!(outcome.kind, OutcomeKind::Fail);
        assert_eq!(outcome.actual, "150");
        assert_eq!(outcome.expected, "<= 100");
        assert_eq!(outcome.severity, Severity::Medium);
    }

    #[test]
    fn test_skip_requires_reason() {
        let outcome = AssertionOutcome::skip(&control(), "manual check");
        assert_eq!(outcome.kind, OutcomeKind::Skip);
        assert_eq!(outcome.reason.as_deref(), Some("manual check"));
    }

    #[test]
    fn test_error_is_not_fail() {
        let outcome = AssertionOutcome::error(&control(), "query", "connection refused");
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert_ne!(outcome.kind, OutcomeKind::Fail);
    }
}
