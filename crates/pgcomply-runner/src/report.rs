//! Run report - aggregation of every assertion outcome in a run

use chrono::{DateTime, Utc};
use pgcomply_core::{AssertionOutcome, ControlRecord, ControlState, OutcomeKind, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate result of one run.
///
/// Records appear in catalog order and outcomes within a control in
/// arrival order, so a fixed catalog and input set yields an identical
/// report layout run to run. Every selected control contributes at least
/// one outcome; per-control errors never drop or duplicate records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub engine_version: String,
    /// Target label (host:port/dbname); never credentials
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub controls: Vec<ControlRecord>,
    pub summary: RunSummary,
}

/// Summary counts for the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_controls: usize,
    pub controls_completed: usize,
    pub controls_skipped: usize,
    pub controls_errored: usize,

    pub total_outcomes: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,

    /// Failed outcomes broken down by control severity
    pub failed_by_severity: SeverityCounts,
}

/// Counts keyed by severity tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl SeverityCounts {
    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
        }
    }
}

impl RunReport {
    /// Assemble a report from per-control records
    pub fn new(target: &str, started_at: DateTime<Utc>, controls: Vec<ControlRecord>) -> Self {
        let mut summary = RunSummary {
            total_controls: controls.len(),
            ..RunSummary::default()
        };

        for record in &controls {
            match record.state {
                ControlState::Completed => summary.controls_completed += 1,
                ControlState::Skipped => summary.controls_skipped += 1,
                ControlState::Errored => summary.controls_errored += 1,
            }
            for outcome in &record.outcomes {
                summary.total_outcomes += 1;
                match outcome.kind {
                    OutcomeKind::Pass => summary.passed += 1,
                    OutcomeKind::Fail => {
                        summary.failed += 1;
                        summary.failed_by_severity.bump(outcome.severity);
                    }
                    OutcomeKind::Skip => summary.skipped += 1,
                    OutcomeKind::Error => summary.errored += 1,
                }
            }
        }

        Self {
            run_id: Uuid::new_v4(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            target: target.to_string(),
            started_at,
            finished_at: Utc::now(),
            controls,
            summary,
        }
    }

    /// Every outcome in report order
    pub fn outcomes(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.controls.iter().flat_map(|r| r.outcomes.iter())
    }

    /// Outcomes for one control
    pub fn outcomes_for(&self, control_id: &str) -> Vec<&AssertionOutcome> {
        self.outcomes()
            .filter(|o| o.control_id == control_id)
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errored > 0
    }

    /// Serialize for downstream consumption
    pub fn to_json(&self) -> pgcomply_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgcomply_core::ControlDefinition;

    fn control(id: &str, severity: &str) -> ControlDefinition {
        serde_yaml::from_str(&format!(
            "id: \"{}\"\ntitle: \"t\"\nseverity: {}",
            id, severity
        ))
        .unwrap()
    }

    fn record(state: ControlState, outcomes: Vec<AssertionOutcome>) -> ControlRecord {
        ControlRecord {
            control_id: outcomes
                .first()
                .map(|o| o.control_id.clone())
                .unwrap_or_default(),
            state,
            outcomes,
        }
    }

    #[test]
    fn test_summary_counts() {
        let high = control("V-1", "high");
        let medium = control("V-2", "medium");

        let report = RunReport::new(
            "db01:5432/postgres",
            Utc::now(),
            vec![
                record(
                    ControlState::Completed,
                    vec![
                        AssertionOutcome::pass(&high, "a", "on"),
                        AssertionOutcome::fail(&high, "b", "off", "on"),
                    ],
                ),
                record(
                    ControlState::Skipped,
                    vec![AssertionOutcome::skip(&medium, "manual check")],
                ),
                record(
                    ControlState::Errored,
                    vec![AssertionOutcome::error(&medium, "c", "connection refused")],
                ),
            ],
        );

        assert_eq!(report.summary.total_controls, 3);
        assert_eq!(report.summary.controls_completed, 1);
        assert_eq!(report.summary.controls_skipped, 1);
        assert_eq!(report.summary.controls_errored, 1);
        assert_eq!(report.summary.total_outcomes, 4);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.errored, 1);
        assert_eq!(report.summary.failed_by_severity.high, 1);
        assert_eq!(report.summary.failed_by_severity.medium, 0);

        // Total outcome count >= total control count
        assert!(report.summary.total_outcomes >= report.summary.total_controls);
        assert!(report.has_failures());
        assert!(report.has_errors());
    }

    #[test]
    fn test_json_round_trip() {
        let c = control("V-1", "low");
        let report = RunReport::new(
            "db01:5432/postgres",
            Utc::now(),
            vec![record(
                ControlState::Completed,
                vec![AssertionOutcome::pass(&c, "ssl", "on")],
            )],
        );

        let json = report.to_json().unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summary, report.summary);
        assert_eq!(parsed.controls.len(), 1);
    }

    #[test]
    fn test_outcomes_for() {
        let c = control("V-1", "low");
        let report = RunReport::new(
            "t",
            Utc::now(),
            vec![record(
                ControlState::Completed,
                vec![
                    AssertionOutcome::pass(&c, "a", "x"),
                    AssertionOutcome::fail(&c, "b", "y", "z"),
                ],
            )],
        );
        assert_eq!(report.outcomes_for("V-1").len(), 2);
        assert!(report.outcomes_for("V-9").is_empty());
    }
}
