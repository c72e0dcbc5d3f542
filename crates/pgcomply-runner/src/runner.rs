//! Control Runner - isolated, bounded execution of the selected catalog
//!
//! Per control the lifecycle is Pending -> InputsResolving -> Executing
//! -> {Completed, Skipped, Errored}. Nothing a control does crosses its
//! own boundary: a mismatched assertion does not stop its sibling checks,
//! a dead connection does not stop sibling controls, and a dead control
//! never aborts the run.

use crate::eval::{self, ResolvedInputs};
use crate::inputs::InputResolver;
use crate::report::RunReport;
use chrono::Utc;
use pgcomply_core::{
    AssertionOutcome, CheckSpec, ControlDefinition, ControlRecord, ControlState, Error,
    InputValue, ParamSpec, ProbeRequest, Result, StatField,
};
use pgcomply_probe::{CommandSpec, DbSession, Observed, Probe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Runner limits and timeouts
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Upper bound on concurrently running controls; admission control
    /// against the number of sessions the target tolerates
    pub max_concurrent_sessions: usize,

    /// Default timeout for exec probes that do not declare their own
    pub exec_timeout_secs: u64,

    /// Optional run deadline. Reached, it stops dispatching new controls;
    /// in-flight controls finish so their records stay whole.
    pub deadline_secs: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            exec_timeout_secs: 30,
            deadline_secs: None,
        }
    }
}

/// Executes controls against one target through the System Probe
pub struct ControlRunner {
    probe: Arc<dyn Probe>,
    resolver: Arc<InputResolver>,
    settings: RunnerSettings,
}

impl ControlRunner {
    pub fn new(probe: Arc<dyn Probe>, resolver: Arc<InputResolver>) -> Self {
        Self {
            probe,
            resolver,
            settings: RunnerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the selected controls and aggregate the report.
    ///
    /// Every control in `controls` contributes at least one outcome to
    /// the report, including controls never dispatched because the
    /// deadline arrived first.
    pub async fn run(&self, controls: &[ControlDefinition], target_label: &str) -> RunReport {
        let started_at = Utc::now();
        info!(
            "run starting: {} controls against {} (max {} sessions)",
            controls.len(),
            target_label,
            self.settings.max_concurrent_sessions
        );

        let deadline = self
            .settings
            .deadline_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_sessions.max(1)));
        let mut join_set: JoinSet<(usize, ControlRecord)> = JoinSet::new();
        let mut slots: Vec<Option<ControlRecord>> = controls.iter().map(|_| None).collect();
        let mut dispatched = vec![false; controls.len()];

        for (idx, control) in controls.iter().enumerate() {
            let permit = match deadline {
                Some(deadline) => {
                    // timeout_at polls the acquire first, so a free permit
                    // would slip through after expiry without this check
                    if tokio::time::Instant::now() >= deadline {
                        warn!(
                            "run deadline reached; {} controls not dispatched",
                            controls.len() - idx
                        );
                        break;
                    }
                    match tokio::time::timeout_at(deadline, Arc::clone(&semaphore).acquire_owned())
                        .await
                    {
                        Ok(acquired) => acquired.ok(),
                        Err(_) => {
                            warn!(
                                "run deadline reached; {} controls not dispatched",
                                controls.len() - idx
                            );
                            break;
                        }
                    }
                }
                None => Arc::clone(&semaphore).acquire_owned().await.ok(),
            };
            let Some(permit) = permit else { break };

            dispatched[idx] = true;
            let probe = Arc::clone(&self.probe);
            let resolver = Arc::clone(&self.resolver);
            let control = control.clone();
            let exec_timeout = Duration::from_secs(self.settings.exec_timeout_secs);

            join_set.spawn(async move {
                let record =
                    run_control(probe.as_ref(), resolver.as_ref(), &control, exec_timeout).await;
                drop(permit);
                (idx, record)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, record)) => slots[idx] = Some(record),
                Err(e) => warn!("control task aborted: {}", e),
            }
        }

        // Completeness: fill a record for anything that produced none
        let records = controls
            .iter()
            .zip(slots)
            .zip(dispatched)
            .map(|((control, slot), was_dispatched)| {
                slot.unwrap_or_else(|| placeholder_record(control, was_dispatched))
            })
            .collect();

        let report = RunReport::new(target_label, started_at, records);
        info!(
            "run finished: {} passed, {} failed, {} skipped, {} errors",
            report.summary.passed,
            report.summary.failed,
            report.summary.skipped,
            report.summary.errored
        );
        report
    }
}

/// Record for a control that never produced one: deadline hit before
/// dispatch, or its task died. Either way it must not vanish from the
/// report.
fn placeholder_record(control: &ControlDefinition, was_dispatched: bool) -> ControlRecord {
    let message = if was_dispatched {
        "control task aborted before producing a record"
    } else {
        "run deadline reached before dispatch"
    };
    ControlRecord {
        control_id: control.id.clone(),
        state: ControlState::Errored,
        outcomes: vec![AssertionOutcome::error(control, &control.title, message)],
    }
}

/// Execute one control to its terminal state
async fn run_control(
    probe: &dyn Probe,
    resolver: &InputResolver,
    control: &ControlDefinition,
    exec_timeout: Duration,
) -> ControlRecord {
    // Skip gate: one skip outcome with its justification, no probe calls
    if let Some(gate) = &control.skip {
        debug!("control {}: skipped ({})", control.id, gate.reason);
        return ControlRecord {
            control_id: control.id.clone(),
            state: ControlState::Skipped,
            outcomes: vec![AssertionOutcome::skip(control, &gate.reason)],
        };
    }

    // A missing or mistyped input is a configuration problem, not
    // evidence the target fails the requirement: error, not fail.
    let inputs = match resolver.resolve_all(&control.referenced_inputs()) {
        Ok(inputs) => inputs,
        Err(e) => {
            warn!("control {}: input resolution failed: {}", control.id, e);
            return ControlRecord {
                control_id: control.id.clone(),
                state: ControlState::Errored,
                outcomes: vec![AssertionOutcome::error(
                    control,
                    &control.title,
                    &e.to_string(),
                )],
            };
        }
    };

    debug!("control {}: executing {} checks", control.id, control.checks.len());
    let mut guard = SessionGuard::default();
    let mut outcomes = Vec::with_capacity(control.checks.len());
    let mut state = ControlState::Completed;

    for check in &control.checks {
        match execute_check(probe, &mut guard, control, check, &inputs, exec_timeout).await {
            Ok(outcome) => outcomes.push(outcome),
            // Session never opened: the remaining checks cannot run
            Err(e) => {
                warn!("control {}: aborted: {}", control.id, e);
                outcomes.push(AssertionOutcome::error(
                    control,
                    &check.description,
                    &e.to_string(),
                ));
                state = ControlState::Errored;
                break;
            }
        }
    }

    // Single release point for every exit path out of the loop above
    guard.close(&control.id).await;

    ControlRecord {
        control_id: control.id.clone(),
        state,
        outcomes,
    }
}

/// Control-scoped database session: opened lazily on the first query,
/// closed exactly once when the control finishes.
#[derive(Default)]
struct SessionGuard {
    session: Option<Box<dyn DbSession>>,
}

impl SessionGuard {
    async fn session(&mut self, probe: &dyn Probe) -> Result<&mut Box<dyn DbSession>> {
        if self.session.is_none() {
            self.session = Some(probe.open_session().await?);
        }
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => Err(Error::Internal("session vanished after open".into())),
        }
    }

    async fn close(&mut self, control_id: &str) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("control {}: session close failed: {}", control_id, e);
            }
        }
    }
}

enum ObserveError {
    /// Could not open the control's session; aborts the control
    SessionOpen(Error),
    /// This probe operation failed; sibling checks still run
    Probe(Error),
}

/// Run one check. `Err` only for session-open failures; every other
/// problem is contained in the returned outcome.
async fn execute_check(
    probe: &dyn Probe,
    guard: &mut SessionGuard,
    control: &ControlDefinition,
    check: &CheckSpec,
    inputs: &ResolvedInputs,
    exec_timeout: Duration,
) -> Result<AssertionOutcome> {
    let observed = match observe(probe, guard, check, inputs, exec_timeout).await {
        Ok(observed) => observed,
        Err(ObserveError::SessionOpen(e)) => return Err(e),
        Err(ObserveError::Probe(e)) => {
            return Ok(AssertionOutcome::error(
                control,
                &check.description,
                &e.to_string(),
            ))
        }
    };

    match eval::evaluate(&check.expect, &observed, inputs) {
        Ok(v) if v.passed => {
            Ok(AssertionOutcome::pass(control, &check.description, &v.actual)
                .with_expected(&v.expected))
        }
        Ok(v) => Ok(AssertionOutcome::fail(
            control,
            &check.description,
            &v.actual,
            &v.expected,
        )),
        Err(e) => Ok(AssertionOutcome::error(
            control,
            &check.description,
            &e.to_string(),
        )),
    }
}

/// Gather the observation for one check
async fn observe(
    probe: &dyn Probe,
    guard: &mut SessionGuard,
    check: &CheckSpec,
    inputs: &ResolvedInputs,
    exec_timeout: Duration,
) -> std::result::Result<Observed, ObserveError> {
    match &check.probe {
        ProbeRequest::Query {
            sql,
            params,
            extract,
        } => {
            let bound = bind_params(params, inputs).map_err(ObserveError::Probe)?;
            let session = guard
                .session(probe)
                .await
                .map_err(ObserveError::SessionOpen)?;
            let rows = session
                .query(sql, &bound)
                .await
                .map_err(ObserveError::Probe)?;
            Ok(rows.extract(*extract))
        }
        ProbeRequest::Stat { path, field } => match probe.stat(path).await {
            Ok(meta) => Ok(meta.field(*field)),
            // Absence is an observation when the question is existence
            Err(Error::NotFound { .. }) if *field == StatField::Exists => {
                Ok(Observed::Bool(false))
            }
            Err(e) => Err(ObserveError::Probe(e)),
        },
        ProbeRequest::Exec {
            command,
            args,
            timeout_secs,
            capture,
        } => {
            let spec = CommandSpec {
                command: command.clone(),
                args: args.clone(),
                timeout: timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(exec_timeout),
            };
            let output = probe.exec(&spec).await.map_err(ObserveError::Probe)?;
            Ok(output.capture(*capture))
        }
        ProbeRequest::ConfigValue { file, key } => {
            let map = probe.read_config(file).await.map_err(ObserveError::Probe)?;
            Ok(map
                .get(key)
                .map(|v| Observed::Text(v.clone()))
                .unwrap_or(Observed::Absent))
        }
    }
}

/// Materialize bound parameters. Dynamic values only ever travel as
/// parameters; SQL text is fixed catalog data.
fn bind_params(params: &[ParamSpec], inputs: &ResolvedInputs) -> Result<Vec<InputValue>> {
    params
        .iter()
        .map(|param| match param {
            ParamSpec::Input { input } => inputs
                .get(input)
                .map(|v| v.as_ref().clone())
                .ok_or_else(|| Error::MissingInput {
                    name: input.clone(),
                }),
            ParamSpec::Literal { value } => yaml_to_input_value(value),
        })
        .collect()
}

fn yaml_to_input_value(value: &serde_yaml::Value) -> Result<InputValue> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => Ok(InputValue::Str(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(InputValue::Int(i)),
            None => Ok(InputValue::Str(n.to_string())),
        },
        Value::Bool(b) => Ok(InputValue::Bool(*b)),
        Value::Sequence(seq) => {
            let mut items = Vec::with_capacity(seq.len());
            for item in seq {
                match item {
                    Value::String(s) => items.push(s.clone()),
                    Value::Number(n) => items.push(n.to_string()),
                    other => {
                        return Err(Error::Internal(format!(
                            "unsupported literal parameter element: {:?}",
                            other
                        )))
                    }
                }
            }
            Ok(InputValue::StrList(items))
        }
        other => Err(Error::Internal(format!(
            "unsupported literal parameter: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{InputProfile, InputResolver};
    use pgcomply_core::{InputSpec, OutcomeKind};
    use pgcomply_probe::{FileMeta, MockProbe, QueryRows};
    use std::collections::HashMap;

    fn resolver_with(specs_yaml: &[&str], profile_yaml: &str) -> Arc<InputResolver> {
        let specs: Vec<InputSpec> = specs_yaml
            .iter()
            .map(|y| serde_yaml::from_str(y).unwrap())
            .collect();
        let profile = InputProfile::from_yaml(profile_yaml).unwrap();
        Arc::new(InputResolver::new(specs.iter(), profile, HashMap::new()))
    }

    fn empty_resolver() -> Arc<InputResolver> {
        Arc::new(InputResolver::new(
            std::iter::empty(),
            InputProfile::empty(),
            HashMap::new(),
        ))
    }

    fn control(yaml: &str) -> ControlDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn runner(probe: &MockProbe, resolver: Arc<InputResolver>) -> ControlRunner {
        ControlRunner::new(Arc::new(probe.clone()), resolver)
    }

    const SSL_CONTROL: &str = r#"
id: "V-72931"
title: "SSL must be enabled"
severity: high
checks:
  - description: "ssl parameter"
    probe: { type: query, sql: "SHOW ssl" }
    expect: { type: equals, value: "on" }
"#;

    const STAT_CONTROL: &str = r#"
id: "V-72847"
title: "Data directory must be 0700 and owned by postgres"
severity: high
checks:
  - description: "data directory mode"
    probe: { type: stat, path: "/var/lib/pgsql/9.5/data", field: mode }
    expect: { type: equals, value: "0700", value_type: octal-mode }
  - description: "data directory owner"
    probe: { type: stat, path: "/var/lib/pgsql/9.5/data", field: owner }
    expect: { type: equals, value: "postgres" }
"#;

    const SKIP_CONTROL: &str = r#"
id: "V-72979"
title: "Organization-defined review of audit records"
severity: medium
skip:
  reason: "manual/organizational check; not automatable"
"#;

    fn pg_data_meta() -> FileMeta {
        FileMeta {
            exists: true,
            is_directory: true,
            mode: 0o700,
            owner: "postgres".into(),
            group: "postgres".into(),
        }
    }

    #[tokio::test]
    async fn test_stat_conjunction_passes() {
        let probe = MockProbe::builder()
            .stat("/var/lib/pgsql/9.5/data", pg_data_meta())
            .build();
        let report = runner(&probe, empty_resolver())
            .run(&[control(STAT_CONTROL)], "test")
            .await;

        let outcomes = report.outcomes_for("V-72847");
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.kind == OutcomeKind::Pass));
        assert_eq!(report.controls[0].state, ControlState::Completed);
    }

    #[tokio::test]
    async fn test_skip_gate_zero_probe_calls() {
        let probe = MockProbe::builder().build();
        let report = runner(&probe, empty_resolver())
            .run(&[control(SKIP_CONTROL)], "test")
            .await;

        let outcomes = report.outcomes_for("V-72979");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].kind, OutcomeKind::Skip);
        assert_eq!(
            outcomes[0].reason.as_deref(),
            Some("manual/organizational check; not automatable")
        );
        assert_eq!(probe.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_check_does_not_stop_siblings() {
        let meta = FileMeta {
            mode: 0o770,
            ..pg_data_meta()
        };
        let probe = MockProbe::builder()
            .stat("/var/lib/pgsql/9.5/data", meta)
            .build();
        let report = runner(&probe, empty_resolver())
            .run(&[control(STAT_CONTROL)], "test")
            .await;

        let outcomes = report.outcomes_for("V-72847");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].kind, OutcomeKind::Fail);
        // The owner check still ran and passed
        assert_eq!(outcomes[1].kind, OutcomeKind::Pass);
        assert_eq!(report.controls[0].state, ControlState::Completed);
    }

    #[tokio::test]
    async fn test_connection_error_isolated_to_one_control() {
        // Session open fails; the stat-only control is unaffected
        let probe = MockProbe::builder()
            .connect_error("connection refused")
            .stat("/var/lib/pgsql/9.5/data", pg_data_meta())
            .build();
        let report = runner(&probe, empty_resolver())
            .run(&[control(SSL_CONTROL), control(STAT_CONTROL)], "test")
            .await;

        let ssl = report.outcomes_for("V-72931");
        assert_eq!(ssl.len(), 1);
        assert_eq!(ssl[0].kind, OutcomeKind::Error);
        assert_eq!(report.controls[0].state, ControlState::Errored);

        let stat = report.outcomes_for("V-72847");
        assert_eq!(stat.len(), 2);
        assert!(stat.iter().all(|o| o.kind == OutcomeKind::Pass));
    }

    #[tokio::test]
    async fn test_sessions_released_on_every_path() {
        let probe = MockProbe::builder()
            .query("SHOW ssl", QueryRows::column(&["on"]))
            .query_error("SHOW log_destination", "server closed the connection")
            .build();

        let erroring = control(
            r#"
id: "V-72845"
title: "log destination"
checks:
  - description: "log_destination"
    probe: { type: query, sql: "SHOW log_destination" }
    expect: { type: equals, value: "stderr" }
"#,
        );
        let report = runner(&probe, empty_resolver())
            .run(&[control(SSL_CONTROL), erroring], "test")
            .await;

        assert_eq!(report.summary.total_controls, 2);
        assert_eq!(probe.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_input_errors_only_declaring_controls() {
        let declares = control(
            r#"
id: "V-72841"
title: "needs pg_host"
inputs: [pg_host]
checks:
  - description: "host check"
    probe: { type: query, sql: "SELECT 1" }
    expect: { type: not-empty }
"#,
        );
        let resolver = resolver_with(&["name: pg_host"], "{}");
        let probe = MockProbe::builder()
            .stat("/var/lib/pgsql/9.5/data", pg_data_meta())
            .build();

        let report = runner(&probe, resolver)
            .run(&[declares, control(STAT_CONTROL)], "test")
            .await;

        let affected = report.outcomes_for("V-72841");
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].kind, OutcomeKind::Error);
        assert!(affected[0]
            .reason
            .as_deref()
            .unwrap_or_default()
            .contains("pg_host"));
        // No probe work for the errored control
        assert_eq!(probe.open_sessions(), 0);

        let unaffected = report.outcomes_for("V-72847");
        assert!(unaffected.iter().all(|o| o.kind == OutcomeKind::Pass));
    }

    #[tokio::test]
    async fn test_numeric_bound_uses_integer_domain() {
        let max_conn = control(
            r#"
id: "V-73049"
title: "max_connections limited"
inputs: [pg_max_connections]
checks:
  - description: "max_connections"
    probe: { type: query, sql: "SHOW max_connections" }
    expect:
      type: le
      value: { input: pg_max_connections }
      value_type: integer
"#,
        );
        let resolver = resolver_with(
            &["name: pg_max_connections\ntype: string"],
            "pg_max_connections: \"100\"",
        );
        let probe = MockProbe::builder()
            .query("SHOW max_connections", QueryRows::column(&["150"]))
            .build();

        let report = runner(&probe, resolver).run(&[max_conn], "test").await;
        let outcomes = report.outcomes_for("V-73049");
        assert_eq!(outcomes[0].kind, OutcomeKind::Fail);
        assert_eq!(outcomes[0].actual, "150");
        assert_eq!(outcomes[0].expected, "<= 100");
    }

    #[tokio::test]
    async fn test_determinism_two_runs_identical_kinds() {
        let probe = MockProbe::builder()
            .stat("/var/lib/pgsql/9.5/data", pg_data_meta())
            .connect_error("refused")
            .build();
        let controls = [
            control(SSL_CONTROL),
            control(STAT_CONTROL),
            control(SKIP_CONTROL),
        ];

        let runner = runner(&probe, empty_resolver());
        let first = runner.run(&controls, "test").await;
        let second = runner.run(&controls, "test").await;

        let kinds = |r: &RunReport| {
            r.outcomes()
                .map(|o| (o.control_id.clone(), o.kind))
                .collect::<Vec<_>>()
        };
        assert_eq!(kinds(&first), kinds(&second));
        assert_eq!(first.summary, second.summary);
    }

    #[tokio::test]
    async fn test_deadline_preserves_completeness() {
        let probe = MockProbe::builder()
            .stat("/var/lib/pgsql/9.5/data", pg_data_meta())
            .build();
        let controls = [control(STAT_CONTROL), control(SKIP_CONTROL)];

        let settings = RunnerSettings {
            deadline_secs: Some(0),
            ..RunnerSettings::default()
        };
        let report = ControlRunner::new(Arc::new(probe.clone()), empty_resolver())
            .with_settings(settings)
            .run(&controls, "test")
            .await;

        // Nothing dispatched, but every control still has a record
        assert_eq!(report.summary.total_controls, 2);
        assert_eq!(report.summary.total_outcomes, 2);
        for record in &report.controls {
            assert_eq!(record.state, ControlState::Errored);
            assert!(record.outcomes[0]
                .reason
                .as_deref()
                .unwrap_or_default()
                .contains("deadline"));
        }
        assert_eq!(probe.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_or_group_control() {
        let hba = control(
            r#"
id: "V-72933"
title: "hba entries must use cert or scram"
checks:
  - description: "authentication method"
    probe: { type: query, sql: "SELECT auth_method FROM hba_rules", extract: scalar }
    expect:
      type: any-of
      alternatives:
        - { type: equals, value: "cert" }
        - { type: equals, value: "scram-sha-256" }
"#,
        );
        let probe = MockProbe::builder()
            .query(
                "SELECT auth_method FROM hba_rules",
                QueryRows::column(&["cert"]),
            )
            .build();

        let report = runner(&probe, empty_resolver()).run(&[hba], "test").await;
        assert_eq!(report.outcomes_for("V-72933")[0].kind, OutcomeKind::Pass);
    }
}
