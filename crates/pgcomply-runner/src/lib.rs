//! pgcomply Runner - the compliance evaluation engine
//!
//! This crate orchestrates a run:
//! - `InputResolver`: layered, memoized configuration inputs
//! - `eval`: typed assertion evaluation with OR-group semantics
//! - `ControlRunner`: isolated per-control execution with bounded
//!   concurrency and deadline-based cancellation
//! - `RunReport`: arrival-order aggregation with summary counts
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use pgcomply_core::{ControlDefinition, InputSpec};
//! use pgcomply_runner::{ControlRunner, InputProfile, InputResolver};
//! use pgcomply_probe::{PgProbe, PgTarget};
//!
//! # async fn demo(controls: Vec<ControlDefinition>, specs: Vec<InputSpec>) {
//! let target = PgTarget::default();
//! let probe = Arc::new(PgProbe::new(target.clone()));
//! let resolver = Arc::new(InputResolver::new(
//!     specs.iter(),
//!     InputProfile::empty(),
//!     HashMap::new(),
//! ));
//!
//! let runner = ControlRunner::new(probe, resolver);
//! let report = runner.run(&controls, &target.label()).await;
//! println!("{} failed", report.summary.failed);
//! # }
//! ```

pub mod eval;
pub mod inputs;
pub mod report;
pub mod runner;

pub use eval::{evaluate, ResolvedInputs, Verdict};
pub use inputs::{env_overrides, InputProfile, InputResolver, INPUT_ENV_PREFIX};
pub use report::{RunReport, RunSummary, SeverityCounts};
pub use runner::{ControlRunner, RunnerSettings};
