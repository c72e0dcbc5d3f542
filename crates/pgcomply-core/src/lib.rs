//! pgcomply Core - Foundation types, traits, and error handling
//!
//! This crate provides the core abstractions used throughout the pgcomply
//! engine:
//! - `ControlDefinition`: the declarative form of one compliance rule
//! - `Expectation` / `ProbeRequest`: the assertion and observation model
//! - `AssertionOutcome`: a typed pass/fail/skip/error result
//! - `InputSpec` / `InputValue`: declared and resolved configuration inputs
//! - `Severity`, `OutcomeKind`, etc.: core enums

pub mod control;
pub mod error;
pub mod input;
pub mod outcome;
pub mod severity;

// Re-export commonly used types at crate root
pub use control::{
    CheckSpec, ControlDefinition, Expectation, Extract, ParamSpec, ProbeRequest, SkipGate,
    StatField, Capture, ValueSpec, ValueType,
};
pub use error::{Error, Result};
pub use input::{InputSpec, InputType, InputValue};
pub use outcome::{AssertionOutcome, ControlRecord, ControlState, OutcomeKind};
pub use severity::Severity;
