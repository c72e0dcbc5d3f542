//! Static catalog validation
//!
//! Controls are data; everything that can be checked without a target is
//! checked here, at load time, so a bad catalog never reaches the runner.

use crate::registry::ControlCatalog;
use pgcomply_core::{ControlDefinition, Error, Expectation, Result, ValueSpec, ValueType};

/// Validate a merged catalog. Any failure is fatal to the run.
pub fn validate(catalog: &ControlCatalog) -> Result<()> {
    for control in catalog.controls() {
        validate_control(catalog, control)?;
    }
    Ok(())
}

fn validate_control(catalog: &ControlCatalog, control: &ControlDefinition) -> Result<()> {
    if control.id.trim().is_empty() {
        return Err(Error::InvalidControl {
            control_id: "<empty>".into(),
            message: "control id must not be empty".into(),
        });
    }

    if let Some(gate) = &control.skip {
        if gate.reason.trim().is_empty() {
            return Err(Error::InvalidControl {
                control_id: control.id.clone(),
                message: "skip gate requires a non-empty reason".into(),
            });
        }
    } else if control.checks.is_empty() {
        return Err(Error::InvalidControl {
            control_id: control.id.clone(),
            message: "control has no checks and no skip gate".into(),
        });
    }

    // Every input the control touches must be declared catalog-wide
    for name in control.referenced_inputs() {
        if catalog.input_spec(&name).is_none() {
            return Err(Error::UnknownInputRef {
                control_id: control.id.clone(),
                name,
            });
        }
    }

    for check in &control.checks {
        validate_expectation(control, &check.expect)?;
    }

    Ok(())
}

fn validate_expectation(control: &ControlDefinition, expect: &Expectation) -> Result<()> {
    // Regex patterns must compile
    for pattern in expect.patterns() {
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(Error::InvalidControl {
                control_id: control.id.clone(),
                message: format!("invalid regex pattern {:?}: {}", pattern, e),
            });
        }
    }

    match expect {
        Expectation::Equals { value, value_type } | Expectation::NotEquals { value, value_type } => {
            validate_literal(control, value, *value_type)
        }
        Expectation::Lt { value, value_type }
        | Expectation::Le { value, value_type }
        | Expectation::Gt { value, value_type }
        | Expectation::Ge { value, value_type } => {
            if !matches!(value_type, ValueType::Integer | ValueType::OctalMode) {
                return Err(Error::InvalidControl {
                    control_id: control.id.clone(),
                    message: "numeric comparison requires integer or octal-mode value_type".into(),
                });
            }
            validate_literal(control, value, *value_type)
        }
        Expectation::AnyOf { alternatives } => {
            if alternatives.is_empty() {
                return Err(Error::InvalidControl {
                    control_id: control.id.clone(),
                    message: "any-of group requires at least one alternative".into(),
                });
            }
            for alt in alternatives {
                validate_expectation(control, alt)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Literal expected values must already fit their declared type; input
/// references are checked at resolution time instead.
fn validate_literal(
    control: &ControlDefinition,
    value: &ValueSpec,
    value_type: ValueType,
) -> Result<()> {
    let literal = match value {
        ValueSpec::Literal(raw) => raw,
        ValueSpec::Input { .. } => return Ok(()),
    };

    let ok = match value_type {
        ValueType::String => literal.is_string() || literal.is_number() || literal.is_bool(),
        ValueType::Integer => {
            literal.as_i64().is_some()
                || literal
                    .as_str()
                    .map(|s| s.trim().parse::<i64>().is_ok())
                    .unwrap_or(false)
        }
        ValueType::Boolean => {
            literal.is_bool()
                || literal
                    .as_str()
                    .map(|s| matches!(s.to_lowercase().as_str(), "true" | "false" | "on" | "off"))
                    .unwrap_or(false)
        }
        ValueType::OctalMode => literal
            .as_str()
            .map(|s| u32::from_str_radix(s.trim(), 8).is_ok())
            .unwrap_or(false),
        ValueType::StringList => literal.is_sequence() || literal.is_string(),
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidControl {
            control_id: control.id.clone(),
            message: format!(
                "expected value {:?} does not fit declared type {:?}",
                literal, value_type
            ),
        })
    }
}
