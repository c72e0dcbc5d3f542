//! Assertion Evaluator - typed comparison of observations against expectations
//!
//! Coercion rules live here and only here. Every comparison happens in
//! the expectation's declared domain: integer bounds parse both sides as
//! integers (string "100" against observed "150" is 100 vs 150, never a
//! lexical comparison), octal-mode compares permission bits, string
//! equality compares text. An observation that cannot be coerced into the
//! declared domain is a fail with a coercion note, not an engine error:
//! the probe succeeded, the value is just the wrong shape.

use pgcomply_core::{Error, Expectation, InputValue, Result, ValueSpec, ValueType};
use pgcomply_probe::Observed;
use std::collections::HashMap;
use std::sync::Arc;

/// Inputs resolved for the control under evaluation
pub type ResolvedInputs = HashMap<String, Arc<InputValue>>;

/// Result of evaluating one expectation
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    /// Rendered expectation, report-ready (e.g. "<= 100", "matches ^hostssl")
    pub expected: String,
    /// Rendered observation, with a coercion note when relevant
    pub actual: String,
}

impl Verdict {
    fn pass(expected: String, actual: String) -> Self {
        Self {
            passed: true,
            expected,
            actual,
        }
    }

    fn fail(expected: String, actual: String) -> Self {
        Self {
            passed: false,
            expected,
            actual,
        }
    }
}

/// Evaluate an expectation against an observed value.
///
/// `Err` means the expectation itself could not be evaluated (unresolved
/// input reference, bad pattern) - an engine problem the runner records
/// as an `error` outcome, distinct from a fail.
pub fn evaluate(
    expect: &Expectation,
    observed: &Observed,
    inputs: &ResolvedInputs,
) -> Result<Verdict> {
    match expect {
        Expectation::Equals { value, value_type } => {
            compare(observed, value, *value_type, inputs, CmpOp::Eq)
        }
        Expectation::NotEquals { value, value_type } => {
            compare(observed, value, *value_type, inputs, CmpOp::Ne)
        }
        Expectation::Lt { value, value_type } => {
            compare(observed, value, *value_type, inputs, CmpOp::Lt)
        }
        Expectation::Le { value, value_type } => {
            compare(observed, value, *value_type, inputs, CmpOp::Le)
        }
        Expectation::Gt { value, value_type } => {
            compare(observed, value, *value_type, inputs, CmpOp::Gt)
        }
        Expectation::Ge { value, value_type } => {
            compare(observed, value, *value_type, inputs, CmpOp::Ge)
        }
        Expectation::Matches { pattern } => matches_pattern(observed, pattern),
        Expectation::NotEmpty => Ok(not_empty(observed)),
        Expectation::MemberOf { values } => member_of(observed, values, inputs),
        Expectation::SubsetOf { values } => subset_of(observed, values, inputs),
        Expectation::AnyOf { alternatives } => any_of(observed, alternatives, inputs),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn apply<T: PartialOrd + PartialEq>(&self, actual: &T, expected: &T) -> bool {
        match self {
            CmpOp::Eq => actual == expected,
            CmpOp::Ne => actual != expected,
            CmpOp::Lt => actual < expected,
            CmpOp::Le => actual <= expected,
            CmpOp::Gt => actual > expected,
            CmpOp::Ge => actual >= expected,
        }
    }
}

fn compare(
    observed: &Observed,
    value: &ValueSpec,
    value_type: ValueType,
    inputs: &ResolvedInputs,
    op: CmpOp,
) -> Result<Verdict> {
    let expected_raw = resolve_value(value, inputs)?;

    match value_type {
        ValueType::Integer => {
            let expected = match to_int(&expected_raw) {
                Some(v) => v,
                None => {
                    return Err(Error::Internal(format!(
                        "expected value {} is not an integer",
                        render_resolved(&expected_raw)
                    )))
                }
            };
            let rendered = format!("{} {}", op.symbol(), expected);
            match observed_to_int(observed) {
                Some(actual) => Ok(verdict(op.apply(&actual, &expected), rendered, actual.to_string())),
                None => Ok(Verdict::fail(
                    rendered,
                    format!("{} (not an integer)", observed.render()),
                )),
            }
        }
        ValueType::OctalMode => {
            let expected = match resolved_to_mode(&expected_raw) {
                Some(v) => v,
                None => {
                    return Err(Error::Internal(format!(
                        "expected value {} is not an octal mode",
                        render_resolved(&expected_raw)
                    )))
                }
            };
            let rendered = format!("{} {:04o}", op.symbol(), expected);
            match observed_to_mode(observed) {
                Some(actual) => Ok(verdict(
                    op.apply(&actual, &expected),
                    rendered,
                    format!("{:04o}", actual),
                )),
                None => Ok(Verdict::fail(
                    rendered,
                    format!("{} (not a mode)", observed.render()),
                )),
            }
        }
        ValueType::Boolean => {
            let expected = match resolved_to_bool(&expected_raw) {
                Some(v) => v,
                None => {
                    return Err(Error::Internal(format!(
                        "expected value {} is not a boolean",
                        render_resolved(&expected_raw)
                    )))
                }
            };
            let rendered = format!("{} {}", op.symbol(), expected);
            match observed_to_bool(observed) {
                Some(actual) => Ok(verdict(op.apply(&actual, &expected), rendered, actual.to_string())),
                None => Ok(Verdict::fail(
                    rendered,
                    format!("{} (not a boolean)", observed.render()),
                )),
            }
        }
        ValueType::StringList => {
            let expected = resolved_to_list(&expected_raw);
            let rendered = format!("{} [{}]", op.symbol(), expected.join(", "));
            match observed {
                Observed::List(actual) => {
                    Ok(verdict(op.apply(actual, &expected), rendered, actual.join(", ")))
                }
                other => Ok(Verdict::fail(
                    rendered,
                    format!("{} (not a list)", other.render()),
                )),
            }
        }
        ValueType::String => {
            let expected = render_resolved(&expected_raw);
            let rendered = format!("{} {}", op.symbol(), expected);
            match observed {
                Observed::Absent => Ok(Verdict::fail(rendered, observed.render())),
                other => {
                    let actual = other.render();
                    Ok(verdict(op.apply(&actual, &expected), rendered, actual))
                }
            }
        }
    }
}

fn verdict(passed: bool, expected: String, actual: String) -> Verdict {
    if passed {
        Verdict::pass(expected, actual)
    } else {
        Verdict::fail(expected, actual)
    }
}

fn matches_pattern(observed: &Observed, pattern: &str) -> Result<Verdict> {
    let re = regex::Regex::new(pattern)
        .map_err(|e| Error::Internal(format!("invalid regex {:?}: {}", pattern, e)))?;

    let expected = format!("matches {}", pattern);
    match observed {
        Observed::Absent => Ok(Verdict::fail(expected, observed.render())),
        // A list matches when any element matches (pg_hba line sets)
        Observed::List(items) => Ok(verdict(
            items.iter().any(|item| re.is_match(item)),
            expected,
            items.join(", "),
        )),
        other => {
            let actual = other.render();
            Ok(verdict(re.is_match(&actual), expected, actual))
        }
    }
}

fn not_empty(observed: &Observed) -> Verdict {
    let expected = String::from("not empty");
    match observed {
        Observed::Absent => Verdict::fail(expected, observed.render()),
        Observed::Text(s) if s.trim().is_empty() => Verdict::fail(expected, String::from("\"\"")),
        Observed::List(items) if items.is_empty() => Verdict::fail(expected, String::from("[]")),
        other => Verdict::pass(expected, other.render()),
    }
}

fn member_of(observed: &Observed, values: &ValueSpec, inputs: &ResolvedInputs) -> Result<Verdict> {
    let set = resolved_to_list(&resolve_value(values, inputs)?);
    let expected = format!("one of [{}]", set.join(", "));

    match observed {
        Observed::Absent => Ok(Verdict::fail(expected, observed.render())),
        other => {
            let actual = other.render();
            Ok(verdict(set.iter().any(|v| *v == actual), expected, actual))
        }
    }
}

fn subset_of(observed: &Observed, values: &ValueSpec, inputs: &ResolvedInputs) -> Result<Verdict> {
    let set = resolved_to_list(&resolve_value(values, inputs)?);
    let expected = format!("subset of [{}]", set.join(", "));

    match observed {
        Observed::List(actual) => {
            let passed = actual.iter().all(|item| set.contains(item));
            Ok(verdict(passed, expected, actual.join(", ")))
        }
        // A scalar observation is a one-element list
        Observed::Text(s) => Ok(verdict(set.contains(s), expected, s.clone())),
        other => Ok(Verdict::fail(
            expected,
            format!("{} (not a list)", other.render()),
        )),
    }
}

/// OR-group: passes when any alternative passes. The report shows every
/// alternative tried so a reader can see what would have been accepted.
fn any_of(
    observed: &Observed,
    alternatives: &[Expectation],
    inputs: &ResolvedInputs,
) -> Result<Verdict> {
    let mut rendered = Vec::with_capacity(alternatives.len());
    let mut passed = false;
    let mut actual = observed.render();

    for alt in alternatives {
        let v = evaluate(alt, observed, inputs)?;
        rendered.push(v.expected);
        if v.passed && !passed {
            passed = true;
            actual = v.actual;
        }
    }

    Ok(verdict(
        passed,
        format!("any of: [{}]", rendered.join("; ")),
        actual,
    ))
}

/// A resolved expected value: either a shared input or a catalog literal
enum Resolved<'a> {
    Input(&'a InputValue),
    Literal(&'a serde_yaml::Value),
}

fn resolve_value<'a>(value: &'a ValueSpec, inputs: &'a ResolvedInputs) -> Result<Resolved<'a>> {
    match value {
        ValueSpec::Input { input } => inputs
            .get(input)
            .map(|v| Resolved::Input(v.as_ref()))
            .ok_or_else(|| Error::MissingInput {
                name: input.clone(),
            }),
        ValueSpec::Literal(raw) => Ok(Resolved::Literal(raw)),
    }
}

fn render_resolved(resolved: &Resolved<'_>) -> String {
    match resolved {
        Resolved::Input(value) => value.render(),
        Resolved::Literal(raw) => match raw {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Sequence(seq) => seq
                .iter()
                .map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(", "),
            other => format!("{:?}", other),
        },
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

fn to_int(resolved: &Resolved<'_>) -> Option<i64> {
    match resolved {
        Resolved::Input(InputValue::Int(i)) => Some(*i),
        Resolved::Input(InputValue::Str(s)) => s.trim().parse().ok(),
        Resolved::Input(_) => None,
        Resolved::Literal(raw) => raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok())),
    }
}

fn observed_to_int(observed: &Observed) -> Option<i64> {
    match observed {
        Observed::Int(i) => Some(*i),
        Observed::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_mode(s: &str) -> Option<u32> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    u32::from_str_radix(trimmed, 8).ok()
}

fn resolved_to_mode(resolved: &Resolved<'_>) -> Option<u32> {
    match resolved {
        Resolved::Input(InputValue::Str(s)) => parse_mode(s),
        Resolved::Input(InputValue::Int(i)) => parse_mode(&i.to_string()),
        Resolved::Input(_) => None,
        Resolved::Literal(raw) => match raw {
            serde_yaml::Value::String(s) => parse_mode(s),
            serde_yaml::Value::Number(n) => n.as_i64().and_then(|i| parse_mode(&i.to_string())),
            _ => None,
        },
    }
}

fn observed_to_mode(observed: &Observed) -> Option<u32> {
    match observed {
        Observed::Text(s) => parse_mode(s),
        Observed::Int(i) => parse_mode(&i.to_string()),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    // postgresql accepts on/off and abbreviations of true/false/yes/no
    match s.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "t" | "1" => Some(true),
        "off" | "false" | "no" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn resolved_to_bool(resolved: &Resolved<'_>) -> Option<bool> {
    match resolved {
        Resolved::Input(InputValue::Bool(b)) => Some(*b),
        Resolved::Input(InputValue::Str(s)) => parse_bool(s),
        Resolved::Input(_) => None,
        Resolved::Literal(raw) => raw
            .as_bool()
            .or_else(|| raw.as_str().and_then(parse_bool)),
    }
}

fn observed_to_bool(observed: &Observed) -> Option<bool> {
    match observed {
        Observed::Bool(b) => Some(*b),
        Observed::Text(s) => parse_bool(s),
        Observed::Int(0) => Some(false),
        Observed::Int(1) => Some(true),
        _ => None,
    }
}

fn resolved_to_list(resolved: &Resolved<'_>) -> Vec<String> {
    match resolved {
        Resolved::Input(InputValue::StrList(items)) => items.clone(),
        Resolved::Input(value) => vec![value.render()],
        Resolved::Literal(serde_yaml::Value::Sequence(seq)) => {
            seq.iter().map(yaml_scalar_to_string).collect()
        }
        Resolved::Literal(raw) => vec![yaml_scalar_to_string(raw)],
    }
}
