//! Control catalog - the ordered index of loaded control definitions

use pgcomply_core::{ControlDefinition, Error, InputSpec, Result, Severity};
use std::collections::HashMap;

/// The loaded control catalog: ordered controls plus the catalog-wide
/// input declarations they share.
///
/// Order is the order controls appeared across fragments (fragments are
/// loaded in sorted path order), which fixes the report's arrival order
/// for a given catalog.
#[derive(Debug, Default)]
pub struct ControlCatalog {
    controls: Vec<ControlDefinition>,
    /// Control index by id
    index: HashMap<String, usize>,
    /// Input declarations by name
    inputs: HashMap<String, InputSpec>,
}

impl ControlCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control, rejecting duplicate ids
    pub fn register(&mut self, control: ControlDefinition) -> Result<()> {
        if self.index.contains_key(&control.id) {
            return Err(Error::DuplicateControl {
                control_id: control.id,
            });
        }
        self.index.insert(control.id.clone(), self.controls.len());
        self.controls.push(control);
        Ok(())
    }

    /// Declare an input, rejecting duplicate names
    pub fn declare_input(&mut self, spec: InputSpec) -> Result<()> {
        if self.inputs.contains_key(&spec.name) {
            return Err(Error::Configuration(format!(
                "input {} declared more than once; declare each input in one fragment",
                spec.name
            )));
        }
        self.inputs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Get a control by id
    pub fn get(&self, id: &str) -> Option<&ControlDefinition> {
        self.index.get(id).map(|&i| &self.controls[i])
    }

    /// Get an input declaration by name
    pub fn input_spec(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.get(name)
    }

    /// All input declarations
    pub fn input_specs(&self) -> impl Iterator<Item = &InputSpec> {
        self.inputs.values()
    }

    /// All controls in catalog order
    pub fn controls(&self) -> &[ControlDefinition] {
        &self.controls
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Filter controls by explicit ids, preserving catalog order
    pub fn by_ids(&self, ids: &[String]) -> Vec<&ControlDefinition> {
        self.controls
            .iter()
            .filter(|c| ids.iter().any(|id| *id == c.id))
            .collect()
    }

    /// Filter controls by tag key/value
    pub fn by_tag(&self, key: &str, value: &str) -> Vec<&ControlDefinition> {
        self.controls
            .iter()
            .filter(|c| c.has_tag(key, value))
            .collect()
    }

    /// Filter controls by minimum severity
    pub fn by_min_severity(&self, min: Severity) -> Vec<&ControlDefinition> {
        self.controls
            .iter()
            .filter(|c| c.severity >= min)
            .collect()
    }

    /// Combined selection used by the CLI: ids, tags, and minimum severity
    /// all narrow the set; an empty selection keeps everything.
    pub fn select(&self, selection: &Selection) -> Vec<&ControlDefinition> {
        self.controls
            .iter()
            .filter(|c| selection.matches(c))
            .collect()
    }
}

/// A subset selection over the catalog
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub ids: Vec<String>,
    pub tags: Vec<(String, String)>,
    pub min_severity: Option<Severity>,
}

impl Selection {
    pub fn matches(&self, control: &ControlDefinition) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| *id == control.id) {
            return false;
        }
        if !self
            .tags
            .iter()
            .all(|(key, value)| control.has_tag(key, value))
        {
            return false;
        }
        if let Some(min) = self.min_severity {
            if control.severity < min {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(id: &str, severity: &str, topic: &str) -> ControlDefinition {
        serde_yaml::from_str(&format!(
            r#"
id: "{id}"
title: "test control {id}"
severity: {severity}
tags:
  topic: ["{topic}"]
skip:
  reason: "test"
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = ControlCatalog::new();
        catalog.register(control("V-1", "low", "auth")).unwrap();
        catalog.register(control("V-2", "high", "audit")).unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("V-1").is_some());
        assert!(catalog.get("V-9").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut catalog = ControlCatalog::new();
        catalog.register(control("V-1", "low", "auth")).unwrap();
        let err = catalog.register(control("V-1", "high", "audit")).unwrap_err();
        assert!(matches!(err, Error::DuplicateControl { control_id } if control_id == "V-1"));
    }

    #[test]
    fn test_selection_narrows() {
        let mut catalog = ControlCatalog::new();
        catalog.register(control("V-1", "low", "auth")).unwrap();
        catalog.register(control("V-2", "high", "audit")).unwrap();
        catalog.register(control("V-3", "high", "auth")).unwrap();

        let selection = Selection {
            ids: vec![],
            tags: vec![("topic".into(), "auth".into())],
            min_severity: Some(Severity::High),
        };
        let picked = catalog.select(&selection);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "V-3");

        // Empty selection keeps everything, in catalog order
        let all = catalog.select(&Selection::default());
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["V-1", "V-2", "V-3"]);
    }
}
