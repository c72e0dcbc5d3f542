//! Input Resolver - layered, memoized configuration values
//!
//! Resolution order: run-time override > profile value > declared default
//! > hard failure. Each name resolves once per run; every later request
//! returns the same shared value, so a dozen controls referencing
//! `pg_superusers` all see one identical list.

use pgcomply_core::{Error, InputSpec, InputValue, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Environment variable prefix for input overrides
pub const INPUT_ENV_PREFIX: &str = "PGCOMPLY_INPUT_";

/// Values supplied by an input profile file (YAML mapping name -> value)
#[derive(Debug, Default)]
pub struct InputProfile {
    values: HashMap<String, serde_yaml::Value>,
}

impl InputProfile {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a profile file. Failures here are fatal to the run.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::ProfileLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| Error::ProfileLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let values: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)?;
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&serde_yaml::Value> {
        self.values.get(name)
    }
}

/// Collect `PGCOMPLY_INPUT_*` environment overrides, mapping
/// `PGCOMPLY_INPUT_PG_MAX_CONNECTIONS` to `pg_max_connections`.
pub fn env_overrides() -> HashMap<String, String> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(INPUT_ENV_PREFIX)
                .map(|name| (name.to_lowercase(), value))
        })
        .collect()
}

/// Resolves declared inputs against overrides, profile, and defaults,
/// memoizing on first use. Write-once per name, then read-many; safe to
/// share across concurrently running controls.
pub struct InputResolver {
    specs: HashMap<String, InputSpec>,
    overrides: HashMap<String, String>,
    profile: InputProfile,
    cache: RwLock<HashMap<String, Arc<InputValue>>>,
}

impl InputResolver {
    pub fn new<'a>(
        specs: impl IntoIterator<Item = &'a InputSpec>,
        profile: InputProfile,
        overrides: HashMap<String, String>,
    ) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|s| (s.name.clone(), s.clone()))
                .collect(),
            overrides,
            profile,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve one input by name. Returns the same `Arc` for every call
    /// with the same name within a run.
    pub fn resolve(&self, name: &str) -> Result<Arc<InputValue>> {
        // Entries are only ever inserted whole, so a poisoned lock still
        // holds a usable cache.
        if let Some(value) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(Arc::clone(value));
        }

        let resolved = Arc::new(self.resolve_uncached(name)?);

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent control may have resolved the same name first;
        // the first insertion wins so every caller shares one value.
        let value = cache
            .entry(name.to_string())
            .or_insert(resolved);
        Ok(Arc::clone(value))
    }

    fn resolve_uncached(&self, name: &str) -> Result<InputValue> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| Error::UndeclaredInput {
                name: name.to_string(),
            })?;

        if let Some(raw) = self.overrides.get(name) {
            debug!("input {} resolved from override", name);
            return InputValue::coerce_str(raw, spec.input_type).ok_or_else(|| {
                Error::InputTypeMismatch {
                    name: name.to_string(),
                    expected: spec.input_type.to_string(),
                    value: raw.clone(),
                }
            });
        }

        if let Some(raw) = self.profile.get(name) {
            debug!("input {} resolved from profile", name);
            return InputValue::coerce_yaml(raw, spec.input_type).ok_or_else(|| {
                Error::InputTypeMismatch {
                    name: name.to_string(),
                    expected: spec.input_type.to_string(),
                    value: format!("{:?}", raw),
                }
            });
        }

        if let Some(default) = &spec.default {
            debug!("input {} resolved from declared default", name);
            return InputValue::coerce_yaml(default, spec.input_type).ok_or_else(|| {
                Error::InputTypeMismatch {
                    name: name.to_string(),
                    expected: spec.input_type.to_string(),
                    value: format!("{:?}", default),
                }
            });
        }

        Err(Error::MissingInput {
            name: name.to_string(),
        })
    }

    /// Resolve every name a control references, failing on the first
    /// missing or mistyped one.
    pub fn resolve_all(&self, names: &[String]) -> Result<HashMap<String, Arc<InputValue>>> {
        let mut out = HashMap::with_capacity(names.len());
        for name in names {
            out.insert(name.clone(), self.resolve(name)?);
        }
        Ok(out)
    }
}
