//! Catalog loader - loads control definitions from YAML fragments
//!
//! A fragment is one YAML file with optional `inputs:` declarations and a
//! `controls:` list. Fragments in a directory tree are merged into one
//! catalog. Unlike a scan of independent plugin files, a malformed
//! fragment fails the whole load: the run contract forbids a partial
//! report, so a half-loaded catalog is useless.

use crate::registry::ControlCatalog;
use crate::validate;
use pgcomply_core::{ControlDefinition, Error, InputSpec, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One catalog file
#[derive(Debug, Deserialize)]
pub struct CatalogFragment {
    /// Optional fragment label, for log messages only
    #[serde(default)]
    pub catalog: Option<String>,

    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    #[serde(default)]
    pub controls: Vec<ControlDefinition>,
}

impl CatalogFragment {
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Load and validate a catalog from every `*.yaml`/`*.yml` under `dir`
pub fn load_catalog_from_dir(dir: impl AsRef<Path>) -> Result<ControlCatalog> {
    let dir = dir.as_ref();

    if !dir.exists() {
        return Err(Error::CatalogLoad {
            path: dir.display().to_string(),
            message: "directory does not exist".into(),
        });
    }

    info!("Loading catalog from: {}", dir.display());

    let mut paths = Vec::new();
    collect_fragment_paths(dir, &mut paths)?;
    // Filesystem iteration order is unspecified; sorted paths fix the
    // catalog order and therefore the report's arrival order.
    paths.sort();

    let mut catalog = ControlCatalog::new();
    for path in &paths {
        load_fragment(&mut catalog, path)?;
    }

    validate::validate(&catalog)?;

    info!(
        "Loaded {} controls, {} input declarations",
        catalog.len(),
        catalog.input_specs().count()
    );
    Ok(catalog)
}

fn collect_fragment_paths(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_fragment_paths(&path, out)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                out.push(path);
            }
        }
    }
    Ok(())
}

fn load_fragment(catalog: &mut ControlCatalog, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;

    let fragment = CatalogFragment::from_yaml(&content).map_err(|e| Error::CatalogLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    debug!(
        "Fragment {} ({}): {} controls, {} inputs",
        path.display(),
        fragment.catalog.as_deref().unwrap_or("unnamed"),
        fragment.controls.len(),
        fragment.inputs.len()
    );

    for spec in fragment.inputs {
        catalog.declare_input(spec)?;
    }
    for control in fragment.controls {
        catalog.register(control)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const FRAGMENT: &str = r#"
catalog: postgres-stig-demo
inputs:
  - name: pg_owner
    type: string
    default: postgres
controls:
  - id: "V-72841"
    title: "Audit log directory ownership"
    severity: medium
    inputs: [pg_owner]
    checks:
      - description: "pg_log owner"
        probe:
          type: stat
          path: "/var/lib/pgsql/9.5/data/pg_log"
          field: owner
        expect:
          type: equals
          value: { input: pg_owner }
"#;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_catalog_from_dir() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "stig.yaml", FRAGMENT);

        let catalog = load_catalog_from_dir(tmp.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("V-72841").is_some());
        assert!(catalog.input_spec("pg_owner").is_some());
    }

    #[test]
    fn test_malformed_fragment_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "ok.yaml", FRAGMENT);
        write_file(tmp.path(), "zz-broken.yaml", "controls: [ {id: 1 ");

        let err = load_catalog_from_dir(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::CatalogLoad { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let err = load_catalog_from_dir("/nonexistent/catalog").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fragments_merge_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "b-second.yaml",
            r#"
controls:
  - id: "V-2"
    title: "second"
    skip: { reason: "manual check" }
"#,
        );
        write_file(
            tmp.path(),
            "a-first.yaml",
            r#"
controls:
  - id: "V-1"
    title: "first"
    skip: { reason: "manual check" }
"#,
        );

        let catalog = load_catalog_from_dir(tmp.path()).unwrap();
        let ids: Vec<&str> = catalog.controls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["V-1", "V-2"]);
    }
}
