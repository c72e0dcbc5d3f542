//! pgcomply Catalog - control registry, YAML loader, and static validation
//!
//! This crate provides:
//! - `ControlCatalog`: ordered index of loaded control definitions
//! - YAML fragment loader for declarative catalogs
//! - Static validation that catches bad catalogs before any control runs

pub mod loader;
pub mod registry;
pub mod validate;

pub use loader::{load_catalog_from_dir, CatalogFragment};
pub use registry::{ControlCatalog, Selection};
