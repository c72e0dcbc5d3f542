//! Error types for the pgcomply engine

use thiserror::Error;

/// Result type alias using the pgcomply Error
pub type Result<T> = std::result::Result<T, Error>;

/// pgcomply error types
#[derive(Error, Debug)]
pub enum Error {
    // === Input Resolution Errors ===
    #[error("Missing required input: {name}")]
    MissingInput { name: String },

    #[error("Input {name} cannot be coerced to {expected}: {value}")]
    InputTypeMismatch {
        name: String,
        expected: String,
        value: String,
    },

    #[error("Input not declared in catalog: {name}")]
    UndeclaredInput { name: String },

    // === Probe Errors ===
    #[error("Cannot connect to target: {0}")]
    ProbeConnection(String),

    #[error("Probe timed out after {timeout_secs}s: {operation}")]
    ProbeTimeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Probe operation failed: {0}")]
    ProbeFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    // === Catalog Errors ===
    #[error("Failed to load catalog from {path}: {message}")]
    CatalogLoad { path: String, message: String },

    #[error("Invalid control definition {control_id}: {message}")]
    InvalidControl {
        control_id: String,
        message: String,
    },

    #[error("Duplicate control id in catalog: {control_id}")]
    DuplicateControl { control_id: String },

    #[error("Control {control_id} references undeclared input: {name}")]
    UnknownInputRef { control_id: String, name: String },

    // === Input Profile Errors ===
    #[error("Failed to load input profile {path}: {message}")]
    ProfileLoad { path: String, message: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Run Errors ===
    #[error("Run cancelled: {reason}")]
    RunCancelled { reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Fatal errors abort the run before any control executes; everything
    /// else is caught at the control boundary and becomes an `error` outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CatalogLoad { .. }
                | Error::InvalidControl { .. }
                | Error::DuplicateControl { .. }
                | Error::UnknownInputRef { .. }
                | Error::ProfileLoad { .. }
                | Error::Configuration(_)
        )
    }

    /// Get an error code for logging/metrics
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingInput { .. } => "MISSING_INPUT",
            Error::InputTypeMismatch { .. } => "INPUT_TYPE_MISMATCH",
            Error::UndeclaredInput { .. } => "UNDECLARED_INPUT",
            Error::ProbeConnection(_) => "PROBE_CONNECTION",
            Error::ProbeTimeout { .. } => "PROBE_TIMEOUT",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::ProbeFailed(_) => "PROBE_FAILED",
            Error::QueryFailed(_) => "QUERY_FAILED",
            Error::CatalogLoad { .. } => "CATALOG_LOAD",
            Error::InvalidControl { .. } => "INVALID_CONTROL",
            Error::DuplicateControl { .. } => "DUPLICATE_CONTROL",
            Error::UnknownInputRef { .. } => "UNKNOWN_INPUT_REF",
            Error::ProfileLoad { .. } => "PROFILE_LOAD",
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::RunCancelled { .. } => "RUN_CANCELLED",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
