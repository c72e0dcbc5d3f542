//! PostgreSQL-backed System Probe
//!
//! Database queries go through sqlx with bound parameters only. The
//! filesystem, command, and config capabilities run on the local host:
//! like the STIG content this engine evaluates, the probe is expected to
//! run on the database server itself.

use crate::types::{CommandOutput, CommandSpec, ConfigMap, FileMeta, QueryRows};
use crate::{exec, fs, pgconf, DbSession, Probe};
use async_trait::async_trait;
use pgcomply_core::{Error, InputValue, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo};
use std::time::Duration;
use tracing::debug;

/// Connection descriptor for the target database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgTarget {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_dbname")]
    pub dbname: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Taken from config or PGCOMPLY_TARGET_PASSWORD; never logged
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_host() -> String {
    String::from("localhost")
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    String::from("postgres")
}

fn default_user() -> String {
    String::from("postgres")
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for PgTarget {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: None,
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl PgTarget {
    /// Label for reports and log messages (no credentials)
    pub fn label(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.dbname)
    }

    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.dbname)
            .username(&self.user);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

/// Production probe: sqlx sessions plus local filesystem/commands
pub struct PgProbe {
    target: PgTarget,
    default_exec_timeout: Duration,
}

impl PgProbe {
    pub fn new(target: PgTarget) -> Self {
        Self {
            target,
            default_exec_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.default_exec_timeout = timeout;
        self
    }

    pub fn target(&self) -> &PgTarget {
        &self.target
    }
}

#[async_trait]
impl Probe for PgProbe {
    async fn open_session(&self) -> Result<Box<dyn DbSession>> {
        debug!("opening session to {}", self.target.label());

        let connect = PgConnection::connect_with(&self.target.connect_options());
        let timeout = Duration::from_secs(self.target.connect_timeout_secs);

        let conn = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| Error::ProbeTimeout {
                operation: format!("connect to {}", self.target.label()),
                timeout_secs: self.target.connect_timeout_secs,
            })?
            .map_err(|e| Error::ProbeConnection(e.to_string()))?;

        Ok(Box::new(PgDbSession {
            conn,
            query_timeout: Duration::from_secs(self.target.query_timeout_secs),
        }))
    }

    async fn stat(&self, path: &str) -> Result<FileMeta> {
        fs::stat_path(path)
    }

    async fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        exec::run(spec).await
    }

    async fn read_config(&self, path: &str) -> Result<ConfigMap> {
        pgconf::read_file(path)
    }
}

/// One authenticated connection, scoped to a single control
pub struct PgDbSession {
    conn: PgConnection,
    query_timeout: Duration,
}

#[async_trait]
impl DbSession for PgDbSession {
    async fn query(&mut self, sql: &str, params: &[InputValue]) -> Result<QueryRows> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                InputValue::Str(s) => query.bind(s.clone()),
                InputValue::Int(i) => query.bind(*i),
                InputValue::Bool(b) => query.bind(*b),
                InputValue::StrList(items) => query.bind(items.clone()),
            };
        }

        let rows = tokio::time::timeout(self.query_timeout, query.fetch_all(&mut self.conn))
            .await
            .map_err(|_| Error::ProbeTimeout {
                operation: format!("query: {}", sql),
                timeout_secs: self.query_timeout.as_secs(),
            })?
            .map_err(|e| Error::QueryFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row)?);
        }
        Ok(QueryRows::new(out))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::ProbeFailed(format!("session close failed: {}", e)))
    }
}

/// Render every cell to text so the evaluator sees one value shape.
/// NULL stays None, distinguishable from the empty string.
fn decode_row(row: &PgRow) -> Result<Vec<Option<String>>> {
    let mut cells = Vec::with_capacity(row.len());

    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_uppercase();
        let cell = match type_name.as_str() {
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => row
                .try_get::<Option<String>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?,
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.to_string()),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.to_string()),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.to_string()),
            "OID" => row
                .try_get::<Option<sqlx::postgres::types::Oid>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.0.to_string()),
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.to_string()),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.to_string()),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)
                .map_err(|e| decode_error(column.name(), &type_name, e))?
                .map(|v| v.to_string()),
            // Catalog SQL that returns exotic types should cast to ::text
            other => {
                return Err(Error::QueryFailed(format!(
                    "cannot render column {} of type {}; cast it to ::text in the control's SQL",
                    column.name(),
                    other
                )))
            }
        };
        cells.push(cell);
    }

    Ok(cells)
}

fn decode_error(column: &str, type_name: &str, e: sqlx::Error) -> Error {
    Error::QueryFailed(format!(
        "decode failed for column {} ({}): {}",
        column, type_name, e
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_has_no_credentials() {
        let target = PgTarget {
            host: "db01".into(),
            port: 5432,
            dbname: "stig".into(),
            user: "auditor".into(),
            password: Some("secret".into()),
            ..PgTarget::default()
        };
        let label = target.label();
        assert_eq!(label, "db01:5432/stig");
        assert!(!label.contains("secret"));
        assert!(!label.contains("auditor"));
    }

    #[test]
    fn test_target_defaults() {
        let target: PgTarget = serde_yaml::from_str("host: replica").unwrap();
        assert_eq!(target.port, 5432);
        assert_eq!(target.dbname, "postgres");
        assert!(target.password.is_none());
    }

    #[test]
    fn test_password_never_serialized() {
        let target = PgTarget {
            password: Some("secret".into()),
            ..PgTarget::default()
        };
        let yaml = serde_yaml::to_string(&target).unwrap();
        assert!(!yaml.contains("secret"));
    }
}
