//! pgcomply Probe - the System Probe boundary
//!
//! Four capability groups, each independently implementable and mockable:
//! - `DbSession::query`: parameterized SQL against an open session
//! - `Probe::stat`: filesystem metadata
//! - `Probe::exec`: external commands with a bounded timeout
//! - `Probe::read_config`: key=value configuration files
//!
//! `PgProbe` is the production implementation (PostgreSQL via sqlx plus
//! local filesystem/commands); `MockProbe` is the scripted in-memory one.

pub mod exec;
pub mod fs;
pub mod mock;
pub mod pgconf;
pub mod postgres;
pub mod types;

use async_trait::async_trait;
use pgcomply_core::{InputValue, Result};

pub use mock::MockProbe;
pub use postgres::{PgProbe, PgTarget};
pub use types::{CommandOutput, CommandSpec, ConfigMap, FileMeta, Observed, QueryRows};

/// A database session scoped to one control.
///
/// Opened lazily on first query, reused for every query in the control,
/// and released exactly once when the control finishes - on every exit
/// path, including errors.
#[async_trait]
pub trait DbSession: Send {
    /// Execute a parameterized statement. Dynamic values are always bound
    /// parameters; the engine never interpolates them into `sql`.
    async fn query(&mut self, sql: &str, params: &[InputValue]) -> Result<QueryRows>;

    /// Release the session
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Fact-gathering interface against one target
#[async_trait]
pub trait Probe: Send + Sync {
    /// Open a database session. A connection failure here is
    /// unrecoverable for the calling control.
    async fn open_session(&self) -> Result<Box<dyn DbSession>>;

    /// Filesystem metadata; `Error::NotFound` when the path is absent
    /// (callers decide whether that is a finding).
    async fn stat(&self, path: &str) -> Result<FileMeta>;

    /// Run an external command; expiry of the bounded timeout is
    /// `Error::ProbeTimeout`, never a hang.
    async fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Parse a key=value configuration file into a lookup table
    async fn read_config(&self, path: &str) -> Result<ConfigMap>;
}
