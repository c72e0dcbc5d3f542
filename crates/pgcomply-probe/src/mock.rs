//! Scripted in-memory probe for tests and offline catalog work
//!
//! Responses are keyed by the request (SQL text, path, rendered command
//! line). Probe calls and session lifecycle are counted so tests can
//! assert things like "a skipped control issues zero probe calls" and
//! "every opened session was closed".

use crate::types::{CommandOutput, CommandSpec, ConfigMap, FileMeta, QueryRows};
use crate::{DbSession, Probe};
use async_trait::async_trait;
use pgcomply_core::{Error, InputValue, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    queries: HashMap<String, std::result::Result<QueryRows, String>>,
    stats: HashMap<String, FileMeta>,
    execs: HashMap<String, CommandOutput>,
    configs: HashMap<String, ConfigMap>,
    connect_error: Option<String>,
    probe_calls: AtomicUsize,
    open_sessions: AtomicIsize,
}

/// Scripted probe; cheap to clone and share across runner tasks
#[derive(Clone, Default)]
pub struct MockProbe {
    state: Arc<MockState>,
}

/// Builder for a `MockProbe`
#[derive(Default)]
pub struct MockProbeBuilder {
    state: MockState,
}

impl MockProbe {
    pub fn builder() -> MockProbeBuilder {
        MockProbeBuilder::default()
    }

    /// Total probe operations issued (queries, stats, execs, config reads)
    pub fn probe_calls(&self) -> usize {
        self.state.probe_calls.load(Ordering::SeqCst)
    }

    /// Sessions opened but not yet closed; zero after a clean run
    pub fn open_sessions(&self) -> isize {
        self.state.open_sessions.load(Ordering::SeqCst)
    }
}

impl MockProbeBuilder {
    /// Script a query result, keyed by exact SQL text
    pub fn query(mut self, sql: &str, rows: QueryRows) -> Self {
        self.state.queries.insert(sql.to_string(), Ok(rows));
        self
    }

    /// Script a query failure
    pub fn query_error(mut self, sql: &str, message: &str) -> Self {
        self.state
            .queries
            .insert(sql.to_string(), Err(message.to_string()));
        self
    }

    pub fn stat(mut self, path: &str, meta: FileMeta) -> Self {
        self.state.stats.insert(path.to_string(), meta);
        self
    }

    /// Script a command result, keyed by the rendered command line
    pub fn exec(mut self, command_line: &str, output: CommandOutput) -> Self {
        self.state.execs.insert(command_line.to_string(), output);
        self
    }

    pub fn config(mut self, path: &str, map: ConfigMap) -> Self {
        self.state.configs.insert(path.to_string(), map);
        self
    }

    /// Make every `open_session` fail with a connection error
    pub fn connect_error(mut self, message: &str) -> Self {
        self.state.connect_error = Some(message.to_string());
        self
    }

    pub fn build(self) -> MockProbe {
        MockProbe {
            state: Arc::new(self.state),
        }
    }
}

#[async_trait]
impl Probe for MockProbe {
    async fn open_session(&self) -> Result<Box<dyn DbSession>> {
        if let Some(message) = &self.state.connect_error {
            return Err(Error::ProbeConnection(message.clone()));
        }
        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }

    async fn stat(&self, path: &str) -> Result<FileMeta> {
        self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .stats
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })
    }

    async fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .execs
            .get(&spec.display())
            .cloned()
            .ok_or_else(|| Error::ProbeFailed(format!("no scripted exec: {}", spec.display())))
    }

    async fn read_config(&self, path: &str) -> Result<ConfigMap> {
        self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .configs
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })
    }
}

struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl DbSession for MockSession {
    async fn query(&mut self, sql: &str, _params: &[InputValue]) -> Result<QueryRows> {
        self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.queries.get(sql) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(message)) => Err(Error::QueryFailed(message.clone())),
            None => Err(Error::QueryFailed(format!("no scripted query: {}", sql))),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
