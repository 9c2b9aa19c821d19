//! State shared by every connection task

use std::sync::Arc;

use tr_core::config::ExecutorConfig;

use crate::executor::{CommandExecutor, CommandRunner};
use crate::registry::ClientRegistry;

/// Shared server state
///
/// Only the registry is shared between connections. The command runner is
/// either fixed at construction or rebuilt from the freshly loaded config
/// for each connection.
#[derive(Default)]
pub struct ServerState {
    /// Connected clients
    pub registry: Arc<ClientRegistry>,
    /// Runner used instead of the configured executor
    runner: Option<Arc<dyn CommandRunner>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State whose connections all use `runner`
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            registry: Arc::new(ClientRegistry::new()),
            runner: Some(runner),
        }
    }

    /// Runner for a new connection under the given executor settings
    pub fn runner_for(&self, config: &ExecutorConfig) -> Arc<dyn CommandRunner> {
        match &self.runner {
            Some(runner) => Arc::clone(runner),
            None => Arc::new(CommandExecutor::new(config.clone())),
        }
    }
}
