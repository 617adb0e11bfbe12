//! Command registry: chains invoked by name with a JSON payload

use crate::chain::Chain;
use crate::context::{cli_context, Context};
use crate::error::{ModulinkError, Result};
use crate::metrics::{ChainMetrics, ExecutionTimer};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

pub struct CommandRegistry {
    commands: DashMap<String, Chain>,
    metrics: Arc<ChainMetrics>,
}

impl CommandRegistry {
    pub fn new(metrics: Arc<ChainMetrics>) -> Self {
        Self {
            commands: DashMap::new(),
            metrics,
        }
    }

    pub fn register(&self, name: impl Into<String>, chain: Chain) -> &Self {
        let name = name.into();
        tracing::debug!("Registered command '{}'", name);
        self.commands.insert(name, chain);
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Execute a command. An empty payload means no input.
    pub async fn execute(&self, name: &str, payload: &str) -> Result<Context> {
        let chain = self
            .commands
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| ModulinkError::CommandNotFound(name.to_string()))?;

        let payload = if payload.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(payload)
                .map_err(|e| ModulinkError::InvalidPayload(e.to_string()))?
        };

        let ctx = cli_context(name, payload)
            .map_err(|e| ModulinkError::InvalidPayload(e.to_string()))?;

        let timer = ExecutionTimer::new(self.metrics.clone());
        let ctx = chain.execute(ctx).await;
        timer.finish(&ctx);
        Ok(ctx)
    }

    /// Execute and render the resulting context as pretty-printed JSON
    pub async fn run(&self, name: &str, payload: &str) -> Result<String> {
        let ctx = self.execute(name, payload).await?;
        Ok(serde_json::to_string_pretty(&ctx)?)
    }
}
