use crate::chain::Middleware;
use crate::context::{epoch_millis, ChainMetadata, Context, PerformanceMetrics};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceOptions {
    /// Write `_performanceMetrics` on the context
    pub expose_metrics: bool,
    /// Include resident memory in the exposed metrics
    pub track_memory: bool,
    /// Stamp `_metadata.startTime`
    pub track_timings: bool,
    /// Stamp `_metadata.chainId`
    pub generate_chain_id: bool,
}

impl Default for PerformanceOptions {
    fn default() -> Self {
        Self {
            expose_metrics: false,
            track_memory: false,
            track_timings: true,
            generate_chain_id: true,
        }
    }
}

impl PerformanceOptions {
    /// Every option off: the tracker collapses `_metadata` to `{minimal: true}`
    pub fn minimal() -> Self {
        Self {
            expose_metrics: false,
            track_memory: false,
            track_timings: false,
            generate_chain_id: false,
        }
    }

    pub fn is_minimal(&self) -> bool {
        !(self.expose_metrics || self.track_memory || self.track_timings || self.generate_chain_id)
    }
}

/// Prepares `_metadata` for the chain engine's timing records and optionally
/// exposes per-instance execution counts.
pub struct PerformanceTracker {
    options: PerformanceOptions,
    chain_id: String,
    executions: AtomicU64,
}

impl PerformanceTracker {
    pub fn new(options: PerformanceOptions) -> Self {
        Self {
            options,
            chain_id: format!("chain_{}", Uuid::new_v4().simple()),
            executions: AtomicU64::new(0),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn total_executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Middleware for PerformanceTracker {
    fn name(&self) -> &str {
        "performanceTracker"
    }

    async fn handle(&self, mut ctx: Context) -> anyhow::Result<Context> {
        let total = self.executions.fetch_add(1, Ordering::SeqCst) + 1;

        if self.options.is_minimal() {
            ctx.metadata = Some(ChainMetadata::minimal());
            return Ok(ctx);
        }

        let metadata = ctx.metadata_mut();
        metadata.minimal = None;
        metadata.performance.get_or_insert_with(Default::default);
        metadata.middleware_counts.get_or_insert_with(Default::default);
        if self.options.generate_chain_id {
            metadata.chain_id = Some(self.chain_id.clone());
        }
        if self.options.track_timings {
            metadata.start_time.get_or_insert_with(epoch_millis);
        }

        if self.options.expose_metrics {
            ctx.performance_metrics = Some(PerformanceMetrics {
                total_executions: total,
                chain_id: self
                    .options
                    .generate_chain_id
                    .then(|| self.chain_id.clone()),
                memory_usage: if self.options.track_memory {
                    super::resident_memory()
                } else {
                    None
                },
            });
        }

        Ok(ctx)
    }
}
