use crate::context::Context;
use prometheus::{Encoder, Histogram, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters for chains run by the HTTP, scheduler and CLI adapters
pub struct ChainMetrics {
    registry: Registry,

    pub executions_total: IntCounter,
    pub failures_total: IntCounter,
    pub execution_duration: Histogram,
}

impl Default for ChainMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let executions_total = IntCounter::new(
            "modulink_chain_executions_total",
            "Total number of chain executions",
        )
        .expect("metric creation failed");
        let failures_total = IntCounter::new(
            "modulink_chain_failures_total",
            "Total number of chain executions that ended with an error",
        )
        .expect("metric creation failed");
        let execution_duration = Histogram::with_opts(prometheus::HistogramOpts::new(
            "modulink_chain_execution_duration_seconds",
            "Chain execution duration in seconds",
        ))
        .expect("metric creation failed");

        registry
            .register(Box::new(executions_total.clone()))
            .unwrap();
        registry.register(Box::new(failures_total.clone())).unwrap();
        registry
            .register(Box::new(execution_duration.clone()))
            .unwrap();

        Self {
            registry,
            executions_total,
            failures_total,
            execution_duration,
        }
    }

    pub fn record_execution(&self, duration: std::time::Duration, failed: bool) {
        self.executions_total.inc();
        self.execution_duration.observe(duration.as_secs_f64());
        if failed {
            self.failures_total.inc();
        }
    }

    pub fn gather_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.gather_metrics(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

pub struct ExecutionTimer {
    start: Instant,
    metrics: Arc<ChainMetrics>,
}

impl ExecutionTimer {
    pub fn new(metrics: Arc<ChainMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    /// Record the execution, counting it as failed when `ctx.error` is set.
    pub fn finish(self, ctx: &Context) {
        self.metrics
            .record_execution(self.start.elapsed(), ctx.has_error());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ErrorRecord;

    #[test]
    fn test_failures_counted_from_context() {
        let metrics = Arc::new(ChainMetrics::new());

        ExecutionTimer::new(metrics.clone()).finish(&Context::new());
        let mut failed = Context::new();
        failed.set_error(ErrorRecord::new("boom"));
        ExecutionTimer::new(metrics.clone()).finish(&failed);

        assert_eq!(metrics.executions_total.get(), 2);
        assert_eq!(metrics.failures_total.get(), 1);
        assert!(metrics
            .render()
            .contains("modulink_chain_executions_total 2"));
    }
}
