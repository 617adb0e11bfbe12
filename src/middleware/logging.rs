use crate::chain::Middleware;
use crate::context::{epoch_millis, Context, LoggingSample};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingOptions {
    pub detect_function_names: bool,
    /// Stamp `_metadata.endTime` and `_metadata.totalDuration` on every call
    pub log_timing: bool,
    #[serde(alias = "enablePerformanceTracking")]
    pub track_performance: bool,
    /// Stamp `_metadata.chainId`, `linkCount` and `sharedTimestamp`
    pub expose_metadata: bool,
    pub level: LogLevel,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            detect_function_names: true,
            log_timing: true,
            track_performance: false,
            expose_metadata: true,
            level: LogLevel::Info,
        }
    }
}

/// Logs one line per invocation naming the link being processed.
pub struct LoggingMiddleware {
    options: LoggingOptions,
    executions: AtomicU64,
}

impl LoggingMiddleware {
    pub fn new(options: LoggingOptions) -> Self {
        Self {
            options,
            executions: AtomicU64::new(0),
        }
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    fn resolve_name(&self, ctx: &Context) -> String {
        if !self.options.detect_function_names {
            return "unknown".to_string();
        }
        ctx.active_link()
            .map(|link| link.name.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn is_minimal(&self, ctx: &Context) -> bool {
        let nothing_enabled = !(self.options.log_timing
            || self.options.track_performance
            || self.options.expose_metadata);
        nothing_enabled || ctx.metadata.as_ref().is_some_and(|m| m.is_minimal())
    }

    fn line(&self, name: &str) -> String {
        let shown = if name == "anonymous" {
            "anonymous function"
        } else {
            name
        };
        format!("[{}] Chain execution: {}", self.options.level.label(), shown)
    }

    fn emit(&self, name: &str) {
        let line = self.line(name);
        match self.options.level {
            LogLevel::Trace => trace!("{line}"),
            LogLevel::Debug => debug!("{line}"),
            LogLevel::Info => info!("{line}"),
            LogLevel::Warn => warn!("{line}"),
            LogLevel::Error => error!("{line}"),
        }
    }

    fn stamp_metadata(&self, ctx: &mut Context, now: i64) {
        let link_count = ctx.active_link().map(|link| link.length);
        let metadata = ctx.metadata_mut();
        let start = *metadata.start_time.get_or_insert(now);

        if self.options.expose_metadata {
            metadata
                .chain_id
                .get_or_insert_with(|| format!("chain_{}", Uuid::new_v4().simple()));
            if metadata.link_count.is_none() {
                metadata.link_count = link_count;
            }
            metadata.shared_timestamp.get_or_insert(now);
        }

        if self.options.log_timing {
            metadata.end_time = Some(now);
            metadata.total_duration = Some(now - start);
        }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(LoggingOptions::default())
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, mut ctx: Context) -> anyhow::Result<Context> {
        let started = Instant::now();
        let count = self.executions.fetch_add(1, Ordering::SeqCst) + 1;

        let name = self.resolve_name(&ctx);
        self.emit(&name);

        ctx.observed_by
            .get_or_insert_with(Map::new)
            .insert("enhancedLogging".to_string(), json!(true));
        let metrics = ctx.logging_metrics.get_or_insert_with(Default::default);
        metrics.execution_count = count;
        metrics.last_link = Some(name);

        let now = epoch_millis();
        if !self.is_minimal(&ctx) {
            self.stamp_metadata(&mut ctx, now);
        }

        if self.options.track_performance {
            let sample = LoggingSample {
                middleware_duration: started.elapsed().as_secs_f64() * 1000.0,
                memory_usage: super::resident_memory(),
                timestamp: now,
            };
            ctx.logging_metrics
                .get_or_insert_with(Default::default)
                .performance
                .push(sample);
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChainMetadata, LinkInfo};

    fn at_link(name: &str) -> Context {
        let mut ctx = Context::new();
        ctx.current_link = Some(LinkInfo {
            name: name.to_string(),
            index: 0,
            length: 3,
            is_async: false,
        });
        ctx
    }

    #[test]
    fn test_diagnostic_line() {
        let logging = LoggingMiddleware::default();
        assert_eq!(logging.line("loadUser"), "[INFO] Chain execution: loadUser");
        assert_eq!(
            logging.line("anonymous"),
            "[INFO] Chain execution: anonymous function"
        );

        let warn = LoggingMiddleware::new(LoggingOptions {
            level: LogLevel::Warn,
            ..Default::default()
        });
        assert_eq!(warn.line("unknown"), "[WARN] Chain execution: unknown");
    }

    #[tokio::test]
    async fn test_resolves_link_name() {
        let logging = LoggingMiddleware::default();
        let ctx = logging.handle(at_link("loadUser")).await.unwrap();

        let metrics = ctx.logging_metrics.unwrap();
        assert_eq!(metrics.last_link.as_deref(), Some("loadUser"));
        assert_eq!(metrics.execution_count, 1);
        assert_eq!(ctx.observed_by.unwrap()["enhancedLogging"], json!(true));

        let metadata = ctx.metadata.unwrap();
        assert_eq!(metadata.link_count, Some(3));
        assert!(metadata.chain_id.is_some());
        assert!(metadata.total_duration.is_some());
    }

    #[tokio::test]
    async fn test_name_fallbacks() {
        let logging = LoggingMiddleware::default();
        let ctx = logging.handle(Context::new()).await.unwrap();
        assert_eq!(
            ctx.logging_metrics.unwrap().last_link.as_deref(),
            Some("anonymous")
        );

        let logging = LoggingMiddleware::new(LoggingOptions {
            detect_function_names: false,
            ..Default::default()
        });
        let ctx = logging.handle(at_link("loadUser")).await.unwrap();
        assert_eq!(
            ctx.logging_metrics.unwrap().last_link.as_deref(),
            Some("unknown")
        );
    }

    #[tokio::test]
    async fn test_minimal_metadata_is_left_alone() {
        let logging = LoggingMiddleware::default();
        let mut ctx = at_link("a");
        ctx.metadata = Some(ChainMetadata::minimal());

        let ctx = logging.handle(ctx).await.unwrap();
        assert_eq!(ctx.metadata, Some(ChainMetadata::minimal()));
        assert!(ctx.logging_metrics.is_some());
    }

    #[tokio::test]
    async fn test_performance_samples() {
        let logging = LoggingMiddleware::new(LoggingOptions {
            track_performance: true,
            ..Default::default()
        });
        let ctx = logging.handle(at_link("a")).await.unwrap();
        let ctx = logging.handle(ctx).await.unwrap();

        let metrics = ctx.logging_metrics.unwrap();
        assert_eq!(metrics.performance.len(), 2);
        assert_eq!(metrics.execution_count, 2);
        assert_eq!(logging.executions(), 2);
    }

    #[test]
    fn test_options_accept_legacy_alias() {
        let options: LoggingOptions =
            serde_json::from_str(r#"{"enablePerformanceTracking": true, "level": "debug"}"#)
                .unwrap();
        assert!(options.track_performance);
        assert_eq!(options.level, LogLevel::Debug);
    }
}
