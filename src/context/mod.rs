//! Context model
//!
//! - [`types`]: the [`Context`] record and its reserved bookkeeping fields
//! - [`factory`]: constructors for HTTP, scheduled, CLI, message and error contexts

pub mod factory;
pub mod types;

pub use factory::{
    cli_context, create_context, cron_context, current_timestamp, epoch_millis, error_context,
    http_context, message_context, HttpRequestParts,
};
pub use types::{
    ChainMetadata, Context, ErrorRecord, LinkInfo, LoggingMetrics, LoggingSample,
    MiddlewareCounts, MiddlewareTiming, PerformanceMetrics, PerformanceTimings, Timing,
};
