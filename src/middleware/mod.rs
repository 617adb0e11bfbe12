//! Observability middleware
//!
//! Plug-ins built on the [`Middleware`](crate::chain::Middleware) contract.
//! They only write reserved context fields and never fail a chain.
//!
//! - [`logging`]: one diagnostic line per invocation, `_loggingMetrics`
//! - [`timing`]: `timings[label]` per link or per execution
//! - [`performance`]: `_metadata` preparation and `_performanceMetrics`

pub mod logging;
pub mod performance;
pub mod timing;

pub use logging::{LogLevel, LoggingMiddleware, LoggingOptions};
pub use performance::{PerformanceOptions, PerformanceTracker};
pub use timing::{timed, TimedError, TimingMiddleware};

use crate::chain::SharedMiddleware;
use std::sync::Arc;

pub fn logging(options: LoggingOptions) -> SharedMiddleware {
    Arc::new(LoggingMiddleware::new(options))
}

pub fn timing(label: impl Into<String>) -> SharedMiddleware {
    Arc::new(TimingMiddleware::new(label))
}

pub fn performance_tracker(options: PerformanceOptions) -> SharedMiddleware {
    Arc::new(PerformanceTracker::new(options))
}

/// Resident set size of this process in bytes
pub(crate) fn resident_memory() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}
