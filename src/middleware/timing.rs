//! Wall-clock timing, as a link wrapper or as chain middleware

use crate::chain::{Link, Middleware};
use crate::context::{epoch_millis, Context, Timing};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::trace;

/// Timing attached to a failure raised inside a [`timed`] link.
///
/// Displays as the original message, so the captured `error.message` is
/// unchanged; the timing itself is copied into `error.timings`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TimedError {
    label: String,
    timing: Timing,
    message: String,
}

impl TimedError {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }
}

fn measure(started: Instant) -> Timing {
    Timing {
        duration: started.elapsed().as_secs_f64() * 1000.0,
        timestamp: epoch_millis(),
    }
}

/// Wrap a link so every call records `timings[label]` on its result.
pub fn timed(label: impl Into<String>, link: Link) -> Link {
    let label = label.into();
    let name = link.name().to_string();

    Link::new(name, move |ctx| {
        let link = link.clone();
        let label = label.clone();
        async move {
            let started = Instant::now();
            match link.call(ctx).await {
                Ok(mut ctx) => {
                    ctx.timings_mut().insert(label, measure(started));
                    Ok(ctx)
                }
                Err(e) => {
                    let message = e.to_string();
                    let timing = measure(started);
                    Err(e.context(TimedError {
                        label,
                        timing,
                        message,
                    }))
                }
            }
        }
    })
}

#[derive(Debug, Default)]
struct TimingState {
    started: Option<Instant>,
    calls: u64,
}

/// Measures a whole chain execution under one label.
///
/// The first call during an execution starts the clock; the completion hook
/// writes `timings[label]` once and marks the context `processed`. The clock
/// lives in the middleware, so concurrent executions of the same chain share
/// it.
pub struct TimingMiddleware {
    label: String,
    state: Mutex<TimingState>,
    completed: AtomicU64,
}

impl TimingMiddleware {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(TimingState::default()),
            completed: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Executions this middleware has written a timing for
    pub fn completed_executions(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    async fn handle(&self, ctx: Context) -> anyhow::Result<Context> {
        let mut state = self.state.lock();
        state.started.get_or_insert_with(Instant::now);
        state.calls += 1;
        Ok(ctx)
    }

    fn on_chain_complete(&self, ctx: &mut Context) {
        let mut state = self.state.lock();
        let Some(started) = state.started.take() else {
            return;
        };
        let calls = std::mem::take(&mut state.calls);
        drop(state);

        let timing = measure(started);
        trace!(label = %self.label, calls, duration_ms = timing.duration, "Chain timed");
        ctx.timings_mut().insert(self.label.clone(), timing);
        ctx.set("processed", true);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}
