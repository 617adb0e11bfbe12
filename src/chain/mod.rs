//! Chain execution engine
//!
//! A [`Chain`] is an ordered list of [`Link`]s plus three middleware
//! registries. Executing it threads one [`Context`] through the following
//! protocol:
//!
//! 1. instance middleware (from the context's owning instance), once
//! 2. for every link: input middleware, the link, output middleware,
//!    global middleware, then descriptor cleanup
//! 3. completion hooks of every distinct registered middleware
//!
//! Failures never escape as errors; they are captured into `ctx.error`.
//! A link failure stops the remaining links but still lets that link's
//! output middleware observe the failing context.

pub mod link;
pub mod middleware;

pub use link::{Link, LinkFuture};
pub use middleware::{
    middleware_async, middleware_fn, InstanceMiddleware, Middleware, Next, NextMiddleware,
    SharedMiddleware,
};

use crate::context::{Context, ErrorRecord, LinkInfo, MiddlewareCounts, MiddlewareTiming};
use crate::error::ConfigError;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Input,
    Output,
    Global,
}

#[derive(Clone, Default)]
struct Registries {
    input: Vec<SharedMiddleware>,
    output: Vec<SharedMiddleware>,
    global: Vec<SharedMiddleware>,
}

impl Registries {
    fn counts(&self) -> MiddlewareCounts {
        MiddlewareCounts {
            input: self.input.len(),
            output: self.output.len(),
            global: self.global.len(),
        }
    }

    fn distinct(&self) -> Vec<SharedMiddleware> {
        let mut seen: Vec<SharedMiddleware> = Vec::new();
        for mw in self.input.iter().chain(&self.output).chain(&self.global) {
            if !seen.iter().any(|s| middleware::same_middleware(s, mw)) {
                seen.push(mw.clone());
            }
        }
        seen
    }
}

/// Introspection snapshot returned by [`Chain::debug_info`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub link_count: usize,
    pub middleware_counts: MiddlewareCounts,
    pub total_middleware: usize,
}

struct ChainInner {
    name: String,
    links: Vec<Link>,
    registries: ArcSwap<Registries>,
}

/// A compiled chain. Cloning shares the links and the middleware registries.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<ChainInner>,
}

/// Compile links into a chain. Zero links gives an identity chain.
pub fn chain(links: impl IntoIterator<Item = Link>) -> Result<Chain, ConfigError> {
    ChainBuilder::new().links(links).build()
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn links(&self) -> Vec<&str> {
        self.inner.links.iter().map(Link::name).collect()
    }

    /// Register global middleware, run after every link's output phase
    pub fn use_global(&self, middleware: impl IntoIterator<Item = SharedMiddleware>) -> &Self {
        self.append(Phase::Global, middleware.into_iter().collect())
    }

    /// Register middleware that runs before every link
    pub fn use_on_input(&self, middleware: impl IntoIterator<Item = SharedMiddleware>) -> &Self {
        self.append(Phase::Input, middleware.into_iter().collect())
    }

    /// Register middleware that runs after every link
    pub fn use_on_output(&self, middleware: impl IntoIterator<Item = SharedMiddleware>) -> &Self {
        self.append(Phase::Output, middleware.into_iter().collect())
    }

    pub fn on_input(&self, middleware: impl IntoIterator<Item = SharedMiddleware>) -> &Self {
        self.use_on_input(middleware)
    }

    pub fn on_output(&self, middleware: impl IntoIterator<Item = SharedMiddleware>) -> &Self {
        self.use_on_output(middleware)
    }

    fn append(&self, phase: Phase, added: Vec<SharedMiddleware>) -> &Self {
        if added.is_empty() {
            return self;
        }
        self.inner.registries.rcu(|current| {
            let mut next = Registries::clone(current);
            let target = match phase {
                Phase::Input => &mut next.input,
                Phase::Output => &mut next.output,
                Phase::Global => &mut next.global,
            };
            target.extend(added.iter().cloned());
            next
        });
        self
    }

    pub fn debug_info(&self) -> DebugInfo {
        let counts = self.inner.registries.load().counts();
        DebugInfo {
            link_count: self.inner.links.len(),
            middleware_counts: counts,
            total_middleware: counts.total(),
        }
    }

    /// This chain as a middleware value for another chain
    pub fn as_middleware(&self) -> SharedMiddleware {
        Arc::new(self.clone())
    }

    /// Run the full protocol. Never fails: errors end up in `ctx.error`.
    pub async fn execute(&self, ctx: Context) -> Context {
        let registries = self.inner.registries.load_full();
        let span = debug_span!(
            "chain_execution",
            chain = %self.inner.name,
            links = self.inner.links.len(),
        );

        async move {
            let mut ctx = self.run_protocol(ctx, &registries).await;
            ctx.clear_link_descriptors();

            for mw in registries.distinct() {
                mw.on_chain_complete(&mut ctx);
            }
            for mw in &ctx.instance_middleware.clone() {
                if let InstanceMiddleware::Transform(mw) = mw {
                    mw.on_chain_complete(&mut ctx);
                }
            }

            if let Some(err) = &ctx.error {
                debug!(error = %err.message, "Chain execution finished with error");
            } else {
                debug!("Chain execution finished");
            }
            ctx
        }
        .instrument(span)
        .await
    }

    /// Run only the links, bypassing every middleware registry.
    ///
    /// This is the path taken when the chain is nested as middleware inside
    /// another chain, so nesting never multiplies middleware invocations.
    pub async fn execute_core(&self, mut ctx: Context) -> Context {
        for link in &self.inner.links {
            ctx = run_link(link, ctx).await;
            if ctx.has_error() {
                break;
            }
        }
        ctx
    }

    async fn run_protocol(&self, mut ctx: Context, registries: &Registries) -> Context {
        let counts = registries.counts();
        let instance = ctx.instance_middleware.clone();

        if !instance.is_empty() || counts.total() > 0 {
            activate_metadata(&mut ctx, counts);
        }

        for mw in &instance {
            match mw.run(ctx.clone()).await {
                Ok((next, true)) => {
                    ctx = next;
                    if ctx.has_error() {
                        warn!(middleware = mw.name(), "Instance middleware set an error");
                        return ctx;
                    }
                }
                Ok((next, false)) => {
                    debug!(middleware = mw.name(), "Instance middleware did not call next");
                    return next;
                }
                Err(e) => {
                    warn!(middleware = mw.name(), "Instance middleware failed: {e:#}");
                    ctx.set_error(ErrorRecord::from_error(&e));
                    return ctx;
                }
            }
        }

        let length = self.inner.links.len();
        for (index, link) in self.inner.links.iter().enumerate() {
            let descriptor = LinkInfo {
                name: link.name().to_string(),
                index,
                length,
                is_async: link.is_async(),
            };
            debug!("Executing link {}/{}: '{}'", index + 1, length, link.name());
            ctx.current_link = Some(descriptor.clone());

            for mw in &registries.input {
                ctx = run_middleware(mw, ctx, Phase::Input).await;
                if ctx.has_error() {
                    warn!(
                        middleware = mw.name(),
                        link = link.name(),
                        "Input middleware stopped the chain"
                    );
                    return ctx;
                }
            }

            ctx = run_link(link, ctx).await;

            ctx.current_link = None;
            ctx.link_info = Some(descriptor);

            for mw in &registries.output {
                ctx = run_middleware(mw, ctx, Phase::Output).await;
            }

            for mw in &registries.global {
                ctx = run_middleware(mw, ctx, Phase::Global).await;
                if ctx.has_error() {
                    break;
                }
            }

            ctx.clear_link_descriptors();

            if ctx.has_error() {
                debug!(
                    "Chain execution stopped at link '{}' ({} remaining)",
                    link.name(),
                    length - index - 1
                );
                break;
            }
        }

        ctx
    }
}

fn activate_metadata(ctx: &mut Context, counts: MiddlewareCounts) {
    let metadata = ctx.metadata_mut();
    if metadata.middleware_counts.is_none() {
        metadata.middleware_counts = Some(counts);
    }
    if metadata.performance.is_none() && !metadata.is_minimal() {
        metadata.performance = Some(Default::default());
    }
}

async fn run_link(link: &Link, ctx: Context) -> Context {
    let before = ctx.clone();
    match link.call(ctx).await {
        Ok(next) => next,
        Err(e) => {
            warn!(link = link.name(), "Link failed: {e:#}");
            let mut failed = before;
            failed.set_error(ErrorRecord::from_error(&e));
            failed
        }
    }
}

async fn run_middleware(mw: &SharedMiddleware, ctx: Context, phase: Phase) -> Context {
    let before = ctx.clone();
    let started = Instant::now();
    let mut ctx = match mw.handle(ctx).await {
        Ok(next) => next,
        Err(e) => {
            warn!(middleware = mw.name(), ?phase, "Middleware failed: {e:#}");
            let mut failed = before;
            failed.set_error(ErrorRecord::from_error(&e));
            failed
        }
    };
    record_timing(&mut ctx, phase, mw.name(), started.elapsed());
    ctx
}

fn record_timing(ctx: &mut Context, phase: Phase, name: &str, elapsed: Duration) {
    let Some(performance) = ctx.metadata.as_mut().and_then(|m| m.performance.as_mut()) else {
        return;
    };
    let timing = MiddlewareTiming {
        name: name.to_string(),
        duration: elapsed.as_secs_f64() * 1000.0,
    };
    match phase {
        Phase::Input => performance.input_middleware_timings.push(timing),
        Phase::Output => performance.output_middleware_timings.push(timing),
        Phase::Global => performance.global_middleware_timings.push(timing),
    }
}

#[async_trait]
impl Middleware for Chain {
    fn name(&self) -> &str {
        &self.inner.name
    }

    /// Nested chains only share `_meta` with their host.
    async fn handle(&self, mut ctx: Context) -> anyhow::Result<Context> {
        let nested = self.execute_core(ctx.clone()).await;
        if let Some(err) = &nested.error {
            debug!(chain = %self.inner.name, "Nested chain failed: {}", err.message);
        }
        ctx.meta = nested.meta;
        Ok(ctx)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.inner.name)
            .field("links", &self.links())
            .field("middleware", &self.debug_info().middleware_counts)
            .finish()
    }
}

/// Builder for [`Chain`]. Every method consumes the builder and returns the
/// extended one; nothing is validated until [`ChainBuilder::build`].
#[derive(Clone, Default)]
pub struct ChainBuilder {
    name: Option<String>,
    links: Vec<Link>,
    registries: Registries,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn links(mut self, links: impl IntoIterator<Item = Link>) -> Self {
        self.links.extend(links);
        self
    }

    pub fn with_on_input(mut self, mw: SharedMiddleware) -> Self {
        self.registries.input.push(mw);
        self
    }

    pub fn with_on_output(mut self, mw: SharedMiddleware) -> Self {
        self.registries.output.push(mw);
        self
    }

    pub fn with_global(mut self, mw: SharedMiddleware) -> Self {
        self.registries.global.push(mw);
        self
    }

    pub fn build(self) -> Result<Chain, ConfigError> {
        if let Some(index) = self.links.iter().position(|l| l.name().trim().is_empty()) {
            return Err(ConfigError::EmptyLinkName(index));
        }

        let name = self.name.unwrap_or_else(|| {
            if self.links.is_empty() {
                "chain".to_string()
            } else {
                let names: Vec<&str> = self.links.iter().map(Link::name).collect();
                format!("chain[{}]", names.join(","))
            }
        });

        Ok(Chain {
            inner: Arc::new(ChainInner {
                name,
                links: self.links,
                registries: ArcSwap::from_pointee(self.registries),
            }),
        })
    }
}
