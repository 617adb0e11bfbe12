//! Middleware contract
//!
//! Middleware has the same shape as a link but is used for cross-cutting
//! work. It is positioned on a chain as input (before every link), output
//! (after every link) or global (after output). Instance-level middleware
//! runs once per execution, before the first link, and may use the
//! callback style with an explicit [`Next`] signal.

use crate::context::Context;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, ctx: Context) -> anyhow::Result<Context>;

    /// Called once per chain execution, after the link loop ends for any
    /// reason, for every distinct middleware registered on the chain.
    fn on_chain_complete(&self, _ctx: &mut Context) {}
}

pub type SharedMiddleware = Arc<dyn Middleware>;

type Handler = dyn Fn(Context) -> BoxFuture<'static, anyhow::Result<Context>> + Send + Sync;

/// Middleware backed by a closure
pub struct FnMiddleware {
    name: String,
    handler: Arc<Handler>,
}

#[async_trait]
impl Middleware for FnMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: Context) -> anyhow::Result<Context> {
        (self.handler)(ctx).await
    }
}

fn display_name(name: String) -> String {
    if name.trim().is_empty() {
        "anonymous".to_string()
    } else {
        name
    }
}

pub fn middleware_fn<F>(name: impl Into<String>, handler: F) -> SharedMiddleware
where
    F: Fn(Context) -> anyhow::Result<Context> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware {
        name: display_name(name.into()),
        handler: Arc::new(move |ctx| futures::future::ready(handler(ctx)).boxed()),
    })
}

pub fn middleware_async<F, Fut>(name: impl Into<String>, handler: F) -> SharedMiddleware
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Context>> + Send + 'static,
{
    Arc::new(FnMiddleware {
        name: display_name(name.into()),
        handler: Arc::new(move |ctx| handler(ctx).boxed()),
    })
}

/// Continuation signal handed to callback-style instance middleware.
///
/// Not calling [`Next::proceed`] stops the execution: the chain returns the
/// context the middleware produced without running any link.
#[derive(Debug, Clone, Default)]
pub struct Next {
    called: Arc<AtomicBool>,
}

impl Next {
    pub fn proceed(&self) {
        self.called.store(true, Ordering::SeqCst);
    }

    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait NextMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, ctx: Context, next: Next) -> anyhow::Result<Context>;
}

type NextHandler =
    dyn Fn(Context, Next) -> BoxFuture<'static, anyhow::Result<Context>> + Send + Sync;

struct FnNextMiddleware {
    name: String,
    handler: Arc<NextHandler>,
}

#[async_trait]
impl NextMiddleware for FnNextMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: Context, next: Next) -> anyhow::Result<Context> {
        (self.handler)(ctx, next).await
    }
}

/// Middleware registered on a [`Modulink`](crate::instance::Modulink) instance
#[derive(Clone)]
pub enum InstanceMiddleware {
    /// One-argument transformer
    Transform(SharedMiddleware),
    /// `(ctx, next)` style
    Callback(Arc<dyn NextMiddleware>),
}

impl InstanceMiddleware {
    pub fn callback<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Context>> + Send + 'static,
    {
        InstanceMiddleware::Callback(Arc::new(FnNextMiddleware {
            name: display_name(name.into()),
            handler: Arc::new(move |ctx, next| handler(ctx, next).boxed()),
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            InstanceMiddleware::Transform(mw) => mw.name(),
            InstanceMiddleware::Callback(mw) => mw.name(),
        }
    }

    /// Run and report whether the chain should continue.
    pub(crate) async fn run(&self, ctx: Context) -> anyhow::Result<(Context, bool)> {
        match self {
            InstanceMiddleware::Transform(mw) => Ok((mw.handle(ctx).await?, true)),
            InstanceMiddleware::Callback(mw) => {
                let next = Next::default();
                let ctx = mw.handle(ctx, next.clone()).await?;
                Ok((ctx, next.was_called()))
            }
        }
    }
}

impl From<SharedMiddleware> for InstanceMiddleware {
    fn from(mw: SharedMiddleware) -> Self {
        InstanceMiddleware::Transform(mw)
    }
}

impl fmt::Debug for InstanceMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceMiddleware::Transform(mw) => {
                f.debug_tuple("Transform").field(&mw.name()).finish()
            }
            InstanceMiddleware::Callback(mw) => f.debug_tuple("Callback").field(&mw.name()).finish(),
        }
    }
}

pub(crate) fn same_middleware(a: &SharedMiddleware, b: &SharedMiddleware) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
