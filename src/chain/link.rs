//! Named units of business logic

use crate::context::Context;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type LinkFuture = BoxFuture<'static, anyhow::Result<Context>>;

type Handler = dyn Fn(Context) -> LinkFuture + Send + Sync;

/// A single processing step: `Context -> Result<Context>`.
///
/// Every link carries an explicit name. The name shows up in `_currentLink`,
/// in log lines and in error diagnostics; chains refuse blank names when they
/// are built.
#[derive(Clone)]
pub struct Link {
    name: Arc<str>,
    is_async: bool,
    handler: Arc<Handler>,
}

impl Link {
    /// Wrap an async function
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Context>> + Send + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            is_async: true,
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
        }
    }

    /// Wrap a synchronous function
    pub fn sync<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context) -> anyhow::Result<Context> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            is_async: false,
            handler: Arc::new(move |ctx| futures::future::ready(handler(ctx)).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Same behavior under a different name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn call(&self, ctx: Context) -> LinkFuture {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("is_async", &self.is_async)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_and_async_links() {
        let double = Link::sync("double", |mut ctx| {
            let value = ctx.get_i64("value").unwrap_or(0);
            ctx.set("value", value * 2);
            Ok(ctx)
        });
        let add_one = Link::new("addOne", |mut ctx: Context| async move {
            let value = ctx.get_i64("value").unwrap_or(0);
            ctx.set("value", value + 1);
            Ok(ctx)
        });

        assert!(!double.is_async());
        assert!(add_one.is_async());

        let ctx = double.call(Context::new().with("value", 4)).await.unwrap();
        let ctx = add_one.call(ctx).await.unwrap();
        assert_eq!(ctx.get_i64("value"), Some(9));
    }

    #[test]
    fn test_renamed_keeps_kind() {
        let link = Link::sync("a", Ok).renamed("b");
        assert_eq!(link.name(), "b");
        assert!(!link.is_async());
    }
}
