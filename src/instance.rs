//! Instance wrapper
//!
//! Holds an optional host handle (an HTTP router, a scheduler, a command
//! registry...), the instance-level middleware list and the `connect` hooks
//! through which routes, jobs and commands are registered.

use crate::chain::InstanceMiddleware;
use crate::context::{create_context, Context};
use crate::error::{ConfigError, ModulinkError, Result};
use serde_json::{Map, Value};
use tracing::debug;

pub struct Modulink<H = ()> {
    host: Option<H>,
    middleware: Vec<InstanceMiddleware>,
}

impl<H> Default for Modulink<H> {
    fn default() -> Self {
        Self {
            host: None,
            middleware: Vec::new(),
        }
    }
}

impl<H> Modulink<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: H) -> Self {
        Self {
            host: Some(host),
            middleware: Vec::new(),
        }
    }

    pub fn host(&self) -> Option<&H> {
        self.host.as_ref()
    }

    pub fn middleware(&self) -> &[InstanceMiddleware] {
        &self.middleware
    }

    pub fn use_middleware(&mut self, middleware: impl Into<InstanceMiddleware>) -> &mut Self {
        let middleware = middleware.into();
        debug!(middleware = middleware.name(), "Registered instance middleware");
        self.middleware.push(middleware);
        self
    }

    /// Context carrying `fields` plus a snapshot of the current instance
    /// middleware, which any chain executing it will run first.
    pub fn create_context(&self, fields: Map<String, Value>) -> Context {
        let mut ctx = create_context(fields);
        ctx.instance_middleware = self.middleware.clone();
        ctx
    }

    /// Invoke `f` right away with this instance.
    pub fn connect<F>(&self, f: F) -> Result<&Self>
    where
        F: FnOnce(&Self) -> anyhow::Result<()>,
    {
        f(self).map_err(ModulinkError::Connect)?;
        Ok(self)
    }

    /// Invoke `f` right away with the host handle and this instance.
    pub fn connect_with_host<F>(&self, f: F) -> Result<&Self>
    where
        F: FnOnce(&H, &Self) -> anyhow::Result<()>,
    {
        let host = self.host.as_ref().ok_or(ConfigError::MissingHost)?;
        f(host, self).map_err(ModulinkError::Connect)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::middleware_fn;
    use std::cell::RefCell;

    #[test]
    fn test_connect_runs_immediately_in_order() {
        let instance: Modulink<&str> = Modulink::with_host("router");
        let calls = RefCell::new(Vec::new());

        instance
            .connect(|_| {
                calls.borrow_mut().push("plain".to_string());
                Ok(())
            })
            .unwrap()
            .connect_with_host(|host, _| {
                calls.borrow_mut().push(format!("host:{host}"));
                Ok(())
            })
            .unwrap();

        assert_eq!(*calls.borrow(), vec!["plain", "host:router"]);
    }

    #[test]
    fn test_connect_with_host_requires_host() {
        let instance: Modulink = Modulink::new();
        let result = instance.connect_with_host(|_, _| Ok(()));
        assert!(matches!(
            result,
            Err(ModulinkError::Config(ConfigError::MissingHost))
        ));
    }

    #[test]
    fn test_create_context_snapshots_middleware() {
        let mut instance: Modulink = Modulink::new();
        instance.use_middleware(middleware_fn("first", Ok));

        let ctx = instance.create_context(Map::new());
        instance.use_middleware(middleware_fn("second", Ok));

        assert_eq!(ctx.instance_middleware.len(), 1);
        assert_eq!(ctx.instance_middleware[0].name(), "first");
        assert!(ctx.contains("timestamp"));
    }
}
