//! ModuLink: compose named links into chains and observe them with
//! positioned middleware.
//!
//! ```no_run
//! use modulink::chain::{chain, Link};
//! use modulink::context::Context;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let pipeline = chain([
//!     Link::sync("double", |mut ctx| {
//!         let n = ctx.get_i64("n").unwrap_or(0);
//!         ctx.set("n", n * 2);
//!         Ok(ctx)
//!     }),
//! ])?;
//! let out = pipeline.execute(Context::new().with("n", 21)).await;
//! assert_eq!(out.get_i64("n"), Some(42));
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod instance;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod scheduler;
pub mod utils;

pub use chain::{chain, Chain, ChainBuilder, InstanceMiddleware, Link, Middleware, Next};
pub use context::{Context, ErrorRecord};
pub use error::{ConfigError, LinkError, ModulinkError, Result};
pub use instance::Modulink;
