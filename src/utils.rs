//! Utility links
//!
//! Combinators that build new [`Link`]s out of existing ones. None of them
//! are part of the chain engine; they are ordinary links as far as a chain is
//! concerned.

use crate::chain::{middleware_async, Link, SharedMiddleware};
use crate::context::Context;
use crate::error::LinkError;
use dashmap::DashMap;
use futures::future::{join_all, select_all};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Run `link` only when `predicate` holds; otherwise pass the context through.
pub fn when<P>(name: impl Into<String>, predicate: P, link: Link) -> Link
where
    P: Fn(&Context) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Link::new(name, move |ctx| {
        let link = link.clone();
        let predicate = predicate.clone();
        async move {
            if predicate(&ctx) {
                link.call(ctx).await
            } else {
                Ok(ctx)
            }
        }
    })
}

/// Replace one business field with `f(old)`; a missing field reads as null.
pub fn transform<F>(name: impl Into<String>, field: impl Into<String>, f: F) -> Link
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    let field = field.into();
    Link::sync(name, move |mut ctx| {
        let current = ctx.remove(&field).unwrap_or(Value::Null);
        ctx.set(field.clone(), f(current));
        Ok(ctx)
    })
}

/// Merge fixed fields into the context
pub fn add_data(name: impl Into<String>, data: Map<String, Value>) -> Link {
    Link::sync(name, move |mut ctx| {
        ctx.fields
            .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(ctx)
    })
}

/// Fail with a `ValidationError` when `check` rejects the context
pub fn validate<F>(name: impl Into<String>, check: F) -> Link
where
    F: Fn(&Context) -> Result<(), String> + Send + Sync + 'static,
{
    Link::sync(name, move |ctx| match check(&ctx) {
        Ok(()) => Ok(ctx),
        Err(reason) => Err(LinkError::Validation(reason).into()),
    })
}

/// Output middleware that only runs on failing contexts.
///
/// The handler may clear `ctx.error` to recover, in which case the chain
/// carries on with the next link.
pub fn error_handler<F, Fut>(name: impl Into<String>, handler: F) -> SharedMiddleware
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Context>> + Send + 'static,
{
    let handler = Arc::new(handler);
    middleware_async(name, move |ctx| {
        let handler = handler.clone();
        async move {
            if ctx.has_error() {
                handler(ctx).await
            } else {
                Ok(ctx)
            }
        }
    })
}

/// Re-run a failing link up to `max_attempts` times in total
pub fn retry(link: Link, max_attempts: u32, delay: Duration) -> Link {
    let name = link.name().to_string();
    let attempts = max_attempts.max(1);

    Link::new(name.clone(), move |ctx| {
        let link = link.clone();
        let name = name.clone();
        async move {
            let mut last = String::new();
            for attempt in 1..=attempts {
                match link.call(ctx.clone()).await {
                    Ok(next) => return Ok(next),
                    Err(e) => {
                        warn!(link = %name, attempt, "Attempt failed: {e:#}");
                        last = e.to_string();
                        if attempt < attempts && !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
            Err(LinkError::RetriesExhausted {
                link: name,
                attempts,
                last,
            }
            .into())
        }
    })
}

/// Fail with `TimeoutError` if `link` does not finish within `after`
pub fn timeout(link: Link, after: Duration) -> Link {
    let name = link.name().to_string();
    Link::new(name.clone(), move |ctx| {
        let link = link.clone();
        let name = name.clone();
        async move {
            match tokio::time::timeout(after, link.call(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(LinkError::Timeout { link: name, after }.into()),
            }
        }
    })
}

/// Run every link concurrently on a copy of the context and merge their
/// business fields in declaration order. Any failure fails the whole link.
pub fn parallel(name: impl Into<String>, links: Vec<Link>) -> Link {
    let links = Arc::new(links);
    Link::new(name, move |ctx| {
        let links = links.clone();
        async move {
            let results = join_all(links.iter().map(|link| link.call(ctx.clone()))).await;
            let mut merged = ctx;
            for result in results {
                merged.fields.extend(result?.fields);
            }
            Ok(merged)
        }
    })
}

/// Run every link concurrently and keep whichever finishes first
pub fn race(name: impl Into<String>, links: Vec<Link>) -> Link {
    let name = name.into();
    let links = Arc::new(links);
    Link::new(name.clone(), move |ctx| {
        let links = links.clone();
        let name = name.clone();
        async move {
            if links.is_empty() {
                return Err(LinkError::EmptyRace(name).into());
            }
            let (result, winner, _) =
                select_all(links.iter().map(|link| link.call(ctx.clone()))).await;
            debug!(race = %name, winner = links[winner].name(), "Race settled");
            result
        }
    })
}

type CacheEntries = DashMap<String, (Instant, Context)>;

fn evict_expired(entries: &CacheEntries, ttl: Duration) {
    entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
}

/// Memoize a link's successful results per key for `ttl`.
///
/// A hit returns the stored result marked `cached: true` without invoking
/// the link.
pub fn cache<K>(link: Link, key_fn: K, ttl: Duration) -> Link
where
    K: Fn(&Context) -> String + Send + Sync + 'static,
{
    let name = link.name().to_string();
    let entries: Arc<CacheEntries> = Arc::new(DashMap::new());
    let key_fn = Arc::new(key_fn);

    Link::new(name, move |ctx| {
        let link = link.clone();
        let entries = entries.clone();
        let key_fn = key_fn.clone();
        async move {
            let key = key_fn(&ctx);

            let hit = entries
                .get(&key)
                .filter(|entry| entry.0.elapsed() < ttl)
                .map(|entry| entry.1.clone());
            if let Some(mut cached) = hit {
                debug!(key = %key, "Cache hit");
                cached.set("cached", true);
                return Ok(cached);
            }

            evict_expired(&entries, ttl);
            let result = link.call(ctx).await?;
            entries.insert(key, (Instant::now(), result.clone()));
            Ok(result)
        }
    })
}
