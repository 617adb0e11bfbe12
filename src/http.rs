//! HTTP adapter: warp routes that turn requests into `http` contexts

use crate::chain::{Chain, InstanceMiddleware};
use crate::context::{http_context, Context, HttpRequestParts};
use crate::error::{ConfigError, ModulinkError, Result};
use crate::metrics::{ChainMetrics, ExecutionTimer};
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::{HeaderMap, Method, StatusCode};
use warp::path::FullPath;
use warp::reply::{self, Reply, Response};
use warp::Filter;

#[derive(Clone)]
struct Route {
    chain: Chain,
    middleware: Vec<InstanceMiddleware>,
}

/// Route table mapping `(method, path)` onto chains.
///
/// Routes may be added after [`HttpAdapter::filter`] has been built; the
/// filter looks them up per request.
#[derive(Clone)]
pub struct HttpAdapter {
    routes: Arc<DashMap<(Method, String), Route>>,
    metrics: Arc<ChainMetrics>,
}

impl HttpAdapter {
    pub fn new(metrics: Arc<ChainMetrics>) -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            metrics,
        }
    }

    pub fn route(&self, method: &str, path: &str, chain: Chain) -> Result<&Self> {
        self.route_with(method, path, chain, Vec::new())
    }

    /// Register a route whose contexts carry the given instance middleware
    pub fn route_with(
        &self,
        method: &str,
        path: &str,
        chain: Chain,
        middleware: Vec<InstanceMiddleware>,
    ) -> Result<&Self> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid HTTP method '{method}' for route {path}"))
        })?;
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "Route path must start with '/': {path}"
            ))
            .into());
        }

        tracing::info!("Registered route {} {} -> {}", method, path, chain.name());
        self.routes
            .insert((method, path.to_string()), Route { chain, middleware });
        Ok(self)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn filter(&self) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                reply::json(&json!({
                    "status": "healthy",
                    "service": "modulink"
                }))
                .into_response()
            });

        let metrics = self.metrics.clone();
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || {
                reply::with_header(
                    metrics.render(),
                    "content-type",
                    "text/plain; version=0.0.4",
                )
                .into_response()
            });

        let adapter = self.clone();
        let chains = warp::method()
            .and(warp::path::full())
            .and(
                warp::query::<BTreeMap<String, String>>()
                    .or(warp::any().map(BTreeMap::new))
                    .unify(),
            )
            .and(warp::header::headers_cloned())
            .and(warp::body::bytes())
            .and_then(
                move |method: Method,
                      path: FullPath,
                      query: BTreeMap<String, String>,
                      headers: HeaderMap,
                      body: Bytes| {
                    let adapter = adapter.clone();
                    async move {
                        Ok::<_, warp::Rejection>(
                            adapter.dispatch(method, path, query, headers, body).await,
                        )
                    }
                },
            );

        health.or(metrics_route).unify().or(chains).unify()
    }

    async fn dispatch(
        &self,
        method: Method,
        path: FullPath,
        query: BTreeMap<String, String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let key = (method.clone(), path.as_str().to_string());
        let Some(route) = self.routes.get(&key).map(|r| r.value().clone()) else {
            let message = format!("No chain for {} {}", method, path.as_str());
            return error_response(
                StatusCode::NOT_FOUND,
                json!({ "message": message, "name": "NotFound" }),
            );
        };

        let body = match parse_body(&body) {
            Ok(body) => body,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    json!({ "message": e.to_string(), "name": "InvalidPayload" }),
                )
            }
        };

        let mut ctx = http_context(HttpRequestParts {
            method: method.to_string(),
            path: path.as_str().to_string(),
            headers: header_map(&headers),
            query,
            body,
        });
        ctx.instance_middleware = route.middleware;

        let timer = ExecutionTimer::new(self.metrics.clone());
        let result = route.chain.execute(ctx).await;
        timer.finish(&result);

        context_response(result)
    }
}

fn parse_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ModulinkError::InvalidPayload(e.to_string()))
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Map a finished context onto a response: validation failures are the
/// caller's fault, everything else is a server error.
pub fn context_response(ctx: Context) -> Response {
    match &ctx.error {
        Some(record) => {
            let status = if record.name == "ValidationError" {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            tracing::warn!("Chain failed with {}: {}", record.name, record.message);
            error_response(status, json!(record))
        }
        None => reply::with_status(reply::json(&ctx.fields), StatusCode::OK).into_response(),
    }
}

fn error_response(status: StatusCode, error: Value) -> Response {
    reply::with_status(reply::json(&json!({ "error": error })), status).into_response()
}

pub async fn serve<F>(
    filter: F,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()>
where
    F: Filter<Extract = (Response,), Error = warp::Rejection> + Clone + Send + Sync + 'static,
{
    let (bound, server) = warp::serve(filter)
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| ModulinkError::Server(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("Serving chains on {}", bound);
    server.await;
    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{chain, Link};
    use crate::error::LinkError;

    fn adapter() -> HttpAdapter {
        HttpAdapter::new(Arc::new(ChainMetrics::new()))
    }

    fn greeting_chain() -> Chain {
        chain([Link::sync("greet", |mut ctx| {
            let name = ctx
                .get("body")
                .and_then(|b| b.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("world")
                .to_string();
            ctx.set("greeting", format!("hello {name}"));
            ctx.remove("headers");
            Ok(ctx)
        })])
        .unwrap()
    }

    #[tokio::test]
    async fn test_route_runs_chain() {
        let http = adapter();
        http.route("POST", "/greet", greeting_chain()).unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/greet?lang=en")
            .body(r#"{"name":"ada"}"#)
            .reply(&http.filter())
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["greeting"], "hello ada");
        assert_eq!(body["type"], "http");
        assert_eq!(body["query"]["lang"], "en");
        assert_eq!(body["method"], "POST");
    }

    #[tokio::test]
    async fn test_error_maps_to_status() {
        let http = adapter();
        http.route(
            "post",
            "/validate",
            chain([Link::sync("check", |_| {
                Err(LinkError::Validation("name required".into()).into())
            })])
            .unwrap(),
        )
        .unwrap();
        http.route(
            "GET",
            "/boom",
            chain([Link::sync("boom", |_| Err(anyhow::anyhow!("exploded")))]).unwrap(),
        )
        .unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/validate")
            .reply(&http.filter())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = warp::test::request()
            .method("GET")
            .path("/boom")
            .reply(&http.filter())
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"]["message"], "exploded");
        assert_eq!(body["error"]["name"], "Error");
    }

    #[tokio::test]
    async fn test_unknown_route_and_bad_payload() {
        let http = adapter();
        http.route("POST", "/greet", greeting_chain()).unwrap();

        let res = warp::test::request()
            .method("GET")
            .path("/greet")
            .reply(&http.filter())
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = warp::test::request()
            .method("POST")
            .path("/greet")
            .body("{not json")
            .reply(&http.filter())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let http = adapter();
        http.route("POST", "/greet", greeting_chain()).unwrap();
        let filter = http.filter();

        warp::test::request()
            .method("POST")
            .path("/greet")
            .reply(&filter)
            .await;

        let res = warp::test::request().path("/health").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request().path("/metrics").reply(&filter).await;
        let text = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(text.contains("modulink_chain_executions_total 1"));
    }

    #[test]
    fn test_invalid_route_rejected() {
        let http = adapter();
        assert!(http.route("POST", "no-slash", greeting_chain()).is_err());
        assert!(http.route("BAD METHOD", "/x", greeting_chain()).is_err());
        assert_eq!(http.route_count(), 0);
    }
}
