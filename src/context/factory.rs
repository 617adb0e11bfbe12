//! Constructors for contexts coming from the outside world
//!
//! Every trigger (HTTP request, scheduled job, CLI command, message) builds its
//! context here so the fields a chain can rely on are the same everywhere:
//! a `type` tag and an ISO-8601 `timestamp`, plus the trigger's own data.

use super::types::{Context, ErrorRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Current time as an RFC 3339 string with millisecond precision
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current time in Unix epoch milliseconds
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The parts of an inbound HTTP request a chain gets to see
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpRequestParts {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

pub fn http_context(request: HttpRequestParts) -> Context {
    let mut ctx = tagged("http");
    ctx.set("method", request.method);
    ctx.set("path", request.path);
    ctx.set("headers", json!(request.headers));
    ctx.set("query", json!(request.query));
    ctx.set("body", request.body);
    ctx
}

pub fn cron_context(job_name: &str, schedule: &str) -> Context {
    let mut ctx = tagged("cron");
    ctx.set("job", job_name);
    ctx.set("schedule", schedule);
    ctx.set("scheduledAt", current_timestamp());
    ctx
}

/// Build a CLI context. Object payloads become the context itself, so
/// reserved keys such as `error` land in their typed fields; any other JSON
/// value is kept under `input`.
pub fn cli_context(command: &str, payload: Value) -> Result<Context, serde_json::Error> {
    let mut ctx = match payload {
        Value::Object(_) => Context::from_value(payload)?,
        Value::Null => Context::new(),
        other => Context::new().with("input", other),
    };
    ctx.set("type", "cli");
    ctx.set("command", command);
    ctx.set("timestamp", current_timestamp());
    Ok(ctx)
}

pub fn message_context(topic: &str, payload: Value) -> Context {
    let mut ctx = tagged("message");
    ctx.set("topic", topic);
    ctx.set("message", payload);
    ctx
}

/// Context describing a failure, optionally carrying the fields of the
/// context that was being processed when it happened.
pub fn error_context(err: &anyhow::Error, original: Option<&Context>) -> Context {
    let mut ctx = match original {
        Some(original) => Context::from_fields(original.fields.clone()),
        None => Context::new(),
    };
    ctx.set("type", "error");
    ctx.set("timestamp", current_timestamp());
    ctx.set_error(ErrorRecord::from_error(err));
    ctx
}

/// Plain context from arbitrary fields, stamped with a timestamp
pub fn create_context(fields: Map<String, Value>) -> Context {
    let mut ctx = Context::from_fields(fields);
    if !ctx.contains("timestamp") {
        ctx.set("timestamp", current_timestamp());
    }
    ctx
}

fn tagged(kind: &str) -> Context {
    let mut ctx = Context::new();
    ctx.set("type", kind);
    ctx.set("timestamp", current_timestamp());
    ctx
}
