//! Core type definitions for the context threaded through a chain
//!
//! A [`Context`] holds free-form business fields plus a closed set of
//! reserved bookkeeping fields. Reserved fields are `Option`s or empty maps
//! that are skipped on serialization, so a context that no middleware touched
//! serializes to exactly the fields its links wrote.

use crate::chain::InstanceMiddleware;
use crate::error::LinkError;
use crate::middleware::timing::TimedError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Structured failure record stored under `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Timing captured by a `timed` wrapper around the failing link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<BTreeMap<String, Timing>>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: "Error".to_string(),
            stack: None,
            timings: None,
        }
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(message)
        }
    }

    /// Convert an arbitrary failure into a record, never keeping the raw error.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let timed = err.downcast_ref::<TimedError>();
        let name = err
            .downcast_ref::<LinkError>()
            .map(LinkError::kind)
            .unwrap_or("Error");

        // a timing annotation repeats the message of the error it wraps
        let skip = if timed.is_some() { 2 } else { 1 };
        let causes: Vec<String> = err.chain().skip(skip).map(|c| c.to_string()).collect();
        let stack = if causes.is_empty() {
            None
        } else {
            Some(format!(
                "{err}\n    caused by: {}",
                causes.join("\n    caused by: ")
            ))
        };

        Self {
            message: err.to_string(),
            name: name.to_string(),
            stack,
            timings: timed
                .map(|t| BTreeMap::from([(t.label().to_string(), t.timing().clone())])),
        }
    }
}

/// Descriptor of the link currently executing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub name: String,
    pub index: usize,
    pub length: usize,
    pub is_async: bool,
}

/// Wall-clock measurement written by timing middleware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Milliseconds
    pub duration: f64,
    /// Unix epoch milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareCounts {
    pub input: usize,
    pub output: usize,
    pub global: usize,
}

impl MiddlewareCounts {
    pub fn total(&self) -> usize {
        self.input + self.output + self.global
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareTiming {
    pub name: String,
    /// Milliseconds
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTimings {
    pub input_middleware_timings: Vec<MiddlewareTiming>,
    pub output_middleware_timings: Vec<MiddlewareTiming>,
    pub global_middleware_timings: Vec<MiddlewareTiming>,
}

/// Chain-level observability record stored under `_metadata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware_counts: Option<MiddlewareCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceTimings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal: Option<bool>,
}

impl ChainMetadata {
    pub fn minimal() -> Self {
        Self {
            minimal: Some(true),
            ..Default::default()
        }
    }

    pub fn is_minimal(&self) -> bool {
        self.minimal == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSample {
    pub middleware_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<u64>,
    pub timestamp: i64,
}

/// Scratch area owned by the logging middleware
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingMetrics {
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performance: Vec<LoggingSample>,
}

/// Scratch area owned by the performance tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_executions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<u64>,
}

/// The record threaded through every link and middleware of a chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,

    /// Middleware-to-middleware signaling for one execution
    #[serde(rename = "_meta", default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,

    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChainMetadata>,

    #[serde(rename = "_currentLink", default, skip_serializing_if = "Option::is_none")]
    pub current_link: Option<LinkInfo>,

    #[serde(rename = "_linkInfo", default, skip_serializing_if = "Option::is_none")]
    pub link_info: Option<LinkInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<BTreeMap<String, Timing>>,

    #[serde(rename = "_observedBy", default, skip_serializing_if = "Option::is_none")]
    pub observed_by: Option<Map<String, Value>>,

    #[serde(rename = "_loggingMetrics", default, skip_serializing_if = "Option::is_none")]
    pub logging_metrics: Option<LoggingMetrics>,

    #[serde(
        rename = "_performanceMetrics",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub performance_metrics: Option<PerformanceMetrics>,

    /// Snapshot of the owning instance's middleware
    #[serde(skip)]
    pub instance_middleware: Vec<InstanceMiddleware>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Build a context from a JSON object. Reserved keys are parsed into
    /// their typed fields; anything else becomes a business field.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Object(_) => serde_json::from_value(value),
            Value::Null => Ok(Self::new()),
            other => Err(serde::de::Error::custom(format!(
                "context must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn set_error(&mut self, record: ErrorRecord) {
        self.error = Some(record);
    }

    /// The link currently executing, whichever phase we are in.
    pub fn active_link(&self) -> Option<&LinkInfo> {
        self.current_link.as_ref().or(self.link_info.as_ref())
    }

    pub fn metadata_mut(&mut self) -> &mut ChainMetadata {
        self.metadata.get_or_insert_with(ChainMetadata::default)
    }

    pub fn timings_mut(&mut self) -> &mut BTreeMap<String, Timing> {
        self.timings.get_or_insert_with(BTreeMap::new)
    }

    /// Every top-level key this context would serialize.
    pub fn keys(&self) -> Vec<String> {
        match self.to_value() {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub(crate) fn clear_link_descriptors(&mut self) {
        self.current_link = None;
        self.link_info = None;
    }
}

impl From<Map<String, Value>> for Context {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.to_value() == other.to_value()
    }
}
