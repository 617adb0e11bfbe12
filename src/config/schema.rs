use crate::middleware::{LoggingOptions, PerformanceOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub chains: BTreeMap<String, ChainDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Middleware attached to every chain whose definition sets `observe`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: Option<LoggingOptions>,
    #[serde(default)]
    pub performance: Option<PerformanceOptions>,
    /// Label for whole-execution timing
    #[serde(default)]
    pub timing: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDefinition {
    /// Registered link names, in execution order
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub route: Option<RouteConfig>,
    #[serde(default)]
    pub schedule_secs: Option<u64>,
    #[serde(default)]
    pub observe: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_method() -> String {
    "POST".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ChainDefinition {
    pub fn schedule(&self) -> Option<Duration> {
        self.schedule_secs.map(Duration::from_secs)
    }
}
