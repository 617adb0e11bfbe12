//! Wiring configured chains onto the HTTP, scheduler and CLI adapters

use crate::chain::{Chain, InstanceMiddleware};
use crate::cli::CommandRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::http::HttpAdapter;
use crate::instance::Modulink;
use crate::metrics::ChainMetrics;
use crate::registry::LinkRegistry;
use crate::scheduler::Scheduler;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Host handle shared by every adapter of a running instance
pub struct Adapters {
    pub metrics: Arc<ChainMetrics>,
    pub http: HttpAdapter,
    pub scheduler: Scheduler,
    pub commands: CommandRegistry,
}

impl Adapters {
    pub fn new(metrics: Arc<ChainMetrics>) -> Self {
        Self {
            http: HttpAdapter::new(metrics.clone()),
            scheduler: Scheduler::new(metrics.clone()),
            commands: CommandRegistry::new(metrics.clone()),
            metrics,
        }
    }
}

/// Build every configured chain. Fails on the first unknown link.
pub fn build_chains(config: &Config, links: &LinkRegistry) -> Result<BTreeMap<String, Chain>> {
    let mut chains = BTreeMap::new();
    for (name, definition) in &config.chains {
        let chain = links.build_chain(name, definition, &config.observability)?;
        chains.insert(name.clone(), chain);
    }
    Ok(chains)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Register commands and routes only
    Passive,
    /// Also start interval jobs; needs a running tokio runtime
    WithSchedules,
}

/// Create an instance whose host carries all adapters, then connect each
/// configured chain to them: every chain becomes a CLI command, chains with a
/// `route` become HTTP routes and chains with `scheduleSecs` become jobs.
pub fn assemble(
    config: &Config,
    links: &LinkRegistry,
    middleware: Vec<InstanceMiddleware>,
    startup: Startup,
) -> Result<Modulink<Adapters>> {
    let chains = build_chains(config, links)?;

    let mut instance = Modulink::with_host(Adapters::new(Arc::new(ChainMetrics::new())));
    for mw in middleware {
        instance.use_middleware(mw);
    }

    instance.connect_with_host(|adapters, _| {
        for (name, chain) in &chains {
            adapters.commands.register(name.clone(), chain.clone());
        }
        Ok(())
    })?;

    instance.connect_with_host(|adapters, modulink| {
        for (name, chain) in &chains {
            if let Some(route) = &config.chains[name].route {
                adapters.http.route_with(
                    &route.method,
                    &route.path,
                    chain.clone(),
                    modulink.middleware().to_vec(),
                )?;
            }
        }
        Ok(())
    })?;

    if startup == Startup::WithSchedules {
        instance.connect_with_host(|adapters, modulink| {
            for (name, chain) in &chains {
                if let Some(every) = config.chains[name].schedule() {
                    adapters.scheduler.schedule_with(
                        name,
                        every,
                        chain.clone(),
                        modulink.middleware().to_vec(),
                    );
                }
            }
            Ok(())
        })?;
    }

    info!(
        "Connected {} chain(s): {} route(s), {} scheduled job(s)",
        chains.len(),
        instance.host().map_or(0, |a| a.http.route_count()),
        instance.host().map_or(0, |a| a.scheduler.job_names().len()),
    );
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainDefinition, RouteConfig};
    use crate::error::{ConfigError, ModulinkError};

    fn config() -> Config {
        let mut config = Config::default();
        config.chains.insert(
            "shout".to_string(),
            ChainDefinition {
                links: vec!["uppercase".to_string()],
                route: Some(RouteConfig {
                    method: "POST".to_string(),
                    path: "/shout".to_string(),
                }),
                ..Default::default()
            },
        );
        config.chains.insert(
            "heartbeat".to_string(),
            ChainDefinition {
                links: vec!["stamp".to_string()],
                schedule_secs: Some(60),
                ..Default::default()
            },
        );
        config
    }

    #[tokio::test]
    async fn test_assemble_connects_adapters() {
        let instance = assemble(
            &config(),
            &LinkRegistry::with_builtins(),
            Vec::new(),
            Startup::WithSchedules,
        )
        .unwrap();
        let adapters = instance.host().unwrap();

        assert_eq!(adapters.commands.names(), vec!["heartbeat", "shout"]);
        assert_eq!(adapters.http.route_count(), 1);
        assert_eq!(adapters.scheduler.job_names(), vec!["heartbeat"]);

        let output = adapters
            .commands
            .run("shout", r#"{"text":"hey"}"#)
            .await
            .unwrap();
        assert!(output.contains("HEY"));
        adapters.scheduler.shutdown();
    }

    #[test]
    fn test_unknown_link_fails_assembly() {
        let mut config = config();
        config.chains.get_mut("shout").unwrap().links.push("nope".to_string());

        let result = assemble(
            &config,
            &LinkRegistry::with_builtins(),
            Vec::new(),
            Startup::Passive,
        );
        assert!(matches!(
            result,
            Err(ModulinkError::Config(ConfigError::UnknownLink { .. }))
        ));
    }
}
