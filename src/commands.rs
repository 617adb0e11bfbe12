use crate::app::build_chains;
use crate::config::Config;
use crate::context::cli_context;
use crate::error::{ConfigError, ModulinkError, Result};
use crate::registry::LinkRegistry;
use serde_json::Value;
use tracing::{error, info, warn};

/// Validate the configuration, assemble every chain and, with `dry_run`,
/// execute each one once against an empty CLI context.
pub async fn run_config_check(config: Config, links: &LinkRegistry, dry_run: bool) -> Result<()> {
    info!("Checking configuration...");

    crate::config::validate(&config)?;
    info!("✓ Configuration is valid");

    let chains = build_chains(&config, links)?;
    info!("✓ {} chain(s) assembled", chains.len());

    let mut all_ok = true;

    for (name, chain) in &chains {
        let definition = &config.chains[name];
        info!("\nChain: {}", name);
        info!("  Links: {}", definition.links.join(" -> "));
        if let Some(route) = &definition.route {
            info!("  Route: {} {}", route.method.to_uppercase(), route.path);
        }
        if let Some(secs) = definition.schedule_secs {
            info!("  Schedule: every {}s", secs);
        }
        let counts = chain.debug_info().middleware_counts;
        info!(
            "  Middleware: {} input, {} output, {} global",
            counts.input, counts.output, counts.global
        );

        if dry_run {
            let ctx = chain.execute(cli_context(name, Value::Null)?).await;
            match &ctx.error {
                None => info!("  ✓ Dry run passed"),
                Some(e) if e.name == "ValidationError" => {
                    warn!("  ! Dry run rejected empty input: {}", e.message)
                }
                Some(e) => {
                    error!("  ✗ Dry run failed: {}", e.message);
                    all_ok = false;
                }
            }
        }
    }

    if all_ok {
        info!("\n✓ All checks passed");
        Ok(())
    } else {
        Err(ModulinkError::Config(ConfigError::Validation(
            "One or more chains failed checks".to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainDefinition;

    fn config_with(links: &[&str]) -> Config {
        let mut config = Config::default();
        config.chains.insert(
            "main".to_string(),
            ChainDefinition {
                links: links.iter().map(|l| l.to_string()).collect(),
                ..Default::default()
            },
        );
        config
    }

    #[tokio::test]
    async fn test_check_passes_for_valid_chains() {
        let registry = LinkRegistry::with_builtins();
        tokio_test::assert_ok!(
            run_config_check(config_with(&["stamp", "echo"]), &registry, true).await
        );
    }

    #[tokio::test]
    async fn test_dry_run_failure_reported() {
        let registry = LinkRegistry::with_builtins();
        tokio_test::assert_ok!(run_config_check(config_with(&["fail"]), &registry, false).await);
        tokio_test::assert_err!(run_config_check(config_with(&["fail"]), &registry, true).await);
    }

    #[test]
    fn test_unknown_link_fails_check() {
        let registry = LinkRegistry::with_builtins();
        let result = tokio_test::block_on(run_config_check(
            config_with(&["echo", "missing"]),
            &registry,
            false,
        ));
        assert!(matches!(
            result,
            Err(ModulinkError::Config(ConfigError::UnknownLink { .. }))
        ));
    }
}
