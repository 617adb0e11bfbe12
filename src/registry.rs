//! Named links and config-driven chain assembly

use crate::chain::{Chain, ChainBuilder, Link};
use crate::config::{ChainDefinition, ObservabilityConfig};
use crate::context::current_timestamp;
use crate::error::{ConfigError, LinkError};
use crate::middleware::{logging, performance_tracker, timing};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    links: BTreeMap<String, Link>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the general-purpose links the binary ships
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for link in builtins() {
            registry.register(link);
        }
        registry
    }

    pub fn register(&mut self, link: Link) -> &mut Self {
        self.links.insert(link.name().to_string(), link);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    /// Assemble a chain from its definition. Unknown link names fail here,
    /// never at execution time.
    pub fn build_chain(
        &self,
        name: &str,
        definition: &ChainDefinition,
        observability: &ObservabilityConfig,
    ) -> Result<Chain, ConfigError> {
        let mut builder = ChainBuilder::new().named(name);

        for link_name in &definition.links {
            let link = self
                .get(link_name)
                .ok_or_else(|| ConfigError::UnknownLink {
                    chain: name.to_string(),
                    name: link_name.clone(),
                })?;
            builder = builder.link(link.clone());
        }

        if definition.observe {
            if let Some(options) = observability.performance {
                builder = builder.with_on_input(performance_tracker(options));
            }
            if let Some(options) = &observability.logging {
                builder = builder.with_on_input(logging(options.clone()));
            }
            if let Some(label) = &observability.timing {
                builder = builder.with_global(timing(label.clone()));
            }
        }

        let chain = builder.build()?;
        debug!(chain = name, links = definition.links.len(), "Chain assembled");
        Ok(chain)
    }
}

fn builtins() -> Vec<Link> {
    vec![
        Link::sync("echo", Ok),
        Link::sync("stamp", |mut ctx| {
            ctx.set("processedAt", current_timestamp());
            Ok(ctx)
        }),
        Link::sync("uppercase", |mut ctx| {
            let text = text_field(&ctx.fields)?;
            ctx.set("text", text.to_uppercase());
            Ok(ctx)
        }),
        Link::sync("word-count", |mut ctx| {
            let count = text_field(&ctx.fields)?.split_whitespace().count();
            ctx.set("wordCount", count);
            Ok(ctx)
        }),
        Link::sync("fail", |ctx| {
            let reason = ctx.get_str("reason").unwrap_or("requested failure");
            Err(LinkError::Failed(reason.to_string()).into())
        }),
    ]
}

fn text_field(fields: &serde_json::Map<String, Value>) -> Result<String, LinkError> {
    fields
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LinkError::Validation("field 'text' must be a string".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn definition(links: &[&str]) -> ChainDefinition {
        ChainDefinition {
            links: links.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_link_is_configuration_error() {
        let registry = LinkRegistry::with_builtins();
        let result = registry.build_chain(
            "broken",
            &definition(&["echo", "missing"]),
            &ObservabilityConfig::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownLink { ref name, .. }) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn test_builtin_chain() {
        let registry = LinkRegistry::with_builtins();
        let chain = registry
            .build_chain(
                "text",
                &definition(&["uppercase", "word-count"]),
                &ObservabilityConfig::default(),
            )
            .unwrap();

        let ctx = chain
            .execute(Context::new().with("text", "hello modulink world"))
            .await;
        assert_eq!(ctx.get_str("text"), Some("HELLO MODULINK WORLD"));
        assert_eq!(ctx.get_i64("wordCount"), Some(3));
        assert!(ctx.metadata.is_none());
    }

    #[tokio::test]
    async fn test_observed_chain_gets_configured_middleware() {
        let registry = LinkRegistry::with_builtins();
        let observability = ObservabilityConfig {
            logging: Some(Default::default()),
            performance: Some(Default::default()),
            timing: Some("total".to_string()),
        };
        let mut def = definition(&["echo"]);
        def.observe = true;

        let chain = registry.build_chain("observed", &def, &observability).unwrap();
        let info = chain.debug_info();
        assert_eq!(info.middleware_counts.input, 2);
        assert_eq!(info.middleware_counts.global, 1);

        let ctx = chain.execute(Context::new()).await;
        assert!(ctx.timings.unwrap().contains_key("total"));
        assert!(ctx.logging_metrics.is_some());
    }

    #[tokio::test]
    async fn test_uppercase_requires_text() {
        let registry = LinkRegistry::with_builtins();
        let chain = registry
            .build_chain("text", &definition(&["uppercase"]), &Default::default())
            .unwrap();

        let ctx = chain.execute(Context::new()).await;
        assert_eq!(ctx.error.unwrap().name, "ValidationError");
    }
}
