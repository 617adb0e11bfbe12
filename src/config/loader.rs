use super::schema::Config;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use std::path::Path;

pub async fn load_from_env_or_file() -> Result<Config> {
    let config: Config = Figment::new()
        .merge(Toml::file("modulink.toml"))
        .merge(Json::file("modulink.json"))
        .merge(Yaml::file("modulink.yaml"))
        .merge(Yaml::file("modulink.yml"))
        // MODULINK_SERVER__PORT=8080 and friends
        .merge(Env::prefixed("MODULINK_").split("__"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let config: Config = figment
        .merge(Env::prefixed("MODULINK_").split("__"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        return Err(ConfigError::Validation("Server port must be greater than 0".into()).into());
    }

    for (name, chain) in &config.chains {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation("Chain names cannot be empty".into()).into());
        }

        if let Some(index) = chain.links.iter().position(|l| l.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "Chain '{name}' has an empty link name at position {index}"
            ))
            .into());
        }

        if let Some(route) = &chain.route {
            if !route.path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "Chain '{name}' route path must start with '/'"
                ))
                .into());
            }
            if warp::http::Method::from_bytes(route.method.to_uppercase().as_bytes()).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Chain '{name}' has invalid HTTP method '{}'",
                    route.method
                ))
                .into());
            }
        }

        if chain.schedule_secs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Chain '{name}' schedule must be at least 1 second"
            ))
            .into());
        }
    }

    if let Some(label) = &config.observability.timing {
        if label.trim().is_empty() {
            return Err(ConfigError::Validation("Timing label cannot be empty".into()).into());
        }
    }

    Ok(())
}
