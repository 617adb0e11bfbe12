use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use modulink::app::{self, Startup};
use modulink::commands;
use modulink::config::{self, Config};
use modulink::error::{ConfigError, ModulinkError, Result};
use modulink::http;
use modulink::registry::LinkRegistry;

#[derive(Parser, Debug)]
#[command(name = "modulink")]
#[command(about = "Run ModuLink chains from the command line, over HTTP or on a schedule", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Execute one configured chain and print the resulting context
    Run {
        chain: String,
        /// JSON payload merged into the CLI context
        #[arg(short, long, default_value = "")]
        input: String,
    },
    /// Serve routed chains over HTTP and start scheduled jobs (default)
    Serve,
    /// Validate configuration and assemble every chain
    Check {
        /// Execute each chain once with an empty context
        #[arg(long)]
        dry_run: bool,
    },
    /// List configured chains and the available links
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                format!("modulink={log_level}")
                    .parse::<tracing_subscriber::filter::Directive>()
                    .map_err(|e| ConfigError::Parse(format!("Invalid log directive: {e}")))?,
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            config::load_from_path(&path).await.inspect_err(|e| {
                error!(
                    "Failed to load configuration from {}: {}",
                    path.display(),
                    e
                )
            })?
        }
        None => config::load_from_env_or_file()
            .await
            .inspect_err(|e| error!("Failed to load configuration: {}", e))?,
    };

    let links = LinkRegistry::with_builtins();

    match args.command.unwrap_or(Command::Serve) {
        Command::Run { chain, input } => run_chain(&config, &links, &chain, &input).await,
        Command::Check { dry_run } => commands::run_config_check(config, &links, dry_run).await,
        Command::List => {
            for (name, definition) in &config.chains {
                println!("{name}: {}", definition.links.join(" -> "));
            }
            println!("links: {}", links.names().collect::<Vec<_>>().join(", "));
            Ok(())
        }
        Command::Serve => serve(config, &links).await,
    }
}

async fn run_chain(config: &Config, links: &LinkRegistry, chain: &str, input: &str) -> Result<()> {
    if !config.chains.contains_key(chain) {
        return Err(ModulinkError::ChainNotFound(chain.to_string()));
    }

    let instance = app::assemble(config, links, Vec::new(), Startup::Passive)?;
    let adapters = instance
        .host()
        .ok_or(ModulinkError::Config(ConfigError::MissingHost))?;

    let output = adapters.commands.run(chain, input).await?;
    println!("{output}");
    Ok(())
}

async fn serve(config: Config, links: &LinkRegistry) -> Result<()> {
    info!("Starting ModuLink");
    info!("Loaded {} chain configuration(s)", config.chains.len());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ConfigError::Parse(format!("Invalid server address: {e}")))?;

    let instance = app::assemble(&config, links, Vec::new(), Startup::WithSchedules)?;
    let adapters = instance
        .host()
        .ok_or(ModulinkError::Config(ConfigError::MissingHost))?;

    http::serve(adapters.http.filter(), addr, shutdown_signal()).await?;

    info!("Shutting down ModuLink");
    adapters.scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
