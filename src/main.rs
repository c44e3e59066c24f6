use anyhow::{Context, Result};
use character_persona::{config::Config, gateway, providers};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Character persona chat gateway.
#[derive(Parser, Debug)]
#[command(name = "character-persona")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the loaded personas
    Personas,

    /// Validate config and personas, report credential presence
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            gateway::serve(&config).await
        }
        Commands::Personas => {
            let registry = config.load_registry().context("failed to load personas")?;
            for persona in registry.list() {
                let marker = if persona.id == config.default_persona { "*" } else { " " };
                println!(
                    "{marker} {:<18} {} {} ({})",
                    persona.id,
                    persona.avatar.as_deref().unwrap_or(" "),
                    persona.name,
                    persona.role
                );
            }
            Ok(())
        }
        Commands::Check => {
            let registry = config.load_registry().context("failed to load personas")?;
            providers::create_gateway(&config.model).context("invalid model settings")?;
            println!("personas:  {} loaded, default '{}'", registry.len(), config.default_persona);
            println!(
                "model:     {} / {}",
                config.model.provider, config.model.model
            );
            if config.model.credential().is_some() {
                println!("api key:   configured");
            } else {
                println!("api key:   MISSING (chat and test requests will fail)");
            }
            println!("bind:      {}", config.server.bind_addr());
            Ok(())
        }
    }
}
