//! `sophia-server`: run the SOPHIA rules server or validate content.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sophia_core::config::GeneralConfig;
use sophia_core::{ContentLibrary, SophiaConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sophia-server", version)]
#[command(about = "Authoritative rules server for the SOPHIA philosophical RPG")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the JSON API.
    Serve {
        /// TOML configuration file; `SOPHIA__SECTION__KEY` variables override it.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address (overrides `server.bind`).
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Parse and validate a content file, then print a summary.
    CheckContent {
        /// Content TOML; the built-in library is checked when omitted.
        #[arg(long)]
        content: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, bind } => {
            let mut config =
                SophiaConfig::load(config.as_deref()).context("loading configuration")?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            init_tracing(&config.general);
            info!(
                bind = %config.server.bind,
                backend = %config.persistence.backend,
                "Starting SOPHIA server"
            );
            sophia_server::serve(config).await?;
        }
        Command::CheckContent { content } => {
            init_tracing(&GeneralConfig::default());
            let library = match &content {
                Some(path) => ContentLibrary::from_file(path)
                    .with_context(|| format!("checking {}", path.display()))?,
                None => ContentLibrary::builtin().context("checking built-in content")?,
            };
            println!(
                "content ok: {} scenarios, {} fallacies, {} syllogisms, {} enemies",
                library.scenarios().count(),
                library.fallacies().count(),
                library.syllogisms().count(),
                library.enemies().count(),
            );
        }
    }
    Ok(())
}

fn init_tracing(general: &GeneralConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
