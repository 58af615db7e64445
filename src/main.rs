//! Seabird - Main binary

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use seabird_core::{Bot, Config, ModuleManager};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Seabird - A modular IRC bot
#[derive(Parser)]
#[command(name = "seabird", version, about = "A modular IRC bot written in Rust")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Load the configuration and modules, then exit without connecting
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Config {
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// List the built-in modules and their commands
    Info,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    match cli.command {
        Some(Commands::Config { output }) => {
            Config::default().to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
        Some(Commands::Info) => show_info()?,
        Some(Commands::Version) => println!("seabird {}", env!("CARGO_PKG_VERSION")),
        None => {
            let mut bot = build_bot(&cli.config)?;
            if cli.test_config {
                tracing::info!(
                    "Configuration is valid, modules loaded: {}",
                    bot.modules().get_loaded_modules().join(", ")
                );
                return Ok(());
            }

            tracing::info!("Connecting to {}:{}", bot.config().server.host, bot.config().server.port);
            bot.run().await.inspect_err(|e| tracing::error!("Connection ended with an error: {}", e))?;
        }
    }

    Ok(())
}

/// Read the configuration and load every module it names
fn build_bot(path: &Path) -> anyhow::Result<Bot> {
    let config = if path.exists() {
        tracing::info!("Loading configuration from {}", path.display());
        Config::from_file(path)?
    } else {
        tracing::warn!("{} not found, using the default configuration", path.display());
        Config::default()
    };

    let modules = config.bot.modules.clone();
    let mut bot = Bot::new(config)?;
    for name in &modules {
        seabird_modules::load_by_name(bot.modules_mut(), name)
            .with_context(|| format!("Failed to load module {}", name))?;
    }
    Ok(bot)
}

fn show_info() -> anyhow::Result<()> {
    let mut manager = ModuleManager::new("!");
    for name in seabird_modules::AVAILABLE {
        seabird_modules::load_by_name(&mut manager, name)?;
    }

    println!("seabird {}: {}", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_DESCRIPTION"));
    for (name, description) in manager.describe_modules() {
        println!("  {:<10} {}", name, description);
        for command in manager.commands().iter().filter(|c| c.module == name) {
            println!("      !{:<8} {}", command.name, command.short_help.as_deref().unwrap_or(""));
        }
    }
    Ok(())
}
