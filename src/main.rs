use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "ops-portal")]
#[command(version, about = "Internal operations portal for partners, catalog and packages")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to portal.toml. Defaults to ./portal.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// SQLite database file
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Allow any CORS origin, for local front-end development
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations, then exit
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Write a default portal.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
        } => {
            let overrides = ops_portal::config::ConfigOverrides {
                host: host.clone(),
                port: *port,
                db_path: db_path.clone(),
                cors_permissive: *dev,
            };
            cmd::cmd_serve(&cli, overrides).await?;
        }
        Commands::Init { db_path } => cmd::cmd_init(&cli, db_path.clone())?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
