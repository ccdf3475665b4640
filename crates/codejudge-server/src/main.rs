//! Command line entry point for codejudge
//!
//! `serve` (the default) runs the HTTP service. `run` executes a single source
//! file through the same sandbox and prints what it produced, which is handy
//! for checking that the runtime images behave before exposing the service.

use anyhow::Result;
use clap::{Parser, Subcommand};
use codejudge_core::{ConfigLoader, Sandbox, SandboxConfig};
use codejudge_server::{language_catalog, shutdown_signal, CodeJudgeServer, ServerConfig};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "codejudge - run untrusted code in throwaway containers")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, global = true, help = "Path to a YAML sandbox configuration file")]
    config: Option<PathBuf>,

    #[clap(long, short, global = true, default_value = "info")]
    log_level: String,

    #[clap(long, global = true, help = "Skip Docker and run code directly on this host (insecure)")]
    local: bool,

    #[clap(long, default_value = "127.0.0.1:8080")]
    bind_addr: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default command)
    Serve {
        #[clap(long)]
        bind_addr: Option<String>,
    },
    /// Execute one source file and print its output
    Run {
        #[clap(long)]
        language: String,

        file: PathBuf,
    },
    /// List supported languages with their images and commands
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let config = load_config(cli.config.as_ref(), cli.local).await?;

    match cli.command {
        Some(Commands::Serve { bind_addr }) => {
            run_server(config, bind_addr.unwrap_or(cli.bind_addr)).await
        }
        Some(Commands::Run { language, file }) => run_file(config, &language, file).await,
        Some(Commands::Languages) => {
            print_languages(&config);
            Ok(())
        }
        None => run_server(config, cli.bind_addr).await,
    }
}

async fn load_config(path: Option<&PathBuf>, force_local: bool) -> Result<SandboxConfig> {
    let mut config = match path {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path.display());
            ConfigLoader::from_file(path).await?
        }
        None => ConfigLoader::from_env()?,
    };
    if force_local {
        config.force_local = true;
    }
    Ok(config)
}

async fn run_server(config: SandboxConfig, bind_addr: String) -> Result<()> {
    let sandbox = Sandbox::from_config(config).await?;
    let server_config = ServerConfig::new().with_bind_addr_str(&bind_addr)?;

    CodeJudgeServer::with_config(sandbox, server_config)
        .serve_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run_file(config: SandboxConfig, language: &str, file: PathBuf) -> Result<()> {
    let source = tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    let sandbox = Sandbox::from_config(config).await?;
    let report = sandbox.execute(language, &source).await;

    print!("{}", report.output);
    match report.error {
        None => Ok(()),
        Some(error) => Err(anyhow::anyhow!("{} ({:?})", error, error.kind())),
    }
}

fn print_languages(config: &SandboxConfig) {
    for info in language_catalog(config) {
        println!(
            "{:<12} {:<10} {:<18} {}",
            info.language.id(),
            info.source_filename,
            info.image,
            info.command.join(" ")
        );
    }
}
