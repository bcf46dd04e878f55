//! MedRAG CLI: HTTP server and one-shot front-end for the medical RAG pipeline.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// MedRAG: answers medical questions grounded in a vector index
#[derive(Parser, Debug)]
#[command(name = "medrag", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./medrag.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Build the pipeline and serve the HTTP gateway
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory holding the front-end bundle
        #[arg(long)]
        public_dir: Option<PathBuf>,
    },
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        question: String,
    },
    /// Verify configuration and credentials without contacting any service
    Check,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    // Optional JSON file layer
    let (json_layer, _guard) = match &cli.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "medrag.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let config = medrag_core::load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    commands::handle_command(cli.command, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "medrag",
            "-vv",
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "3000",
            "--public-dir",
            "dist",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Serve {
                host,
                port,
                public_dir,
            } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(3000));
                assert_eq!(public_dir, Some(PathBuf::from("dist")));
            }
            other => panic!("Expected Serve, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ask_with_global_config() {
        let cli =
            Cli::try_parse_from(["medrag", "ask", "What is hypertension?", "--config", "x.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Ask { ref question } if question == "What is hypertension?"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["medrag"]).is_err());
    }
}
