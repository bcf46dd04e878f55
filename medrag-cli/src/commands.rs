//! CLI subcommand handlers.

use crate::Commands;
use medrag_core::gateway::{self, AppState};
use medrag_core::{MedragConfig, Pipeline, PipelineCell, Question};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config: MedragConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            public_dir,
        } => handle_serve(config, host, port, public_dir).await,
        Commands::Ask { question } => handle_ask(config, &question).await,
        Commands::Check => handle_check(&config),
        Commands::Config => handle_config(&config),
    }
}

/// Apply `serve` flag overrides on top of the loaded configuration.
fn apply_serve_overrides(
    config: &mut MedragConfig,
    host: Option<String>,
    port: Option<u16>,
    public_dir: Option<PathBuf>,
) {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(dir) = public_dir {
        config.gateway.public_dir = dir;
    }
}

async fn handle_serve(
    mut config: MedragConfig,
    host: Option<String>,
    port: Option<u16>,
    public_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    apply_serve_overrides(&mut config, host, port, public_dir);

    // Missing credentials or an unknown index stop startup here, before any
    // request is accepted.
    let pipeline = Pipeline::build(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize pipeline: {}", e))?;

    if !config.gateway.public_dir.is_dir() {
        warn!(
            dir = %config.gateway.public_dir.display(),
            "Front-end directory not found; unmatched paths will return 404"
        );
    }

    let state = AppState::new(
        Arc::new(PipelineCell::ready(Arc::new(pipeline))),
        config.gateway.clone(),
    );
    gateway::run(state).await?;
    info!("Server stopped");
    Ok(())
}

async fn handle_ask(config: MedragConfig, question: &str) -> anyhow::Result<()> {
    let question = Question::new(question)?;
    let pipeline = Pipeline::build(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize pipeline: {}", e))?;
    let answer = pipeline.answer(&question).await?;
    println!("{}", answer);
    Ok(())
}

fn handle_check(config: &MedragConfig) -> anyhow::Result<()> {
    config.check()?;
    for warning in config.validate() {
        println!("  warning: {}", warning);
    }
    config.resolve_credentials()?;
    println!("  Configuration OK");
    println!("    index:      {}", config.index.name);
    println!("    embeddings: {}", config.embedding.model);
    println!("    llm:        {}", config.llm.model);
    println!("    listen:     {}", config.gateway.bind_addr());
    Ok(())
}

fn handle_config(config: &MedragConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides_apply() {
        let mut config = MedragConfig::default();
        apply_serve_overrides(
            &mut config,
            Some("127.0.0.1".into()),
            Some(3000),
            Some(PathBuf::from("dist")),
        );
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.gateway.public_dir, PathBuf::from("dist"));
    }

    #[test]
    fn test_serve_overrides_keep_config_values() {
        let mut config = MedragConfig::default();
        config.gateway.port = 9000;
        apply_serve_overrides(&mut config, None, None, None);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question_before_building() {
        let err = handle_ask(MedragConfig::default(), "   ").await.unwrap_err();
        assert_eq!(err.to_string(), "message is required");
    }

    #[test]
    fn test_config_output_has_no_keys() {
        let mut config = MedragConfig::default();
        config.llm.api_key = Some("secret-google-key".into());
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("secret-google-key"));
        assert!(rendered.contains("medical-chatbot"));
    }
}
