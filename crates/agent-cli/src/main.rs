mod config;
mod logging;
mod repl;
mod transcript;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use agent_llm::OpenAIResponsesProvider;
use agent_loop::{AgentLoopConfig, ConversationSession};
use agent_tools::{builtin_registry, Sandbox};

use config::{AppConfig, Cli};
use logging::init_logging;
use transcript::Transcript;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = AppConfig::load(&cli)?;

    log::info!("Starting agent CLI");
    log::info!("  Model: {}", config.llm.model);
    log::info!("  Base URL: {}", config.llm.base_url);
    log::info!("  Sandbox: {} ({:?})", config.sandbox.root.display(), config.sandbox.runtime);

    let api_key = config
        .llm
        .api_key
        .clone()
        .context("no API key configured; set OPENAI_API_KEY or llm.api_key")?;
    let provider = OpenAIResponsesProvider::new(api_key).with_base_url(config.llm.base_url.clone());

    let sandbox = Sandbox::new(config.sandbox.clone()).with_context(|| {
        format!(
            "failed to prepare sandbox root {}",
            config.sandbox.root.display()
        )
    })?;
    let registry = builtin_registry(Arc::new(sandbox))?;

    let loop_config = AgentLoopConfig {
        max_rounds: config.agent.max_rounds,
        preview_chars: config.agent.preview_chars,
        instructions: config.agent.instructions.clone(),
        tool_registry: Arc::new(registry),
    };
    let mut session =
        ConversationSession::new(Arc::new(provider), config.llm.model.clone(), loop_config);

    let log_path = config.log_file_path();
    let transcript = Transcript::open(&log_path)
        .with_context(|| format!("failed to open transcript {}", log_path.display()))?;

    match cli.once.as_deref() {
        Some(message) => repl::run_once(&mut session, &transcript, message).await,
        None => repl::run_repl(&mut session, &transcript).await,
    }
}
