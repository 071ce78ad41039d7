use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use agent_tools::sandbox::config::expand_home;
use agent_tools::{RuntimeKind, SandboxConfig};

pub const DEFAULT_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LOG_FILE: &str = "~/memory.md";

#[derive(Parser, Debug, Default)]
#[command(name = "agent-cli")]
#[command(about = "Conversational agent with sandboxed code execution")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Model name
    #[arg(long, env = "AGENT_MODEL")]
    pub model: Option<String>,

    /// Responses API base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Sandbox root directory
    #[arg(long, env = "SANDBOX_DIR")]
    pub sandbox_dir: Option<String>,

    /// Sandbox runtime: process or docker
    #[arg(long, env = "SANDBOX_RUNTIME")]
    pub runtime: Option<String>,

    /// Markdown transcript file
    #[arg(long, env = "AGENT_LOG_FILE")]
    pub log_file: Option<String>,

    /// Send a single message and exit
    #[arg(long)]
    pub once: Option<String>,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_rounds: usize,
    pub preview_chars: usize,
    pub instructions: Option<String>,
    pub log_file: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            preview_chars: 500,
            instructions: None,
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub sandbox: SandboxConfig,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("agent-runtime").join("config.toml"))
    }

    /// Parse a config file. A missing file is not an error.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// File, then environment, then flags. Clap already folds the
    /// environment into the flags it owns.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let path = cli.config.clone().or_else(Self::default_path);
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.sandbox = config.sandbox.apply_env();
        config.apply_cli(cli)?;
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) -> anyhow::Result<()> {
        if let Some(model) = non_empty(&cli.model) {
            self.llm.model = model;
        }
        if let Some(base_url) = non_empty(&cli.base_url) {
            self.llm.base_url = base_url;
        }
        if let Some(api_key) = non_empty(&cli.api_key) {
            self.llm.api_key = Some(api_key);
        }
        if let Some(dir) = non_empty(&cli.sandbox_dir) {
            self.sandbox.root = expand_home(&dir);
        }
        if let Some(runtime) = non_empty(&cli.runtime) {
            self.sandbox.runtime = RuntimeKind::parse(&runtime)
                .with_context(|| format!("unknown sandbox runtime '{runtime}'"))?;
        }
        if let Some(log_file) = non_empty(&cli.log_file) {
            self.agent.log_file = log_file;
        }
        Ok(())
    }

    pub fn log_file_path(&self) -> PathBuf {
        expand_home(&self.agent.log_file)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
