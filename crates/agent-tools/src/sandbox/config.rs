use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Local interpreter with its working directory inside the sandbox root.
    #[default]
    Process,
    /// Ephemeral container with the sandbox root mounted.
    Container,
}

impl RuntimeKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "process" | "local" => Some(Self::Process),
            "docker" | "container" => Some(Self::Container),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLimits {
    pub memory: String,
    pub cpus: String,
    pub pids: u32,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            memory: "512m".to_string(),
            cpus: "1.0".to_string(),
            pids: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub root: PathBuf,
    pub runtime: RuntimeKind,
    pub container_binary: String,
    pub image: String,
    pub python: String,
    pub shell: String,
    pub default_timeout_secs: u64,
    pub limits: ContainerLimits,
    /// Operation budget for in-process scripts.
    pub script_max_operations: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("sandbox"),
            runtime: RuntimeKind::Process,
            container_binary: "docker".to_string(),
            image: "python:3.11-slim".to_string(),
            python: "python3".to_string(),
            shell: "bash".to_string(),
            default_timeout_secs: 20,
            limits: ContainerLimits::default(),
            script_max_operations: 1_000_000,
        }
    }
}

impl SandboxConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }

    /// Apply `SANDBOX_DIR`, `SANDBOX_RUNTIME` and `SANDBOX_IMAGE` on top of `self`.
    pub fn apply_env(mut self) -> Self {
        if let Some(dir) = non_empty_var("SANDBOX_DIR") {
            self.root = expand_home(&dir);
        }
        if let Some(runtime) = non_empty_var("SANDBOX_RUNTIME") {
            match RuntimeKind::parse(&runtime) {
                Some(kind) => self.runtime = kind,
                None => log::warn!("Ignoring unknown SANDBOX_RUNTIME '{}'", runtime),
            }
        }
        if let Some(image) = non_empty_var("SANDBOX_IMAGE") {
            self.image = image;
        }
        self
    }

    pub fn from_env() -> Self {
        Self::default().apply_env()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
