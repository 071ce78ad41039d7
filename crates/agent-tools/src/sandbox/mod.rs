//! Sandboxed code execution.
//!
//! Tier A ([`script`]) evaluates gated scripts in-process. Tier B
//! ([`process`]) writes code under the sandbox root and runs it in a local
//! interpreter or an ephemeral container. Both tiers report either an
//! [`ExecutionOutput`] or a typed [`SandboxError`].

pub mod bundle;
pub mod config;
pub mod imports;
pub mod path_policy;
pub mod process;
pub mod script;
mod script_modules;

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

pub use config::{ContainerLimits, RuntimeKind, SandboxConfig, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
pub use path_policy::SandboxRoot;
pub use process::{Interpreter, IsolationRuntime, LaunchSpec, ProcessOutput};
pub use script::{ScriptLimits, ScriptOutput};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("execution timed out after {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
        stdout: String,
        stderr: String,
    },

    #[error("isolation runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("{0}")]
    Other(String),
}

impl SandboxError {
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Timeout { .. } => "timeout",
            SandboxError::RuntimeUnavailable(_) => "runtime_unavailable",
            SandboxError::PolicyViolation(_) => "policy_violation",
            SandboxError::Other(_) => "other",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SandboxError::Timeout {
                timeout_secs,
                stdout,
                stderr,
            } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "timeout": timeout_secs,
                "stdout": stdout,
                "stderr": stderr,
            }),
            SandboxError::RuntimeUnavailable(message)
            | SandboxError::PolicyViolation(message)
            | SandboxError::Other(message) => json!({
                "error": self.kind(),
                "message": message,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
}

impl Language {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "py" | "python" | "python3" => Some(Self::Python),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
        }
    }

    fn interpreter(self) -> Interpreter {
        match self {
            Language::Python => Interpreter::Python,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub code: String,
    pub language: Language,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub filename: Option<String>,
    pub timeout_secs: u64,
    pub working_dir: Option<String>,
}

impl SandboxRequest {
    pub fn python(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: Language::Python,
            args: Vec::new(),
            stdin: None,
            filename: None,
            timeout_secs: 20,
            working_dir: None,
        }
    }
}

/// Successful Tier B run. Paths are relative to the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub file: Option<String>,
    pub cwd: String,
}

impl ExecutionOutput {
    pub fn to_json(&self, sandbox_root: &Path) -> Value {
        json!({
            "exit_code": self.exit_code,
            "stdout": self.stdout,
            "stderr": self.stderr,
            "file": self.file,
            "cwd": self.cwd,
            "sandbox_root": sandbox_root.display().to_string(),
        })
    }
}

pub fn validate_timeout(timeout_secs: u64) -> Result<u64, SandboxError> {
    if (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
        Ok(timeout_secs)
    } else {
        Err(SandboxError::Other(format!(
            "timeout must be between {} and {} seconds, got {}",
            MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, timeout_secs
        )))
    }
}

/// Sandbox root plus the runtime that executes code under it.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: SandboxRoot,
    runtime: IsolationRuntime,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> std::io::Result<Self> {
        let root = SandboxRoot::open(&config.root)?;
        log::info!(
            "Sandbox root: {} (runtime: {:?})",
            root.path().display(),
            config.runtime
        );
        Ok(Self {
            runtime: IsolationRuntime::from_config(&config),
            root,
            config,
        })
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn runtime(&self) -> &IsolationRuntime {
        &self.runtime
    }

    pub fn script_limits(&self) -> ScriptLimits {
        ScriptLimits {
            max_operations: self.config.script_max_operations,
            ..ScriptLimits::default()
        }
    }

    /// Tier A.
    pub async fn evaluate_script(&self, source: &str) -> Result<ScriptOutput, SandboxError> {
        script::evaluate(source.to_string(), self.script_limits()).await
    }

    /// Write `content` to `path` (relative to `cwd`, itself relative to the root).
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        cwd: Option<&str>,
    ) -> Result<(PathBuf, PathBuf), SandboxError> {
        let workdir = self.root.resolve_dir(cwd)?;
        let target = self.root.resolve(&workdir, path)?;

        create_dir(&workdir).await?;
        if let Some(parent) = target.parent() {
            create_dir(parent).await?;
        }
        tokio::fs::write(&target, content).await.map_err(|e| {
            SandboxError::Other(format!("failed to write '{}': {}", target.display(), e))
        })?;

        Ok((target, workdir))
    }

    /// Tier B. Every path is validated before anything touches the disk.
    pub async fn execute(&self, request: &SandboxRequest) -> Result<ExecutionOutput, SandboxError> {
        let timeout_secs = validate_timeout(request.timeout_secs)?;
        if request.code.trim().is_empty() {
            return Err(SandboxError::Other("empty code provided".to_string()));
        }

        let workdir = self.root.resolve_dir(request.working_dir.as_deref())?;
        let extension = request.language.extension();
        let (file, keep_file) = match request
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => {
                let name = if name.ends_with(&format!(".{extension}")) {
                    name.to_string()
                } else {
                    format!("{name}.{extension}")
                };
                (self.root.resolve(&workdir, &name)?, true)
            }
            None => (
                workdir.join(format!("snippet_{}.{}", Uuid::new_v4().simple(), extension)),
                false,
            ),
        };

        create_dir(&workdir).await?;
        if let Some(parent) = file.parent() {
            create_dir(parent).await?;
        }

        let mut code = request.code.trim_end_matches('\n').to_string();
        code.push('\n');
        tokio::fs::write(&file, &code).await.map_err(|e| {
            SandboxError::Other(format!("failed to write '{}': {}", file.display(), e))
        })?;

        let install = match self.runtime {
            IsolationRuntime::Container { .. } => {
                let own: Vec<&str> = file.file_stem().and_then(|stem| stem.to_str()).into_iter().collect();
                imports::third_party_packages(&code, &own)
            }
            IsolationRuntime::Process { .. } => Vec::new(),
        };

        let spec = LaunchSpec {
            interpreter: request.language.interpreter(),
            file: file.clone(),
            args: request.args.clone(),
            stdin: request.stdin.clone(),
            workdir: workdir.clone(),
            timeout_secs,
            install,
        };

        log::debug!(
            "sandbox run: runtime={}, file={}, timeout={}s",
            self.runtime.label(),
            self.root.relative(&file),
            timeout_secs
        );
        let result = self.runtime.run(self.root.path(), &spec).await;

        if !keep_file {
            if let Err(e) = tokio::fs::remove_file(&file).await {
                log::debug!("failed to remove snippet {}: {}", file.display(), e);
            }
        }

        let output = result?;
        Ok(ExecutionOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            file: keep_file.then(|| self.root.relative(&file)),
            cwd: self.root.relative(&workdir),
        })
    }
}

async fn create_dir(path: &Path) -> Result<(), SandboxError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| SandboxError::Other(format!("failed to create '{}': {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox(dir: &TempDir) -> Sandbox {
        Sandbox::new(SandboxConfig::default().with_root(dir.path())).unwrap()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn traversal_in_filename_is_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox(&dir);

        let mut request = SandboxRequest::python("print('x')");
        request.filename = Some("../escape".to_string());

        let err = sandbox.execute(&request).await.unwrap_err();
        assert_eq!(err.kind(), "policy_violation");
        assert_eq!(entries(dir.path()), 0);
        assert!(!dir.path().parent().unwrap().join("escape.py").exists());
    }

    #[tokio::test]
    async fn absolute_working_dir_is_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox(&dir);

        let mut request = SandboxRequest::python("print('x')");
        request.working_dir = Some("/tmp".to_string());

        let err = sandbox.execute(&request).await.unwrap_err();
        assert!(matches!(err, SandboxError::PolicyViolation(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn timeout_outside_bounds_is_rejected() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox(&dir);

        for timeout_secs in [0, 121] {
            let mut request = SandboxRequest::python("print('x')");
            request.timeout_secs = timeout_secs;
            let err = sandbox.execute(&request).await.unwrap_err();
            assert!(err.to_string().contains("timeout must be between 1 and 120"));
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn missing_interpreter_is_reported_and_snippet_removed() {
        let dir = TempDir::new().unwrap();
        let mut config = SandboxConfig::default().with_root(dir.path());
        config.python = "no-such-python-xyz".to_string();
        let sandbox = Sandbox::new(config).unwrap();

        let err = sandbox
            .execute(&SandboxRequest::python("print('x')"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "runtime_unavailable");
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn write_file_stays_inside_root() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox(&dir);

        let (target, workdir) = sandbox
            .write_file("notes/a.txt", "hello", Some("work"))
            .await
            .unwrap();

        assert_eq!(sandbox.root().relative(&target), "work/notes/a.txt");
        assert_eq!(sandbox.root().relative(&workdir), "work");
        assert_eq!(std::fs::read_to_string(target).unwrap(), "hello");

        let err = sandbox
            .write_file("../../x.txt", "nope", Some("work"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "policy_violation");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_file_through_dangling_symlink_is_rejected() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox(&dir);
        let victim = outside.path().join("victim.py");
        std::os::unix::fs::symlink(&victim, dir.path().join("evil.py")).unwrap();

        let err = sandbox
            .write_file("evil.py", "print('owned')", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "policy_violation");
        assert!(!victim.exists());
    }

    #[tokio::test]
    async fn runaway_python_times_out_with_partial_output() {
        if std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_err()
        {
            eprintln!("python3 not available; skipping");
            return;
        }
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox(&dir);

        let mut request = SandboxRequest::python("print('started', flush=True)\nwhile True:\n    pass\n");
        request.timeout_secs = 1;

        let started = std::time::Instant::now();
        let err = sandbox.execute(&request).await.unwrap_err();

        assert_eq!(err.kind(), "timeout");
        match &err {
            SandboxError::Timeout { stdout, timeout_secs, .. } => {
                assert_eq!(*timeout_secs, 1);
                assert!(stdout.contains("started"), "{stdout:?}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn timeout_error_json_keeps_partial_output() {
        let err = SandboxError::Timeout {
            timeout_secs: 1,
            stdout: "partial".to_string(),
            stderr: String::new(),
        };

        let json = err.to_json();
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["stdout"], "partial");
        assert_eq!(json["stderr"], "");
    }

    #[test]
    fn language_aliases() {
        assert_eq!(Language::parse("Python"), Some(Language::Python));
        assert_eq!(Language::parse("py"), Some(Language::Python));
        assert_eq!(Language::parse("ruby"), None);
    }
}
