//! Multi-step runs: write every extracted step into a fresh run directory,
//! generate `launch.sh`, and execute it under Tier B.

use std::path::PathBuf;

use serde_json::{json, Value};
use uuid::Uuid;

use super::{imports, Interpreter, IsolationRuntime, LaunchSpec, ProcessOutput, Sandbox, SandboxError};
use super::MAX_TIMEOUT_SECS;
use crate::steps::{ExecutableStep, StepLanguage};

pub const LAUNCH_SCRIPT: &str = "launch.sh";
const RUNS_DIR: &str = "runs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub run_dir: String,
    pub files: Vec<String>,
    pub executed: Vec<String>,
    pub output: ProcessOutput,
}

impl BundleOutput {
    pub fn to_json(&self) -> Value {
        json!({
            "run_dir": self.run_dir,
            "files": self.files,
            "executed": self.executed,
            "exit_code": self.output.exit_code,
            "stdout": self.output.stdout,
            "stderr": self.output.stderr,
        })
    }
}

fn step_filename(step: &ExecutableStep, index: usize) -> String {
    match step.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("snippet_{}.{}", index + 1, step.language.extension()),
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn launch_script(python: &str, steps: &[(String, &ExecutableStep)]) -> String {
    let mut script = String::from("#!/bin/bash\nset -e\n");
    for (name, _) in steps {
        script.push_str(&format!("echo {}\n", quote(&format!("Wrote {name}"))));
    }
    for (name, step) in steps.iter().filter(|(_, step)| step.execute) {
        script.push_str(&format!("echo {}\n", quote(&format!("Executing {name}"))));
        match step.language {
            StepLanguage::Python => script.push_str(&format!("{} {}\n", python, quote(name))),
            StepLanguage::Bash => script.push_str(&format!("bash {}\n", quote(name))),
        }
    }
    script
}

impl Sandbox {
    /// Validate every step path, write the files, then run the launch script.
    pub async fn run_steps(&self, steps: &[ExecutableStep]) -> Result<BundleOutput, SandboxError> {
        if steps.is_empty() {
            return Err(SandboxError::Other(
                "no executable code blocks found".to_string(),
            ));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = self
            .root()
            .resolve_dir(Some(format!("{RUNS_DIR}/{run_id}").as_str()))?;

        let mut planned: Vec<(String, &ExecutableStep)> = Vec::with_capacity(steps.len());
        let mut targets: Vec<PathBuf> = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let name = step_filename(step, index);
            targets.push(self.root().resolve(&run_dir, &name)?);
            planned.push((name, step));
        }

        for (target, (_, step)) in targets.iter().zip(&planned) {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SandboxError::Other(format!("failed to create run dir: {e}")))?;
            }
            let mut content = step.content.clone();
            content.push('\n');
            tokio::fs::write(target, content).await.map_err(|e| {
                SandboxError::Other(format!("failed to write '{}': {}", target.display(), e))
            })?;
        }

        let python = match self.runtime() {
            IsolationRuntime::Process { python, .. } => python.as_str(),
            IsolationRuntime::Container { .. } => "python",
        };
        let launch = run_dir.join(LAUNCH_SCRIPT);
        tokio::fs::write(&launch, launch_script(python, &planned))
            .await
            .map_err(|e| SandboxError::Other(format!("failed to write launch script: {e}")))?;

        let install = match self.runtime() {
            IsolationRuntime::Container { .. } => bundle_packages(&planned),
            IsolationRuntime::Process { .. } => Vec::new(),
        };

        let spec = LaunchSpec {
            interpreter: Interpreter::Shell,
            file: launch,
            args: Vec::new(),
            stdin: None,
            workdir: run_dir.clone(),
            timeout_secs: MAX_TIMEOUT_SECS,
            install,
        };

        let executed: Vec<String> = planned
            .iter()
            .filter(|(_, step)| step.execute)
            .map(|(name, _)| name.clone())
            .collect();
        log::info!(
            "running {} step(s) in {} ({} executed)",
            planned.len(),
            self.root().relative(&run_dir),
            executed.len()
        );

        let output = self.runtime().run(self.root().path(), &spec).await?;

        Ok(BundleOutput {
            run_dir: self.root().relative(&run_dir),
            files: planned.into_iter().map(|(name, _)| name).collect(),
            executed,
            output,
        })
    }
}

/// Top-level Python module a planned file provides: `lib.py` gives `lib`,
/// `pkg/util.py` gives `pkg`.
fn local_module(name: &str) -> Option<&str> {
    match name.split_once('/') {
        Some((dir, _)) => Some(dir),
        None => name.strip_suffix(".py"),
    }
}

/// Packages the Python steps import, minus the modules the bundle writes.
fn bundle_packages(planned: &[(String, &ExecutableStep)]) -> Vec<String> {
    let local: Vec<&str> = planned
        .iter()
        .filter_map(|(name, _)| local_module(name))
        .collect();
    let sources: Vec<&str> = planned
        .iter()
        .filter(|(_, step)| step.language == StepLanguage::Python)
        .map(|(_, step)| step.content.as_str())
        .collect();
    imports::third_party_packages(&sources.join("\n"), &local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use crate::steps::content_hash;
    use tempfile::TempDir;

    fn step(content: &str, language: StepLanguage, filename: Option<&str>, execute: bool) -> ExecutableStep {
        ExecutableStep {
            content: content.to_string(),
            language,
            filename: filename.map(str::to_string),
            execute,
            hash: content_hash(content),
        }
    }

    #[test]
    fn launch_script_runs_only_flagged_steps() {
        let lib = step("X = 1", StepLanguage::Python, Some("lib.py"), false);
        let main = step("import lib", StepLanguage::Python, Some("main.py"), true);
        let planned = vec![("lib.py".to_string(), &lib), ("main.py".to_string(), &main)];

        let script = launch_script("python3", &planned);

        assert!(script.starts_with("#!/bin/bash\nset -e\n"));
        assert!(script.contains("python3 'main.py'\n"));
        assert!(!script.contains("python3 'lib.py'"));
    }

    #[test]
    fn bundle_does_not_install_its_own_modules() {
        let lib = step("X = 1", StepLanguage::Python, Some("lib.py"), false);
        let util = step("def f():\n    return 2", StepLanguage::Python, Some("pkg/util.py"), false);
        let main = step(
            "import lib\nfrom pkg.util import f\nimport requests\nprint(lib.X + f())",
            StepLanguage::Python,
            Some("main.py"),
            true,
        );
        let planned = vec![
            ("lib.py".to_string(), &lib),
            ("pkg/util.py".to_string(), &util),
            ("main.py".to_string(), &main),
        ];

        assert_eq!(bundle_packages(&planned), vec!["requests"]);
    }

    #[test]
    fn unnamed_steps_get_numbered_names() {
        let s = step("ls", StepLanguage::Bash, None, true);
        assert_eq!(step_filename(&s, 1), "snippet_2.sh");
    }

    #[tokio::test]
    async fn escaping_step_filename_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(SandboxConfig::default().with_root(dir.path())).unwrap();
        let steps = vec![step("print(1)", StepLanguage::Python, Some("../../../evil.py"), true)];

        let err = sandbox.run_steps(&steps).await.unwrap_err();

        assert_eq!(err.kind(), "policy_violation");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn shell_steps_run_in_their_own_directory() {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(SandboxConfig::default().with_root(dir.path())).unwrap();
        let steps = vec![step("echo from-step", StepLanguage::Bash, Some("hello.sh"), true)];

        let output = match sandbox.run_steps(&steps).await {
            Ok(output) => output,
            Err(SandboxError::RuntimeUnavailable(_)) => return,
            Err(other) => panic!("unexpected error: {other:?}"),
        };

        assert_eq!(output.output.exit_code, 0);
        assert!(output.output.stdout.contains("Executing hello.sh"));
        assert!(output.output.stdout.contains("from-step"));
        assert!(output.run_dir.starts_with("runs/"));
        assert!(dir.path().join(&output.run_dir).join("hello.sh").exists());
    }
}
