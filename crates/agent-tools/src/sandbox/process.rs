use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use super::config::{ContainerLimits, RuntimeKind, SandboxConfig};
use super::SandboxError;

const CONTAINER_MOUNT: &str = "/sandbox";
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Python,
    Shell,
}

/// One launch of a file that already sits inside the sandbox root.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub interpreter: Interpreter,
    /// Absolute host path of the file to run.
    pub file: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Absolute host path of the working directory.
    pub workdir: PathBuf,
    pub timeout_secs: u64,
    /// Third-party packages to install before running (container only).
    pub install: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Where Tier B code runs.
#[derive(Debug, Clone)]
pub enum IsolationRuntime {
    Process {
        python: String,
        shell: String,
    },
    Container {
        binary: String,
        image: String,
        limits: ContainerLimits,
    },
}

impl IsolationRuntime {
    pub fn from_config(config: &SandboxConfig) -> Self {
        match config.runtime {
            RuntimeKind::Process => Self::Process {
                python: config.python.clone(),
                shell: config.shell.clone(),
            },
            RuntimeKind::Container => Self::Container {
                binary: config.container_binary.clone(),
                image: config.image.clone(),
                limits: config.limits.clone(),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Process { .. } => "process",
            Self::Container { .. } => "container",
        }
    }

    /// Run `spec` to completion, kill it on timeout, and always clean up.
    pub async fn run(&self, root: &Path, spec: &LaunchSpec) -> Result<ProcessOutput, SandboxError> {
        match self {
            Self::Process { python, shell } => {
                if !spec.install.is_empty() {
                    log::info!(
                        "process runtime skips installing {:?}; run with the container runtime to install packages",
                        spec.install
                    );
                }
                let program = match spec.interpreter {
                    Interpreter::Python => python,
                    Interpreter::Shell => shell,
                };
                let mut command = Command::new(program);
                command.arg(&spec.file).args(&spec.args).current_dir(&spec.workdir);
                run_command(command, program, spec).await
            }
            Self::Container {
                binary,
                image,
                limits,
            } => {
                let name = format!("agent_sandbox_{}", Uuid::new_v4().simple());
                let command = container_command(binary, image, limits, &name, root, spec)?;
                let result = run_command(command, binary, spec).await;
                remove_container(binary, &name).await;
                result
            }
        }
    }
}

fn container_path(root: &Path, host_path: &Path) -> Result<String, SandboxError> {
    let relative = host_path.strip_prefix(root).map_err(|_| {
        SandboxError::PolicyViolation(format!(
            "'{}' is outside the sandbox root",
            host_path.display()
        ))
    })?;

    let mut path = CONTAINER_MOUNT.to_string();
    for component in relative.components() {
        path.push('/');
        path.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(path)
}

fn container_command(
    binary: &str,
    image: &str,
    limits: &ContainerLimits,
    name: &str,
    root: &Path,
    spec: &LaunchSpec,
) -> Result<Command, SandboxError> {
    let file = container_path(root, &spec.file)?;
    let workdir = container_path(root, &spec.workdir)?;

    let mut command = Command::new(binary);
    command
        .arg("run")
        .arg("--rm")
        .arg("-i")
        .arg("--name")
        .arg(name)
        .arg("--memory")
        .arg(&limits.memory)
        .arg("--cpus")
        .arg(&limits.cpus)
        .arg("--pids-limit")
        .arg(limits.pids.to_string())
        .arg("-v")
        .arg(format!("{}:{}", root.display(), CONTAINER_MOUNT))
        .arg("-w")
        .arg(workdir)
        .arg(image);

    let interpreter = match spec.interpreter {
        Interpreter::Python => "python",
        Interpreter::Shell => "bash",
    };

    if spec.install.is_empty() {
        command.arg(interpreter).arg(file).args(&spec.args);
    } else {
        let script = format!(
            "pip install --quiet --disable-pip-version-check {} 1>&2 && exec {} \"$@\"",
            spec.install.join(" "),
            interpreter
        );
        command
            .arg("sh")
            .arg("-c")
            .arg(script)
            .arg("sandbox-run")
            .arg(file)
            .args(&spec.args);
    }

    Ok(command)
}

async fn remove_container(binary: &str, name: &str) {
    let result = Command::new(binary)
        .args(["rm", "-f", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        log::debug!("container cleanup for {} failed: {}", name, e);
    }
}

/// Output captured so far. Readers append chunk by chunk, so whatever a
/// killed process already wrote is still here after a timeout.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn append(&self, chunk: &[u8]) {
        let mut buffer = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buffer.extend_from_slice(chunk);
    }

    fn snapshot(&self) -> String {
        let buffer = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

fn spawn_reader<R>(reader: Option<R>) -> (Capture, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let capture = Capture::default();
    let sink = capture.clone();
    let handle = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.append(&chunk[..n]),
            }
        }
    });
    (capture, handle)
}

async fn collect((capture, handle): (Capture, JoinHandle<()>)) -> String {
    if timeout(OUTPUT_GRACE, handle).await.is_err() {
        log::debug!("sandbox output pipe still open after grace period; using partial capture");
    }
    capture.snapshot()
}

/// Process group led by the sandboxed child. Killing the group also takes
/// down grandchildren (launch scripts, `sh -c`, user subprocesses).
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn kill(&self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.0 {
                // ESRCH just means the whole group already exited.
                unsafe {
                    libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
                }
            }
        }
    }
}

async fn run_command(
    mut command: Command,
    program: &str,
    spec: &LaunchSpec,
) -> Result<ProcessOutput, SandboxError> {
    command
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandboxError::RuntimeUnavailable(format!("'{}' is not installed or not on PATH", program))
        } else {
            SandboxError::Other(format!("failed to launch '{}': {}", program, e))
        }
    })?;
    let group = ProcessGroup(child.id());

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    if let (Some(input), Some(mut pipe)) = (spec.stdin.as_ref(), child.stdin.take()) {
        if let Err(e) = pipe.write_all(input.as_bytes()).await {
            log::debug!("stdin write to sandboxed process failed: {}", e);
        }
        drop(pipe);
    }

    match timeout(Duration::from_secs(spec.timeout_secs), child.wait()).await {
        Ok(Ok(status)) => {
            // Background leftovers would otherwise hold the pipes open.
            group.kill();
            Ok(ProcessOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: collect(stdout).await,
                stderr: collect(stderr).await,
            })
        }
        Ok(Err(e)) => {
            group.kill();
            Err(SandboxError::Other(format!("waiting for '{}' failed: {}", program, e)))
        }
        Err(_) => {
            group.kill();
            if let Err(e) = child.start_kill() {
                log::debug!("direct kill of timed out sandbox process failed: {}", e);
            }
            let _ = timeout(OUTPUT_GRACE, child.wait()).await;
            log::warn!(
                "sandbox process timed out after {}s and was killed",
                spec.timeout_secs
            );
            Err(SandboxError::Timeout {
                timeout_secs: spec.timeout_secs,
                stdout: collect(stdout).await,
                stderr: collect(stderr).await,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_runtime() -> IsolationRuntime {
        IsolationRuntime::Process {
            python: "python3".to_string(),
            shell: "sh".to_string(),
        }
    }

    fn shell_spec(dir: &Path, script: &str, timeout_secs: u64) -> LaunchSpec {
        let file = dir.join("run.sh");
        std::fs::write(&file, script).unwrap();
        LaunchSpec {
            interpreter: Interpreter::Shell,
            file,
            args: vec!["first".to_string()],
            stdin: None,
            workdir: dir.to_path_buf(),
            timeout_secs,
            install: Vec::new(),
        }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let spec = shell_spec(dir.path(), "echo \"hello $1\"\necho oops >&2\nexit 3\n", 5);

        let output = shell_runtime().run(dir.path(), &spec).await.unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "hello first\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn stdin_is_piped() {
        let dir = TempDir::new().unwrap();
        let mut spec = shell_spec(dir.path(), "read line\necho \"got $line\"\n", 5);
        spec.stdin = Some("value\n".to_string());

        let output = shell_runtime().run(dir.path(), &spec).await.unwrap();
        assert_eq!(output.stdout, "got value\n");
    }

    #[tokio::test]
    async fn infinite_loop_times_out_with_partial_output() {
        let dir = TempDir::new().unwrap();
        let spec = shell_spec(dir.path(), "echo started\nwhile :; do :; done\n", 1);

        let err = shell_runtime().run(dir.path(), &spec).await.unwrap_err();

        match err {
            SandboxError::Timeout {
                timeout_secs,
                stdout,
                stderr,
            } => {
                assert_eq!(timeout_secs, 1);
                assert!(stdout.contains("started"));
                assert!(stderr.is_empty());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_grandchildren_and_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let script = "echo started\nsh -c 'echo $$ > grandchild.pid; exec sleep 37'\necho late\n";
        let spec = shell_spec(dir.path(), script, 1);

        let started = std::time::Instant::now();
        let err = shell_runtime().run(dir.path(), &spec).await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            SandboxError::Timeout { stdout, .. } => {
                assert_eq!(stdout, "started\n");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");

        let pid = std::fs::read_to_string(dir.path().join("grandchild.pid")).unwrap();
        let mut alive = is_running(&pid);
        for _ in 0..20 {
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            alive = is_running(&pid);
        }
        assert!(!alive, "grandchild {} survived the timeout", pid.trim());
    }

    #[tokio::test]
    async fn background_leftovers_do_not_delay_normal_exit() {
        let dir = TempDir::new().unwrap();
        let spec = shell_spec(dir.path(), "sleep 30 &\necho done\n", 10);

        let started = std::time::Instant::now();
        let output = shell_runtime().run(dir.path(), &spec).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "done\n");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_interpreter_is_runtime_unavailable() {
        let dir = TempDir::new().unwrap();
        let spec = shell_spec(dir.path(), "echo hi\n", 5);
        let runtime = IsolationRuntime::Process {
            python: "python3".to_string(),
            shell: "definitely-not-a-shell-xyz".to_string(),
        };

        let err = runtime.run(dir.path(), &spec).await.unwrap_err();
        assert_eq!(err.kind(), "runtime_unavailable");
    }

    #[tokio::test]
    async fn missing_container_binary_is_runtime_unavailable() {
        let dir = TempDir::new().unwrap();
        let spec = shell_spec(dir.path(), "echo hi\n", 5);
        let runtime = IsolationRuntime::Container {
            binary: "no-such-container-cli-xyz".to_string(),
            image: "python:3.11-slim".to_string(),
            limits: ContainerLimits::default(),
        };

        let err = runtime.run(dir.path(), &spec).await.unwrap_err();
        assert!(matches!(err, SandboxError::RuntimeUnavailable(_)));
    }

    #[test]
    fn container_command_mounts_root_and_installs_first() {
        let root = Path::new("/srv/sandbox");
        let spec = LaunchSpec {
            interpreter: Interpreter::Python,
            file: root.join("jobs/main.py"),
            args: vec!["--n".to_string(), "3".to_string()],
            stdin: None,
            workdir: root.join("jobs"),
            timeout_secs: 10,
            install: vec!["requests".to_string()],
        };

        let command = container_command(
            "docker",
            "python:3.11-slim",
            &ContainerLimits::default(),
            "agent_sandbox_test",
            root,
            &spec,
        )
        .unwrap();

        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "run");
        assert!(args.contains(&"--rm".to_string()));
        assert!(args.contains(&"/srv/sandbox:/sandbox".to_string()));
        assert!(args.contains(&"/sandbox/jobs".to_string()));
        let script = args.iter().find(|a| a.starts_with("pip install")).unwrap();
        assert!(script.contains("requests"));
        assert!(script.ends_with("exec python \"$@\""));
        assert_eq!(&args[args.len() - 3..], ["/sandbox/jobs/main.py", "--n", "3"]);
    }
}
