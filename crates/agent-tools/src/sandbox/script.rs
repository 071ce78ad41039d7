//! Tier A: capability-gated in-process scripts.
//!
//! Scripts are Rhai. Source is compiled and the syntax tree is walked before
//! anything runs; a script that imports a module outside [`ALLOWED_MODULES`]
//! or names anything in [`DENIED_NAMES`] never executes a single statement.
//! Only then is the source compiled again by the locked engine, which has
//! every denied name disabled as a symbol and a module resolver that knows the
//! allow-listed modules and nothing else, with `print` captured into a buffer.
//!
//! There is no process boundary. The operation budget, call-depth limit and
//! wall-clock check bound most runaway scripts, but memory use is only
//! partially limited.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::module_resolvers::StaticModuleResolver;
use rhai::{ASTNode, Dynamic, Engine, EvalAltResult, Expr, OptimizationLevel, Stmt, AST};

use super::script_modules::allowed_module;
pub use super::script_modules::ALLOWED_MODULES;
use super::SandboxError;

/// Names that reach reflection, dynamic evaluation, process control or
/// import hooks.
pub const DENIED_NAMES: &[&str] = &[
    "eval",
    "Fn",
    "call",
    "curry",
    "is_def_fn",
    "is_def_var",
    "is_shared",
    "exit",
    "sleep",
    "debug",
    "print_debug",
    "import_module",
];

pub const NO_OUTPUT: &str = "[no output]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub exit_code: i32,
    pub stdout: String,
}

#[derive(Debug, Clone)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub wall_clock: Duration,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            wall_clock: Duration::from_secs(10),
        }
    }
}

/// Compile `source` and list every policy violation in it.
///
/// Optimization is off so constant folding cannot rewrite a denied call
/// (`Fn("name")`) into a value the walk no longer sees.
pub fn check_script(source: &str) -> Result<AST, SandboxError> {
    let mut engine = Engine::new();
    engine.set_optimization_level(OptimizationLevel::None);

    let ast = engine
        .compile(source)
        .map_err(|e| SandboxError::Other(format!("script does not parse: {e}")))?;

    let violations = collect_violations(&ast);
    if violations.is_empty() {
        Ok(ast)
    } else {
        Err(SandboxError::PolicyViolation(violations.join("; ")))
    }
}

fn collect_violations(ast: &AST) -> Vec<String> {
    let mut violations: Vec<String> = Vec::new();
    let mut record = |violation: String| {
        if !violations.contains(&violation) {
            violations.push(violation);
        }
    };

    ast.walk(&mut |path: &[ASTNode]| {
        let Some(node) = path.last() else {
            return true;
        };

        match node {
            ASTNode::Stmt(Stmt::Import(import, _)) => match &import.0 {
                Expr::StringConstant(name, _) if ALLOWED_MODULES.contains(&name.as_str()) => {}
                Expr::StringConstant(name, _) => record(format!("blocked import: {name}")),
                _ => record("blocked import: module path must be a string literal".to_string()),
            },
            ASTNode::Stmt(Stmt::FnCall(call, _))
            | ASTNode::Expr(Expr::FnCall(call, _))
            | ASTNode::Expr(Expr::MethodCall(call, _)) => {
                if DENIED_NAMES.contains(&call.name.as_str()) {
                    record(format!("blocked call to: {}", call.name));
                }
            }
            ASTNode::Expr(Expr::Variable(variable, ..)) => {
                let name = variable.1.as_str();
                if DENIED_NAMES.contains(&name) {
                    record(format!("blocked name: {name}"));
                }
            }
            _ => {}
        }

        true
    });

    violations
}

fn build_engine(limits: &ScriptLimits, output: Arc<Mutex<Vec<String>>>) -> Engine {
    let mut engine = Engine::new();
    for name in DENIED_NAMES {
        engine.disable_symbol(*name);
    }

    let mut resolver = StaticModuleResolver::new();
    for name in ALLOWED_MODULES {
        if let Some(module) = allowed_module(name) {
            let module = Arc::new(module);
            resolver.insert(*name, (*module).clone());
            engine.register_static_module(*name, module);
        }
    }
    engine.set_module_resolver(resolver);

    engine
        .set_max_operations(limits.max_operations)
        .set_max_call_levels(limits.max_call_levels)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size);

    let deadline = Instant::now() + limits.wall_clock;
    engine.on_progress(move |_| {
        if Instant::now() > deadline {
            Some(Dynamic::from("wall clock limit reached"))
        } else {
            None
        }
    });

    engine.on_print(move |line| {
        if let Ok(mut lines) = output.lock() {
            lines.push(line.to_string());
        }
    });

    engine
}

/// Gate, then run `source` to completion on the current thread.
///
/// A policy violation is returned before execution. Runtime errors are
/// rendered as `[sandbox error] ...` with exit code 1.
pub fn run_script(source: &str, limits: &ScriptLimits) -> Result<ScriptOutput, SandboxError> {
    check_script(source)?;

    let output = Arc::new(Mutex::new(Vec::new()));
    let engine = build_engine(limits, Arc::clone(&output));
    let ast = engine
        .compile(source)
        .map_err(|e| SandboxError::PolicyViolation(format!("rejected by locked engine: {e}")))?;
    let result = engine.run_ast(&ast);

    let printed = output
        .lock()
        .map(|lines| lines.join("\n"))
        .unwrap_or_default();
    let printed = printed.trim();

    match result {
        Ok(()) => Ok(ScriptOutput {
            exit_code: 0,
            stdout: if printed.is_empty() {
                NO_OUTPUT.to_string()
            } else {
                printed.to_string()
            },
        }),
        Err(err) => match *err {
            EvalAltResult::ErrorTerminated(..) => Err(SandboxError::Timeout {
                timeout_secs: limits.wall_clock.as_secs(),
                stdout: printed.to_string(),
                stderr: String::new(),
            }),
            other => Ok(ScriptOutput {
                exit_code: 1,
                stdout: format!("[sandbox error] {}", other),
            }),
        },
    }
}

/// Async entry point; the script runs on the blocking pool.
pub async fn evaluate(source: String, limits: ScriptLimits) -> Result<ScriptOutput, SandboxError> {
    tokio::task::spawn_blocking(move || run_script(&source, &limits))
        .await
        .map_err(|e| SandboxError::Other(format!("script worker failed: {e}")))?
}
