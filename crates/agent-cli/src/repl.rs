use std::io::{self, Write};

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use agent_core::{AgentError, AgentEvent, TurnSummary};
use agent_loop::ConversationSession;

use crate::transcript::Transcript;

const HELP_TEXT: &str = "Commands:
  reset, /reset, /new    Start a fresh thread (forget previous turns)
  /model <name>          Switch model for the next turn
  /config                Show current model, thread and transcript
  /help                  Show this help
  /exit, /quit           Quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Quit,
    Help,
    Reset,
    ShowConfig,
    SetModel(String),
    MissingModel,
    Message(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Empty;
    }

    let mut parts = trimmed.split_whitespace();
    let head = parts.next().unwrap_or_default().to_lowercase();
    let rest: Vec<&str> = parts.collect();
    match head.as_str() {
        "reset" | "/reset" | "/new" | ":refresh" if rest.is_empty() => ReplCommand::Reset,
        "/exit" | "/quit" | ":exit" | ":quit" | "exit" | "quit" if rest.is_empty() => {
            ReplCommand::Quit
        }
        "/help" | ":help" => ReplCommand::Help,
        "/config" | ":config" => ReplCommand::ShowConfig,
        "/model" | ":setmodel" => match rest.first() {
            Some(model) => ReplCommand::SetModel(model.to_string()),
            None => ReplCommand::MissingModel,
        },
        _ => ReplCommand::Message(trimmed.to_string()),
    }
}

fn spawn_event_printer(mut event_rx: mpsc::Receiver<AgentEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AgentEvent::Token { content } => {
                    print!("{}", content.green());
                    let _ = io::stdout().flush();
                }
                AgentEvent::ToolStart { tool_name, .. } => {
                    println!("\n{}", format!("🔧 Running tool: {}", tool_name).yellow());
                }
                AgentEvent::ToolComplete {
                    tool_name, success, ..
                } => {
                    let line = format!("{} finished", tool_name);
                    if success {
                        println!("{}", line.dimmed());
                    } else {
                        println!("{}", format!("{} with an error", line).red());
                    }
                }
                AgentEvent::ThreadReset { discarded, .. } => {
                    if !discarded.is_empty() {
                        println!(
                            "\n{}",
                            format!(
                                "[info] Discarding {} chars of partial reply",
                                discarded.chars().count()
                            )
                            .dimmed()
                        );
                    }
                    println!(
                        "\n{}",
                        "[info] Resetting stalled thread and retrying once...".yellow()
                    );
                }
                AgentEvent::Error { message } => {
                    println!("\n{}", format!("❌ Error: {}", message).red());
                }
                AgentEvent::Complete { .. } => println!(),
            }
        }
    })
}

/// Run one turn with console output and Ctrl-C cancellation.
pub async fn run_console_turn(
    session: &mut ConversationSession,
    input: &str,
) -> Result<TurnSummary, AgentError> {
    let (event_tx, event_rx) = mpsc::channel(256);
    let printer = spawn_event_printer(event_rx);

    let cancel_token = CancellationToken::new();
    let watcher = {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel_token.cancel();
            }
        })
    };

    let result = session.run_turn(input, event_tx, cancel_token).await;
    watcher.abort();
    let _ = printer.await;
    result
}

fn record_turn(transcript: &Transcript, input: &str, summary: &TurnSummary) {
    if let Err(e) = transcript.append_turn(input, summary) {
        log::warn!(
            "Failed to append to transcript {}: {}",
            transcript.path().display(),
            e
        );
    }
}

pub async fn run_once(
    session: &mut ConversationSession,
    transcript: &Transcript,
    input: &str,
) -> anyhow::Result<()> {
    let summary = run_console_turn(session, input).await?;
    record_turn(transcript, input, &summary);
    Ok(())
}

pub async fn run_repl(
    session: &mut ConversationSession,
    transcript: &Transcript,
) -> anyhow::Result<()> {
    println!("{}", "🤖 Agent REPL".cyan().bold());
    println!("{}", "Type /help for commands, /exit to quit".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{} ", ">".cyan().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{}", HELP_TEXT),
            ReplCommand::Reset => {
                session.reset();
                println!("{}", "🧹 Started a fresh thread.".cyan());
            }
            ReplCommand::ShowConfig => {
                println!("{} {}", "Model:".cyan(), session.model());
                println!(
                    "{} {}",
                    "Thread:".cyan(),
                    session.continuation().unwrap_or("(fresh)")
                );
                println!("{} {}", "Transcript:".cyan(), transcript.path().display());
            }
            ReplCommand::SetModel(model) => {
                session.set_model(model);
                println!("{}", format!("Model set to {}", session.model()).cyan());
            }
            ReplCommand::MissingModel => {
                println!("{}", "Usage: /model <model_name>".yellow());
            }
            ReplCommand::Message(input) => match run_console_turn(session, &input).await {
                Ok(summary) => record_turn(transcript, &input, &summary),
                Err(AgentError::Cancelled) => println!("{}", "Turn cancelled".yellow()),
                Err(e) => {
                    log::warn!("[{}] Turn failed: {}", session.id(), e);
                    println!("{}", format!("❌ {}", e).red());
                }
            },
        }
    }

    println!("{}", "👋 Goodbye!".cyan());
    Ok(())
}
