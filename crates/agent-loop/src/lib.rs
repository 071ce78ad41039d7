pub mod config;
pub mod runner;
pub mod session;
pub mod stream;

pub use config::AgentLoopConfig;
pub use runner::run_turn;
pub use session::ConversationSession;

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
