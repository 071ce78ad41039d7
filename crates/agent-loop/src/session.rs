use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::{AgentEvent, ConversationState, TurnSummary};
use agent_llm::LLMProvider;

use crate::config::AgentLoopConfig;
use crate::runner::{run_turn, Result};

/// A conversation with one provider. Turns run one at a time (`&mut self`);
/// the continuation handle only changes when a turn completes or on reset.
pub struct ConversationSession {
    state: ConversationState,
    llm: Arc<dyn LLMProvider>,
    config: AgentLoopConfig,
}

impl ConversationSession {
    pub fn new(llm: Arc<dyn LLMProvider>, model: impl Into<String>, config: AgentLoopConfig) -> Self {
        let state = ConversationState::new(model);
        log::info!("[{}] Session created (model: {})", state.id, state.model);
        Self { state, llm, config }
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn model(&self) -> &str {
        &self.state.model
    }

    pub fn continuation(&self) -> Option<&str> {
        self.state.continuation.as_deref()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.state.set_model(model);
        log::info!("[{}] Model set to {}", self.state.id, self.state.model);
    }

    /// Start a fresh provider-side thread on the next turn.
    pub fn reset(&mut self) {
        self.state.reset();
        log::info!("[{}] Conversation reset", self.state.id);
    }

    pub async fn run_turn(
        &mut self,
        user_input: impl Into<String>,
        event_tx: mpsc::Sender<AgentEvent>,
        cancel_token: CancellationToken,
    ) -> Result<TurnSummary> {
        run_turn(
            &mut self.state,
            user_input.into(),
            event_tx,
            Arc::clone(&self.llm),
            cancel_token,
            &self.config,
        )
        .await
    }
}
