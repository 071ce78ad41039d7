use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Continuation is stale: {0}")]
    StaleContinuation(String),

    #[error("Tool round limit of {0} reached in a single turn")]
    RoundLimit(usize),

    #[error("Cancelled")]
    Cancelled,
}
