pub mod provider;
pub mod providers;
pub mod types;

pub use provider::{LLMError, LLMProvider, LLMStream, Result};
pub use providers::OpenAIResponsesProvider;
pub use types::{FinalResponse, ResponseInput, ResponseRequest, StreamEvent};
