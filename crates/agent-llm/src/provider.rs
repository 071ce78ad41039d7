use crate::types::{ResponseRequest, StreamEvent};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The continuation handle is unknown to the provider or is waiting on
    /// a tool output that will never arrive.
    #[error("Stale continuation: {0}")]
    StaleContinuation(String),
}

impl LLMError {
    pub fn is_stale_continuation(&self) -> bool {
        matches!(self, LLMError::StaleContinuation(_))
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Open one streamed response pass.
    ///
    /// Errors that can be detected before the first event (rejected handle,
    /// bad credentials) are returned here; later failures arrive as stream
    /// items.
    async fn response_stream(&self, request: &ResponseRequest) -> Result<LLMStream>;
}
