mod stream;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::provider::{LLMError, LLMProvider, LLMStream, Result};
use crate::types::ResponseRequest;
use agent_core::tools::ToolSchema;

use super::common::sse::llm_stream_from_sse;

pub use stream::{classify_api_error, parse_responses_event};

/// Streaming client for the OpenAI Responses API.
pub struct OpenAIResponsesProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIResponsesProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

/// Responses API tools are flat: no nested `function` object.
fn responses_tool(schema: &ToolSchema) -> Value {
    json!({
        "type": schema.schema_type,
        "name": schema.function.name,
        "description": schema.function.description,
        "parameters": schema.function.parameters,
    })
}

pub fn build_responses_body(request: &ResponseRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "input": request.input.to_json(),
        "stream": true,
        "parallel_tool_calls": request.parallel_tool_calls,
    });

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.iter().map(responses_tool).collect());
    }
    if let Some(previous) = &request.previous_response_id {
        body["previous_response_id"] = json!(previous);
    }
    if let Some(instructions) = &request.instructions {
        body["instructions"] = json!(instructions);
    }

    body
}

#[async_trait]
impl LLMProvider for OpenAIResponsesProvider {
    async fn response_stream(&self, request: &ResponseRequest) -> Result<LLMStream> {
        log::debug!(
            "Responses request: model={}, continuation={:?}, tools={}",
            request.model,
            request.previous_response_id,
            request.tools.len()
        );

        let response = self
            .client
            .post(self.responses_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&build_responses_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(LLMError::Auth(format!("HTTP {}: {}", status, text)));
            }
            return Err(match serde_json::from_str::<Value>(&text) {
                Ok(body) => classify_api_error(&body),
                Err(_) => LLMError::Api(format!("HTTP {}: {}", status, text)),
            });
        }

        Ok(llm_stream_from_sse(response, |event, data| {
            parse_responses_event(event, data)
        }))
    }
}
