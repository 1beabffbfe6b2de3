//! OpenAI-compatible chat completions adapter.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bouwbot_core::error::{BouwbotError, Result};

use crate::ports::{ChatCompletion, ChatProvider, ChatRequest, ChatRole, Message, ToolCallRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f64 = 0.2;
const MAX_TOKENS: u32 = 1024;

/// Chat provider speaking the OpenAI chat completions protocol. Works
/// against api.openai.com or any compatible endpoint.
pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &ChatRequest) -> CompletionBody {
        CompletionBody {
            model: self.model.clone(),
            messages: request.messages.clone(),
            tools: if request.tools.is_empty() { None } else { Some(request.tools.clone()) },
            tool_choice: if request.tools.is_empty() { None } else { Some("auto".to_string()) },
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait::async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let body = self.build_body(&request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BouwbotError::ProviderUnavailable {
                reason: format!("Failed to reach chat endpoint: {}", e),
                remediation: format!(
                    "Ensure the API at {} is reachable and OPENAI_API_KEY is set.",
                    self.base_url
                ),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BouwbotError::ProviderUnavailable {
                reason: format!("Chat API error ({}): {}", status, error_text),
                remediation: format!(
                    "Check that the model '{}' exists and the API key has access to it.",
                    self.model
                ),
            });
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|e| BouwbotError::ProviderUnavailable {
                reason: format!("Failed to parse chat response: {}", e),
                remediation: "Check that the endpoint speaks the chat completions protocol."
                    .to_string(),
            })?;

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            BouwbotError::ProviderUnavailable {
                reason: "Chat response contained no choices".to_string(),
                remediation: "Check provider logs for truncated responses.".to_string(),
            }
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .iter()
            .map(|call| ToolCallRequest {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            model = %self.model,
            tool_calls = tool_calls.len(),
            "chat completion received"
        );

        // Preserve the provider's own assistant message shape so phase two
        // can echo it back with matching tool_call ids.
        let assistant_message = Message {
            role: ChatRole::Assistant,
            content: choice.message.content.clone(),
            tool_calls: if choice.message.tool_calls.is_empty() {
                None
            } else {
                Some(
                    choice
                        .message
                        .tool_calls
                        .iter()
                        .filter_map(|call| serde_json::to_value(call).ok())
                        .collect(),
                )
            },
            tool_call_id: None,
        };

        Ok(ChatCompletion {
            content: choice.message.content,
            tool_calls,
            assistant_message: Some(assistant_message),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_carries_tools_and_tool_choice() {
        let provider = OpenAiChat::new("https://api.openai.com", "sk-test", "gpt-4o-mini");
        let request = ChatRequest {
            messages: vec![Message::system("You are BouwBot."), Message::user("hoe hoog?")],
            tools: vec![json!({ "type": "function", "function": { "name": "buffer_point" } })],
        };

        let body = serde_json::to_value(provider.build_body(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hoe hoog?");
        assert_eq!(body["tools"][0]["function"]["name"], "buffer_point");
    }

    #[test]
    fn request_body_omits_tools_when_none_offered() {
        let provider = OpenAiChat::new("https://api.openai.com/", "sk-test", "gpt-4o-mini");
        let request = ChatRequest { messages: vec![Message::user("hallo")], tools: vec![] };

        let body = serde_json::to_value(provider.build_body(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(provider.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn response_with_tool_calls_parses() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "buildings_within_buffer",
                            "arguments": "{\"lat\":52.09,\"lon\":5.12,\"radius_m\":400}"
                        }
                    }]
                }
            }]
        });

        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        let message = &parsed.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].function.name, "buildings_within_buffer");
    }
}
