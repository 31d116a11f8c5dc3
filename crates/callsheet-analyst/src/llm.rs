//! Chat-completions client with tool-call support.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::AnalystError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const TEMPERATURE: f64 = 0.2;
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: Vec<ContentPart>,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
}

/// Inputs for one completion.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub tools: &'a [serde_json::Value],
    pub tool_choice: Option<ToolChoice>,
    /// Ask the provider to constrain output to a JSON object.
    pub json_output: bool,
}

/// The model's reply: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantMessage {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// A chat-completions language model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run a single request/response completion.
    ///
    /// # Errors
    ///
    /// Returns [`AnalystError`] on transport failure, a non-2xx status, or an
    /// undecodable envelope.
    async fn complete(&self, request: ChatRequest<'_>) -> Result<AssistantMessage, AnalystError>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    endpoint: Url,
}

impl OpenAiChat {
    /// # Errors
    ///
    /// Returns [`AnalystError::Http`] if the HTTP client cannot be constructed.
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, AnalystError> {
        Self::with_base_url(api_key, model, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (another compatible provider,
    /// or a wiremock server in tests).
    ///
    /// # Errors
    ///
    /// Returns [`AnalystError::Http`] if the HTTP client cannot be constructed,
    /// or [`AnalystError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, AnalystError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let invalid = |reason: String| AnalystError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| invalid(e.to_string()))?;
        let endpoint = base
            .join("chat/completions")
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            endpoint,
        })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [serde_json::Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_tools(tools: &&[serde_json::Value]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<AssistantMessage, AnalystError> {
        let body = WireRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: request.messages,
            tools: request.tools,
            // tool_choice is rejected by the API when no tools are sent.
            tool_choice: request.tool_choice.filter(|_| !request.tools.is_empty()),
            response_format: request
                .json_output
                .then(|| serde_json::json!({"type": "json_object"})),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AnalystError::Api {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: WireResponse =
            serde_json::from_str(&text).map_err(|e| AnalystError::Deserialize {
                context: "chat completion".to_string(),
                source: e,
            })?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(AnalystError::EmptyChoices)?
            .message;

        Ok(AssistantMessage {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_in_chat_format() {
        let messages = vec![
            ChatMessage::System {
                content: "rubric".into(),
            },
            ChatMessage::User {
                content: vec![
                    ContentPart::Text {
                        text: "post".into(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "https://img".into(),
                            detail: "low".into(),
                        },
                    },
                ],
            },
            ChatMessage::Assistant {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call_1".into(),
                    kind: "function".into(),
                    function: FunctionCall {
                        name: "get_token_price".into(),
                        arguments: r#"{"symbol":"BTC"}"#.into(),
                    },
                }],
            },
            ChatMessage::Tool {
                tool_call_id: "call_1".into(),
                content: "65000".into(),
            },
        ];

        let json = serde_json::to_value(&messages).expect("encode");
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["content"][1]["type"], "image_url");
        assert_eq!(json[1]["content"][1]["image_url"]["detail"], "low");
        assert_eq!(json[2]["role"], "assistant");
        assert!(json[2]["content"].is_null());
        assert_eq!(json[2]["tool_calls"][0]["type"], "function");
        assert_eq!(json[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn endpoint_is_joined_under_base_path() {
        let chat = OpenAiChat::with_base_url("k", "m", 5, "http://localhost:1234/v1/")
            .expect("client");
        assert_eq!(
            chat.endpoint.as_str(),
            "http://localhost:1234/v1/chat/completions"
        );
    }
}
