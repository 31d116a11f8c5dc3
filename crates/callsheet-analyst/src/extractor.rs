//! Prediction extraction for a single post.
//!
//! At most two model requests per post: the first may ask for quote tool
//! calls, which run concurrently; the second gets their results and must
//! answer without further tools.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use callsheet_core::{ExtractionResult, FetchedPost};
use callsheet_quotes::PriceLookup;
use futures::future::join_all;

use crate::error::AnalystError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ContentPart, ImageUrl, ToolChoice};
use crate::prompts::EXTRACTION_SYSTEM_PROMPT;
use crate::tools::{self, tool_definitions};

const IMAGE_DETAIL: &str = "low";

/// Anything that can turn a post into an [`ExtractionResult`].
#[async_trait]
pub trait PostAnalyzer: Send + Sync {
    /// Classify a post and extract its prediction fields.
    ///
    /// An empty or malformed model answer yields a degraded
    /// not-a-prediction result, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AnalystError`] only when the model could not be reached.
    async fn analyze(&self, post: &FetchedPost) -> Result<ExtractionResult, AnalystError>;
}

pub struct Extractor {
    model: Arc<dyn ChatModel>,
    prices: Arc<dyn PriceLookup>,
}

impl Extractor {
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>, prices: Arc<dyn PriceLookup>) -> Self {
        Self { model, prices }
    }
}

#[async_trait]
impl PostAnalyzer for Extractor {
    async fn analyze(&self, post: &FetchedPost) -> Result<ExtractionResult, AnalystError> {
        let tools = tool_definitions();
        let mut messages = vec![
            ChatMessage::System {
                content: EXTRACTION_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage::User {
                content: user_content(post),
            },
        ];

        let first = self
            .model
            .complete(ChatRequest {
                messages: &messages,
                tools: &tools,
                tool_choice: Some(ToolChoice::Auto),
                json_output: true,
            })
            .await?;

        let mut resolved_prices: HashMap<String, f64> = HashMap::new();

        let answer = if first.tool_calls.is_empty() {
            first.content
        } else {
            tracing::debug!(
                post_id = %post.id,
                tool_calls = first.tool_calls.len(),
                "analyst: resolving tool calls"
            );

            let outcomes = join_all(
                first
                    .tool_calls
                    .iter()
                    .map(|call| tools::execute(call, self.prices.as_ref())),
            )
            .await;

            messages.push(ChatMessage::Assistant {
                content: first.content,
                tool_calls: first.tool_calls.clone(),
            });
            for (call, outcome) in first.tool_calls.iter().zip(outcomes) {
                if let Some((symbol, price)) = outcome.resolved_price {
                    resolved_prices.insert(symbol, price);
                }
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: outcome.content,
                });
            }

            let second = self
                .model
                .complete(ChatRequest {
                    messages: &messages,
                    tools: &tools,
                    tool_choice: Some(ToolChoice::None),
                    json_output: true,
                })
                .await?;

            if !second.tool_calls.is_empty() {
                tracing::warn!(
                    post_id = %post.id,
                    tool_calls = second.tool_calls.len(),
                    "analyst: ignoring tool calls in follow-up answer"
                );
            }
            second.content
        };

        let result = decode_answer(answer.as_deref().unwrap_or_default(), &resolved_prices);
        if result.is_degraded() {
            tracing::warn!(
                post_id = %post.id,
                error = result.parse_error.as_deref().unwrap_or_default(),
                "analyst: model answer could not be decoded"
            );
        }
        Ok(result)
    }
}

fn user_content(post: &FetchedPost) -> Vec<ContentPart> {
    let payload = serde_json::json!({
        "id": post.id,
        "author": post.author_handle,
        "created_at": post.created_at,
        "text": post.text,
    });

    let mut parts = vec![ContentPart::Text {
        text: format!("Post data: {payload}"),
    }];
    parts.extend(post.media_urls.iter().map(|url| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: url.clone(),
            detail: IMAGE_DETAIL.to_string(),
        },
    }));
    parts
}

/// Turn the model's final text into a sanitised result.
fn decode_answer(raw: &str, resolved_prices: &HashMap<String, f64>) -> ExtractionResult {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return ExtractionResult::parse_failure(raw, "empty response");
    }

    let mut result = match serde_json::from_str::<ExtractionResult>(body) {
        Ok(parsed) => parsed.sanitize(),
        Err(e) => return ExtractionResult::parse_failure(raw, e.to_string()),
    };

    if result.is_prediction && result.current_price.is_none() {
        result.current_price = result
            .token
            .as_ref()
            .and_then(|t| resolved_prices.get(t))
            .copied();
    }
    result
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop an info string such as `json` on the opening line.
    match rest.find('\n') {
        Some(idx) if !rest[..idx].trim_start().starts_with('{') => rest[idx + 1..].trim(),
        _ => rest.trim(),
    }
}
