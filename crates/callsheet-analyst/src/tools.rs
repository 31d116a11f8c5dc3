//! The fixed set of tools the extractor exposes to the model.

use callsheet_core::normalize_symbol;
use callsheet_quotes::PriceLookup;
use serde::Deserialize;

use crate::llm::ToolCallRequest;

pub const TOKEN_PRICE_TOOL: &str = "get_token_price";

/// JSON tool definitions sent with the first completion.
#[must_use]
pub fn tool_definitions() -> Vec<serde_json::Value> {
    vec![serde_json::json!({
        "type": "function",
        "function": {
            "name": TOKEN_PRICE_TOOL,
            "description": "Fetch the current spot price in USD for a crypto token or stock ticker.",
            "parameters": {
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "description": "Ticker symbol without the $ prefix, e.g. BTC or TSLA"
                    }
                },
                "required": ["symbol"],
                "additionalProperties": false
            }
        }
    })]
}

/// A decoded tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    TokenPrice { symbol: String },
}

#[derive(Deserialize)]
struct TokenPriceArgs {
    symbol: String,
}

/// What a tool run hands back to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub content: String,
    /// Symbol and price when a quote was resolved.
    pub resolved_price: Option<(String, f64)>,
}

impl ToolOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            resolved_price: None,
        }
    }
}

impl ToolCall {
    /// Decode a model tool request.
    ///
    /// # Errors
    ///
    /// Returns a message for the model when the tool is unknown or the
    /// arguments do not match its schema.
    pub fn parse(request: &ToolCallRequest) -> Result<Self, String> {
        match request.function.name.as_str() {
            TOKEN_PRICE_TOOL => {
                let args: TokenPriceArgs = serde_json::from_str(&request.function.arguments)
                    .map_err(|e| format!("invalid arguments for {TOKEN_PRICE_TOOL}: {e}"))?;
                let symbol = normalize_symbol(&args.symbol)
                    .ok_or_else(|| format!("invalid symbol '{}'", args.symbol))?;
                Ok(Self::TokenPrice { symbol })
            }
            other => Err(format!("unknown tool '{other}'")),
        }
    }

    pub async fn run(&self, prices: &dyn PriceLookup) -> ToolOutcome {
        match self {
            Self::TokenPrice { symbol } => match prices.fetch_price(symbol).await {
                Some(price) => ToolOutcome {
                    content: price.to_string(),
                    resolved_price: Some((symbol.clone(), price)),
                },
                None => ToolOutcome::failed(format!("No price found for {symbol}.")),
            },
        }
    }
}

/// Decode and run one tool request. Failures become an error string for the
/// model rather than an error for the caller.
pub async fn execute(request: &ToolCallRequest, prices: &dyn PriceLookup) -> ToolOutcome {
    match ToolCall::parse(request) {
        Ok(call) => {
            tracing::debug!(tool_call_id = %request.id, ?call, "analyst: running tool call");
            call.run(prices).await
        }
        Err(message) => {
            tracing::warn!(
                tool_call_id = %request.id,
                tool = %request.function.name,
                error = %message,
                "analyst: rejected tool call"
            );
            ToolOutcome::failed(format!("Error executing function: {message}"))
        }
    }
}
