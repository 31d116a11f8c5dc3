//! Language-model analysis of posts.
//!
//! - [`Extractor`] classifies one post and extracts its prediction, with a
//!   single round of quote tool calls.
//! - [`Aggregator`] merges recent predictions into combined forecasts per agent.
//! - [`OpenAiChat`] is the chat-completions transport behind both.

pub mod aggregator;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod prompts;
pub mod tools;

pub use aggregator::{AgentDigest, Aggregator, DigestEntry};
pub use error::AnalystError;
pub use extractor::{Extractor, PostAnalyzer};
pub use llm::{
    AssistantMessage, ChatMessage, ChatModel, ChatRequest, ContentPart, FunctionCall, OpenAiChat,
    ToolCallRequest, ToolChoice,
};
pub use tools::{ToolCall, ToolOutcome, TOKEN_PRICE_TOOL};
