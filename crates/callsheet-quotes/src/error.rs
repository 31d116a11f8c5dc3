use thiserror::Error;

/// Errors raised by an individual quote provider.
///
/// These never escape [`crate::QuoteSource`]; a failing provider just hands
/// over to the next one in the chain.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} did not answer within {timeout_secs}s")]
    Timeout {
        provider: &'static str,
        timeout_secs: u64,
    },
}
