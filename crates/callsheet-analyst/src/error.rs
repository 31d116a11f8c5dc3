use thiserror::Error;

/// Errors talking to the language model.
///
/// A malformed *answer* is not an error: the extractor degrades it into a
/// not-a-prediction record. These variants cover the transport and envelope.
#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model response contained no choices")]
    EmptyChoices,
}
