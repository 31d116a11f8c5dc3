//! One-shot merge of recent per-agent predictions into combined forecasts.

use std::collections::HashMap;
use std::sync::Arc;

use callsheet_core::{normalize_handle, normalize_symbol, AccountRef, CombinedPrediction, ExtractionResult};
use serde::{Deserialize, Serialize};

use crate::error::AnalystError;
use crate::extractor::strip_code_fence;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ContentPart};
use crate::prompts::AGGREGATION_SYSTEM_PROMPT;

/// Everything the model sees about one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDigest {
    pub agent_id: i64,
    pub agent_name: String,
    pub accounts: Vec<AccountRef>,
    pub predictions: Vec<DigestEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestEntry {
    pub username: String,
    pub post_id: String,
    pub created_at: String,
    pub prediction: ExtractionResult,
}

#[derive(Deserialize)]
struct AggregationAnswer {
    #[serde(default)]
    predictions: Vec<serde_json::Value>,
}

pub struct Aggregator {
    model: Arc<dyn ChatModel>,
}

impl Aggregator {
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Ask the model for one combined prediction per agent and token.
    ///
    /// Digests without predictions are not sent; when none remain the model
    /// is not called. Entries that reference unknown agents, lack a token, or
    /// carry a confidence outside `[0, 1]` are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AnalystError`] if the model cannot be reached or its answer
    /// is not the expected JSON object.
    pub async fn combine(
        &self,
        digests: &[AgentDigest],
    ) -> Result<Vec<CombinedPrediction>, AnalystError> {
        let digests: Vec<&AgentDigest> =
            digests.iter().filter(|d| !d.predictions.is_empty()).collect();
        if digests.is_empty() {
            return Ok(Vec::new());
        }

        let payload = serde_json::to_string(&digests).map_err(|e| AnalystError::Deserialize {
            context: "aggregation payload".to_string(),
            source: e,
        })?;

        let messages = [
            ChatMessage::System {
                content: AGGREGATION_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage::User {
                content: vec![ContentPart::Text {
                    text: format!("Agents: {payload}"),
                }],
            },
        ];

        let reply = self
            .model
            .complete(ChatRequest {
                messages: &messages,
                tools: &[],
                tool_choice: None,
                json_output: true,
            })
            .await?;

        let raw = reply.content.unwrap_or_default();
        let answer: AggregationAnswer =
            serde_json::from_str(strip_code_fence(&raw)).map_err(|e| AnalystError::Deserialize {
                context: "aggregation answer".to_string(),
                source: e,
            })?;

        let accounts_by_agent: HashMap<i64, &[AccountRef]> = digests
            .iter()
            .map(|d| (d.agent_id, d.accounts.as_slice()))
            .collect();

        Ok(answer
            .predictions
            .into_iter()
            .filter_map(|entry| validate_entry(entry, &accounts_by_agent))
            .collect())
    }
}

fn validate_entry(
    entry: serde_json::Value,
    accounts_by_agent: &HashMap<i64, &[AccountRef]>,
) -> Option<CombinedPrediction> {
    let mut prediction: CombinedPrediction = match serde_json::from_value(entry) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "aggregate: dropping malformed entry");
            return None;
        }
    };

    let Some(accounts) = accounts_by_agent.get(&prediction.agent_id) else {
        tracing::warn!(agent_id = prediction.agent_id, "aggregate: dropping entry for unknown agent");
        return None;
    };

    let Some(token) = normalize_symbol(&prediction.token) else {
        tracing::warn!(agent_id = prediction.agent_id, "aggregate: dropping entry without token");
        return None;
    };
    prediction.token = token;

    if !(0.0..=1.0).contains(&prediction.confidence) {
        tracing::warn!(
            agent_id = prediction.agent_id,
            confidence = prediction.confidence,
            "aggregate: dropping entry with out-of-range confidence"
        );
        return None;
    }

    prediction.supporting_influencers = prediction
        .supporting_influencers
        .iter()
        .map(|u| normalize_handle(u))
        .filter(|u| accounts.iter().any(|a| a.username == *u))
        .collect();
    prediction.supporting_influencers.dedup();

    Some(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_accounts() -> Vec<AccountRef> {
        vec![AccountRef {
            username: "alice".into(),
            influence: 80.0,
        }]
    }

    #[test]
    fn validate_restricts_influencers_to_agent_accounts() {
        let accounts = agent_accounts();
        let mut map = HashMap::new();
        map.insert(1, accounts.as_slice());

        let entry = serde_json::json!({
            "agent_id": 1,
            "token": "$btc",
            "confidence": 0.6,
            "direction": "up",
            "supporting_influencers": ["@Alice", "mallory"]
        });
        let p = validate_entry(entry, &map).expect("valid");
        assert_eq!(p.token, "BTC");
        assert_eq!(p.supporting_influencers, vec!["alice".to_string()]);
    }

    #[test]
    fn validate_drops_bad_confidence_and_unknown_agent() {
        let accounts = agent_accounts();
        let mut map = HashMap::new();
        map.insert(1, accounts.as_slice());

        let bad_confidence = serde_json::json!({
            "agent_id": 1, "token": "BTC", "confidence": 1.5
        });
        assert!(validate_entry(bad_confidence, &map).is_none());

        let unknown = serde_json::json!({
            "agent_id": 99, "token": "BTC", "confidence": 0.5
        });
        assert!(validate_entry(unknown, &map).is_none());

        let no_token = serde_json::json!({
            "agent_id": 1, "token": " ", "confidence": 0.5
        });
        assert!(validate_entry(no_token, &map).is_none());
    }
}
