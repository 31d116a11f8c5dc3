//! Extractor and aggregator behaviour against a scripted chat model.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use callsheet_analyst::{
    AgentDigest, Aggregator, AnalystError, AssistantMessage, ChatMessage, ChatModel, ChatRequest,
    DigestEntry, Extractor, FunctionCall, PostAnalyzer, ToolCallRequest, ToolChoice,
    TOKEN_PRICE_TOOL,
};
use callsheet_core::{AccountRef, Direction, ExtractionResult, FetchedPost};
use callsheet_quotes::PriceLookup;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Seen {
    messages: Vec<ChatMessage>,
    tool_choice: Option<ToolChoice>,
    tool_count: usize,
}

#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<AssistantMessage, AnalystError>>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<AssistantMessage, AnalystError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<AssistantMessage, AnalystError> {
        self.seen.lock().unwrap().push(Seen {
            messages: request.messages.to_vec(),
            tool_choice: request.tool_choice,
            tool_count: request.tools.len(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(text_reply("")))
    }
}

struct TablePrices {
    prices: HashMap<&'static str, f64>,
    calls: AtomicUsize,
}

impl TablePrices {
    fn new(prices: &[(&'static str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            prices: prices.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PriceLookup for TablePrices {
    async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prices.get(symbol).copied()
    }
}

fn text_reply(content: &str) -> AssistantMessage {
    AssistantMessage {
        content: Some(content.to_string()),
        tool_calls: vec![],
    }
}

fn price_call(id: &str, symbol: &str) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        kind: "function".to_string(),
        function: FunctionCall {
            name: TOKEN_PRICE_TOOL.to_string(),
            arguments: format!(r#"{{"symbol":"{symbol}"}}"#),
        },
    }
}

fn post(text: &str) -> FetchedPost {
    FetchedPost {
        id: "987".to_string(),
        author_id: "123".to_string(),
        author_handle: Some("alice".to_string()),
        text: text.to_string(),
        created_at: Some("2024-01-01T00:00:00Z".to_string()),
        media_urls: vec![],
    }
}

const BTC_ANSWER: &str = r#"{
    "is_prediction": true,
    "category": "crypto",
    "token": "$BTC",
    "name": "Bitcoin",
    "predicted_price": 120000,
    "currency": "USD",
    "direction": "up",
    "timeframe": "by Friday",
    "reason": "explicit price target with a deadline",
    "evidence": "$BTC to 120k by Friday"
}"#;

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_tool_calls_resolve_in_exactly_two_requests() {
    let model = ScriptedModel::new(vec![
        Ok(AssistantMessage {
            content: None,
            tool_calls: vec![
                price_call("c1", "BTC"),
                price_call("c2", "ETH"),
                price_call("c3", "ZZZ"),
            ],
        }),
        Ok(text_reply(BTC_ANSWER)),
        Ok(text_reply("should never be requested")),
    ]);
    let prices = TablePrices::new(&[("BTC", 65_000.0), ("ETH", 3_000.0)]);
    let extractor = Extractor::new(model.clone(), prices.clone());

    let result = extractor
        .analyze(&post("$BTC to 120k by Friday"))
        .await
        .expect("analyze");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(prices.calls.load(Ordering::SeqCst), 3);

    assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
    assert_eq!(requests[0].tool_count, 1);
    assert_eq!(requests[1].tool_choice, Some(ToolChoice::None));

    let follow_up = &requests[1].messages;
    // system, user, assistant with calls, three tool results
    assert_eq!(follow_up.len(), 6);
    let tool_contents: Vec<&str> = follow_up
        .iter()
        .filter_map(|m| match m {
            ChatMessage::Tool { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tool_contents[0], "65000");
    assert!(tool_contents[2].contains("No price found for ZZZ"));

    assert!(result.is_prediction);
    assert_eq!(result.token.as_deref(), Some("BTC"));
    assert_eq!(result.predicted_price, Some(120_000.0));
    assert_eq!(result.direction, Some(Direction::Up));
    assert_eq!(result.timeframe.as_deref(), Some("by Friday"));
    assert_eq!(result.current_price, Some(65_000.0));
}

#[tokio::test]
async fn no_tool_calls_means_a_single_request() {
    let model = ScriptedModel::new(vec![Ok(text_reply(
        r#"{"is_prediction": false, "reason": "a greeting, no forward-looking claim",
            "predicted_price": 5, "percent_change": 3, "current_price": 1}"#,
    ))]);
    let extractor = Extractor::new(model.clone(), TablePrices::new(&[]));

    let result = extractor.analyze(&post("gm frens")).await.expect("analyze");

    assert_eq!(model.requests().len(), 1);
    assert!(!result.is_prediction);
    assert_eq!(result.predicted_price, None);
    assert_eq!(result.percent_change, None);
    assert_eq!(result.current_price, None);
    assert!(!result.reason.is_empty());
}

#[tokio::test]
async fn unpriceable_symbol_still_yields_a_prediction_without_current_price() {
    let model = ScriptedModel::new(vec![
        Ok(AssistantMessage {
            content: None,
            tool_calls: vec![price_call("c1", "ZZZ")],
        }),
        Ok(text_reply(
            r#"{"is_prediction": true, "token": "ZZZ", "direction": "up", "reason": "moon call"}"#,
        )),
    ]);
    let extractor = Extractor::new(model, TablePrices::new(&[]));

    let result = extractor.analyze(&post("$ZZZ to the moon")).await.expect("analyze");
    assert!(result.is_prediction);
    assert_eq!(result.token.as_deref(), Some("ZZZ"));
    assert_eq!(result.current_price, None);
}

#[tokio::test]
async fn unknown_tool_gets_an_error_string_not_a_failure() {
    let model = ScriptedModel::new(vec![
        Ok(AssistantMessage {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "c1".to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: "get_weather".to_string(),
                    arguments: "{}".to_string(),
                },
            }],
        }),
        Ok(text_reply(r#"{"is_prediction": false, "reason": "weather talk"}"#)),
    ]);
    let extractor = Extractor::new(model.clone(), TablePrices::new(&[]));

    let result = extractor.analyze(&post("sunny")).await.expect("analyze");
    assert!(!result.is_prediction);

    let requests = model.requests();
    let tool_message = requests[1]
        .messages
        .iter()
        .find_map(|m| match m {
            ChatMessage::Tool { content, .. } => Some(content.clone()),
            _ => None,
        })
        .expect("tool message");
    assert!(tool_message.starts_with("Error executing function"));
}

#[tokio::test]
async fn malformed_answer_degrades_with_raw_text() {
    let model = ScriptedModel::new(vec![Ok(text_reply("I think BTC goes up!"))]);
    let extractor = Extractor::new(model, TablePrices::new(&[]));

    let result = extractor.analyze(&post("BTC up")).await.expect("analyze");
    assert!(!result.is_prediction);
    assert_eq!(result.raw_response.as_deref(), Some("I think BTC goes up!"));
    assert!(result.parse_error.is_some());
    assert!(!result.reason.is_empty());
}

#[tokio::test]
async fn fenced_answer_is_accepted() {
    let fenced = format!("```json\n{BTC_ANSWER}\n```");
    let model = ScriptedModel::new(vec![Ok(text_reply(&fenced))]);
    let extractor = Extractor::new(model, TablePrices::new(&[]));

    let result = extractor.analyze(&post("$BTC")).await.expect("analyze");
    assert!(result.is_prediction);
    assert!(!result.is_degraded());
}

#[tokio::test]
async fn empty_answer_degrades() {
    let model = ScriptedModel::new(vec![Ok(AssistantMessage::default())]);
    let extractor = Extractor::new(model, TablePrices::new(&[]));

    let result = extractor.analyze(&post("...")).await.expect("analyze");
    assert_eq!(
        result,
        ExtractionResult::parse_failure("", "empty response")
    );
}

#[tokio::test]
async fn transport_failure_is_an_error() {
    let model = ScriptedModel::new(vec![Err(AnalystError::EmptyChoices)]);
    let extractor = Extractor::new(model, TablePrices::new(&[]));

    let err = extractor.analyze(&post("$BTC")).await.expect_err("should fail");
    assert!(matches!(err, AnalystError::EmptyChoices));
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

fn digest(agent_id: i64, agent: &str, with_predictions: bool) -> AgentDigest {
    let prediction = serde_json::from_str::<ExtractionResult>(BTC_ANSWER)
        .expect("decode")
        .sanitize();
    AgentDigest {
        agent_id,
        agent_name: agent.to_string(),
        accounts: vec![AccountRef {
            username: "alice".to_string(),
            influence: 80.0,
        }],
        predictions: if with_predictions {
            vec![DigestEntry {
                username: "alice".to_string(),
                post_id: "987".to_string(),
                created_at: "2024-01-01T00:00:00Z".to_string(),
                prediction,
            }]
        } else {
            vec![]
        },
    }
}

#[tokio::test]
async fn aggregator_skips_model_when_nothing_to_merge() {
    let model = ScriptedModel::new(vec![]);
    let aggregator = Aggregator::new(model.clone());

    let out = aggregator
        .combine(&[digest(1, "alpha", false)])
        .await
        .expect("combine");
    assert!(out.is_empty());
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn aggregator_keeps_only_valid_entries() {
    let model = ScriptedModel::new(vec![Ok(text_reply(
        r#"{"predictions": [
            {"agent_id": 1, "token": "BTC", "predicted_price": 120000,
             "currency": "USD", "direction": "up", "confidence": 0.72,
             "reasoning": "single strong call", "supporting_influencers": ["alice"]},
            {"agent_id": 1, "token": "ETH", "confidence": 7},
            {"agent_id": 42, "token": "BTC", "confidence": 0.5}
        ]}"#,
    ))]);
    let aggregator = Aggregator::new(model.clone());

    let out = aggregator
        .combine(&[digest(1, "alpha", true), digest(2, "beta", false)])
        .await
        .expect("combine");

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].token, "BTC");
    assert_eq!(out[0].direction, Some(Direction::Up));
    assert_eq!(out[0].supporting_influencers, vec!["alice".to_string()]);

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tool_count, 0);
}

#[tokio::test]
async fn aggregator_rejects_non_json_answer() {
    let model = ScriptedModel::new(vec![Ok(text_reply("no idea"))]);
    let aggregator = Aggregator::new(model);

    let err = aggregator
        .combine(&[digest(1, "alpha", true)])
        .await
        .expect_err("should fail");
    assert!(matches!(err, AnalystError::Deserialize { .. }));
}
