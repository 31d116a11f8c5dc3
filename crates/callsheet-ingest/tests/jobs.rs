//! Ingestion and aggregation passes against in-memory fakes.
//!
//! Pacing tests run on tokio's paused clock, so cool-downs and rate-limit
//! pauses complete instantly while still advancing `tokio::time::Instant`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use callsheet_analyst::{
    Aggregator, AnalystError, AssistantMessage, ChatModel, ChatRequest, PostAnalyzer,
};
use callsheet_core::{AccountRef, CombinedPrediction, ExtractionResult, FetchedPost};
use callsheet_db::{AgentRow, AgentWithAccounts, DbError, PostRow, SaveOutcome};
use callsheet_ingest::{
    AggregateConfig, AggregationJob, IngestConfig, IngestSummary, IngestionLoop, PostStore,
};
use callsheet_social::{RateLimit, RecentPosts, SocialSource};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSocial {
    timelines: HashMap<String, Vec<FetchedPost>>,
    /// When set, every fetch reports an exhausted budget resetting this many
    /// seconds from now.
    exhausted_for_secs: Option<i64>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeSocial {
    fn call_ids(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl SocialSource for FakeSocial {
    async fn fetch_recent_posts(&self, account_id: &str, limit: u32) -> RecentPosts {
        self.calls
            .lock()
            .unwrap()
            .push((account_id.to_string(), Instant::now()));

        let rate_limit = match self.exhausted_for_secs {
            Some(secs) => RateLimit {
                remaining: 0,
                reset_at: Utc::now().timestamp() + secs,
            },
            None => RateLimit {
                remaining: 100,
                reset_at: 0,
            },
        };
        let mut posts = self.timelines.get(account_id).cloned().unwrap_or_default();
        posts.truncate(limit as usize);
        RecentPosts { posts, rate_limit }
    }
}

/// Classifies `$BTC` posts as predictions and fails on posts containing "boom".
#[derive(Default)]
struct FakeAnalyzer {
    calls: AtomicUsize,
}

#[async_trait]
impl PostAnalyzer for FakeAnalyzer {
    async fn analyze(&self, post: &FetchedPost) -> Result<ExtractionResult, AnalystError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if post.text.contains("boom") {
            return Err(AnalystError::EmptyChoices);
        }
        if post.text.contains("$BTC") {
            let json = serde_json::json!({
                "is_prediction": true,
                "category": "crypto",
                "token": "$BTC",
                "predicted_price": 120000,
                "direction": "up",
                "timeframe": "by Friday",
                "reason": "explicit target with a deadline"
            });
            return Ok(serde_json::from_value::<ExtractionResult>(json)
                .expect("decode")
                .sanitize());
        }
        Ok(ExtractionResult::not_a_prediction("no forward-looking claim"))
    }
}

type StoredPost = (String, FetchedPost, ExtractionResult);
type StoredCombined = (i64, CombinedPrediction, Vec<AccountRef>);

#[derive(Default)]
struct MemoryStore {
    account_ids: Vec<String>,
    handles: HashMap<String, String>,
    fail_saves_for: Option<String>,
    posts: Mutex<Vec<StoredPost>>,
    recent: Vec<PostRow>,
    agents: Vec<AgentWithAccounts>,
    combined: Mutex<Vec<StoredCombined>>,
    prune_calls: AtomicUsize,
}

impl MemoryStore {
    fn stored(&self) -> Vec<StoredPost> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn tracked_account_ids(&self) -> Result<Vec<String>, DbError> {
        Ok(self.account_ids.clone())
    }

    async fn handle_for_account(&self, account_id: &str) -> Result<Option<String>, DbError> {
        Ok(self.handles.get(account_id).cloned())
    }

    async fn exists(&self, handle: &str, post_id: &str) -> Result<bool, DbError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .any(|(h, p, _)| h == handle && p.id == post_id))
    }

    async fn save(
        &self,
        handle: &str,
        post: &FetchedPost,
        extraction: &ExtractionResult,
    ) -> Result<SaveOutcome, DbError> {
        if self.fail_saves_for.as_deref() == Some(handle) {
            return Err(DbError::Conflict("simulated write failure".to_string()));
        }
        let mut posts = self.posts.lock().unwrap();
        if let Some(idx) = posts
            .iter()
            .position(|(h, p, _)| h == handle && p.id == post.id)
        {
            return Ok(SaveOutcome::Exists(idx as i64));
        }
        posts.push((handle.to_string(), post.clone(), extraction.clone()));
        Ok(SaveOutcome::Created(posts.len() as i64 - 1))
    }

    async fn mark_fetched(&self, _handle: &str) -> Result<(), DbError> {
        Ok(())
    }

    async fn recent_predictions(&self, _window_hours: u32) -> Result<Vec<PostRow>, DbError> {
        Ok(self.recent.clone())
    }

    async fn agents(&self) -> Result<Vec<AgentWithAccounts>, DbError> {
        Ok(self.agents.clone())
    }

    async fn save_combined(
        &self,
        agent_id: i64,
        prediction: &CombinedPrediction,
        supporting: &[AccountRef],
    ) -> Result<i64, DbError> {
        let mut combined = self.combined.lock().unwrap();
        combined.push((agent_id, prediction.clone(), supporting.to_vec()));
        Ok(combined.len() as i64)
    }

    async fn prune_combined(&self, _cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        self.prune_calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

struct CannedModel {
    answer: String,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for CannedModel {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn complete(&self, _request: ChatRequest<'_>) -> Result<AssistantMessage, AnalystError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AssistantMessage {
            content: Some(self.answer.clone()),
            tool_calls: vec![],
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn post(id: &str, handle: Option<&str>, text: &str, created_at: &str) -> FetchedPost {
    FetchedPost {
        id: id.to_string(),
        author_id: "123".to_string(),
        author_handle: handle.map(str::to_string),
        text: text.to_string(),
        created_at: Some(created_at.to_string()),
        media_urls: vec![],
    }
}

fn config(batch_size: usize) -> IngestConfig {
    IngestConfig {
        batch_size,
        batch_cooldown: Duration::from_secs(900),
        max_posts: 5,
    }
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn ingestion(
    social: &Arc<FakeSocial>,
    analyzer: &Arc<FakeAnalyzer>,
    store: &Arc<MemoryStore>,
    config: IngestConfig,
) -> IngestionLoop {
    IngestionLoop::new(social.clone(), analyzer.clone(), store.clone(), config)
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn second_pass_over_the_same_post_reports_exists() {
    let social = Arc::new(FakeSocial {
        timelines: HashMap::from([(
            "123".to_string(),
            vec![post(
                "987",
                Some("alice"),
                "$BTC to 120k by Friday",
                "2024-01-01T00:00:00Z",
            )],
        )]),
        ..FakeSocial::default()
    });
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["123"]),
        ..MemoryStore::default()
    });
    let job = ingestion(&social, &analyzer, &store, config(10));

    let first = job.run_once().await.expect("first pass");
    assert_eq!(first.created, 1);

    let stored = store.stored();
    assert_eq!(stored.len(), 1);
    let (handle, saved, extraction) = &stored[0];
    assert_eq!(handle, "alice");
    assert_eq!(saved.id, "987");
    assert!(extraction.is_prediction);
    assert_eq!(extraction.token.as_deref(), Some("BTC"));
    assert_eq!(extraction.predicted_price, Some(120_000.0));
    assert_eq!(extraction.timeframe.as_deref(), Some("by Friday"));

    let second = job.run_once().await.expect("second pass");
    assert_eq!(second.created, 0);
    assert_eq!(second.existing, 1);
    assert_eq!(store.stored().len(), 1);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn only_the_newest_post_is_analysed() {
    let social = Arc::new(FakeSocial {
        timelines: HashMap::from([(
            "123".to_string(),
            vec![
                post("1", Some("alice"), "older", "2024-01-01T00:00:00Z"),
                post("3", Some("alice"), "$BTC newest", "2024-01-03 09:00:00"),
                post("2", Some("alice"), "middle", "2024-01-02T00:00:00Z"),
            ],
        )]),
        ..FakeSocial::default()
    });
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["123"]),
        ..MemoryStore::default()
    });

    ingestion(&social, &analyzer, &store, config(10))
        .run_once()
        .await
        .expect("pass");

    let stored = store.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].1.id, "3");
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_account_ids_are_skipped() {
    let social = Arc::new(FakeSocial::default());
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["abc", "", "123"]),
        ..MemoryStore::default()
    });

    let summary = ingestion(&social, &analyzer, &store, config(10))
        .run_once()
        .await
        .expect("pass");

    assert_eq!(social.call_ids(), vec!["123".to_string()]);
    assert_eq!(
        summary,
        IngestSummary {
            accounts: 1,
            invalid_ids: 2,
            without_posts: 1,
            ..IngestSummary::default()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn one_failing_account_does_not_stop_the_pass() {
    let social = Arc::new(FakeSocial {
        timelines: HashMap::from([
            (
                "111".to_string(),
                vec![post("1", Some("boomer"), "boom", "2024-01-01T00:00:00Z")],
            ),
            (
                "222".to_string(),
                vec![post("2", Some("bob"), "$BTC up", "2024-01-01T00:00:00Z")],
            ),
            (
                "333".to_string(),
                vec![post("3", Some("carol"), "$BTC down", "2024-01-01T00:00:00Z")],
            ),
        ]),
        ..FakeSocial::default()
    });
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["111", "222", "333"]),
        fail_saves_for: Some("bob".to_string()),
        ..MemoryStore::default()
    });

    let summary = ingestion(&social, &analyzer, &store, config(10))
        .run_once()
        .await
        .expect("pass");

    assert_eq!(summary.accounts, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.created, 1);
    let stored = store.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, "carol");
}

#[tokio::test(start_paused = true)]
async fn missing_author_handle_falls_back_to_the_stored_account() {
    let social = Arc::new(FakeSocial {
        timelines: HashMap::from([(
            "123".to_string(),
            vec![post("987", None, "$BTC to 120k", "2024-01-01T00:00:00Z")],
        )]),
        ..FakeSocial::default()
    });
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["123"]),
        handles: HashMap::from([("123".to_string(), "alice".to_string())]),
        ..MemoryStore::default()
    });

    ingestion(&social, &analyzer, &store, config(10))
        .run_once()
        .await
        .expect("pass");

    assert_eq!(store.stored()[0].0, "alice");
}

#[tokio::test(start_paused = true)]
async fn exhausted_rate_limit_pauses_until_reset() {
    let social = Arc::new(FakeSocial {
        exhausted_for_secs: Some(60),
        ..FakeSocial::default()
    });
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["111", "222"]),
        ..MemoryStore::default()
    });

    ingestion(&social, &analyzer, &store, config(10))
        .run_once()
        .await
        .expect("pass");

    let times = social.call_times();
    assert_eq!(times.len(), 2);
    let gap = times[1] - times[0];
    assert!(
        gap >= Duration::from_secs(59) && gap <= Duration::from_secs(61),
        "expected roughly a 60s pause, got {gap:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn batches_are_separated_by_the_cooldown() {
    let social = Arc::new(FakeSocial::default());
    let analyzer = Arc::new(FakeAnalyzer::default());
    let store = Arc::new(MemoryStore {
        account_ids: ids(&["111", "222", "333"]),
        ..MemoryStore::default()
    });

    let started = Instant::now();
    ingestion(&social, &analyzer, &store, config(2))
        .run_once()
        .await
        .expect("pass");

    let times = social.call_times();
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] < Duration::from_secs(1));
    assert!(times[2] - times[1] >= Duration::from_secs(900));
    // no cool-down after the last batch
    assert!(started.elapsed() < Duration::from_secs(901));
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn agent(id: i64, name: &str, accounts: &[(&str, f64)]) -> AgentWithAccounts {
    AgentWithAccounts {
        agent: AgentRow {
            id,
            user_id: 1,
            wallet_address: "0xabc".to_string(),
            name: name.to_string(),
            categories: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        accounts: accounts
            .iter()
            .map(|(username, influence)| AccountRef {
                username: (*username).to_string(),
                influence: *influence,
            })
            .collect(),
    }
}

fn prediction_row(handle: &str, post_id: &str) -> PostRow {
    PostRow {
        id: 1,
        account_handle: handle.to_string(),
        post_id: post_id.to_string(),
        text: "$BTC to 120k".to_string(),
        media_urls: vec![],
        created_at: Utc::now(),
        extraction: Some(serde_json::json!({
            "is_prediction": true,
            "token": "BTC",
            "predicted_price": 120000,
            "direction": "up",
            "reason": "explicit target"
        })),
        is_prediction: true,
        stored_at: Utc::now(),
    }
}

fn canned(answer: serde_json::Value) -> Arc<CannedModel> {
    Arc::new(CannedModel {
        answer: answer.to_string(),
        calls: AtomicUsize::new(0),
    })
}

fn retention() -> AggregateConfig {
    AggregateConfig {
        window_hours: 24,
        retention_days: 30,
    }
}

#[tokio::test]
async fn aggregation_stores_validated_predictions_with_supporting_weights() {
    let model = canned(serde_json::json!({
        "predictions": [
            {
                "agent_id": 7,
                "token": "BTC",
                "predicted_price": 118000,
                "currency": "USD",
                "direction": "up",
                "confidence": 0.8,
                "reasoning": "two heavy accounts agree",
                "supporting_influencers": ["alice", "bob", "mallory"]
            },
            {"agent_id": 7, "token": "ETH", "confidence": 3.0}
        ]
    }));
    let store = Arc::new(MemoryStore {
        recent: vec![prediction_row("alice", "1"), prediction_row("bob", "2")],
        agents: vec![
            agent(7, "alpha", &[("alice", 80.0), ("bob", 40.0), ("carol", 10.0)]),
            agent(8, "idle", &[("dave", 50.0)]),
        ],
        ..MemoryStore::default()
    });
    let job = AggregationJob::new(store.clone(), Aggregator::new(model.clone()), retention());

    let summary = job.run_once().await.expect("run");

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.agents, 1);
    assert_eq!(summary.stored, 1);

    let combined = store.combined.lock().unwrap().clone();
    assert_eq!(combined.len(), 1);
    let (agent_id, prediction, supporting) = &combined[0];
    assert_eq!(*agent_id, 7);
    assert_eq!(prediction.token, "BTC");
    let names: Vec<&str> = supporting.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(store.prune_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_window_skips_the_model_but_still_prunes() {
    let model = canned(serde_json::json!({"predictions": []}));
    let store = Arc::new(MemoryStore {
        agents: vec![agent(7, "alpha", &[("alice", 80.0)])],
        ..MemoryStore::default()
    });
    let job = AggregationJob::new(store.clone(), Aggregator::new(model.clone()), retention());

    let summary = job.run_once().await.expect("run");

    assert_eq!(summary.posts, 0);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.prune_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_model_answer_stores_nothing() {
    let model = Arc::new(CannedModel {
        answer: "I think BTC goes up".to_string(),
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryStore {
        recent: vec![prediction_row("alice", "1")],
        agents: vec![agent(7, "alpha", &[("alice", 80.0)])],
        ..MemoryStore::default()
    });
    let job = AggregationJob::new(store.clone(), Aggregator::new(model), retention());

    let err = job.run_once().await.expect_err("should fail");
    assert!(matches!(
        err,
        callsheet_ingest::IngestError::Analyst(AnalystError::Deserialize { .. })
    ));
    assert!(store.combined.lock().unwrap().is_empty());
}
