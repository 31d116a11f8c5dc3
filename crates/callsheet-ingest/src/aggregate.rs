//! Periodic merge of recent predictions into per-agent combined forecasts.

use std::collections::HashMap;
use std::sync::Arc;

use callsheet_analyst::{AgentDigest, Aggregator, DigestEntry};
use callsheet_core::{AccountRef, AppConfig};
use callsheet_db::{AgentWithAccounts, PostRow};
use chrono::{Duration, Utc};

use crate::error::IngestError;
use crate::store::PostStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateConfig {
    pub window_hours: u32,
    pub retention_days: u32,
}

impl AggregateConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            window_hours: config.aggregate_window_hours,
            retention_days: config.combined_retention_days,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSummary {
    pub posts: usize,
    pub agents: usize,
    pub stored: usize,
    pub pruned: u64,
}

pub struct AggregationJob {
    store: Arc<dyn PostStore>,
    aggregator: Aggregator,
    config: AggregateConfig,
}

impl AggregationJob {
    #[must_use]
    pub fn new(store: Arc<dyn PostStore>, aggregator: Aggregator, config: AggregateConfig) -> Self {
        Self {
            store,
            aggregator,
            config,
        }
    }

    /// Combine the trailing window's predictions and store the results,
    /// then prune combined predictions past the retention window.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the window or the agents cannot be read, or
    /// the model call fails. Nothing is stored in that case. A failed insert
    /// of one combined prediction is logged and skipped.
    pub async fn run_once(&self) -> Result<AggregateSummary, IngestError> {
        let mut summary = self.combine_window().await?;
        summary.pruned = self.prune().await;

        tracing::info!(
            posts = summary.posts,
            agents = summary.agents,
            stored = summary.stored,
            pruned = summary.pruned,
            "aggregate: run complete"
        );
        Ok(summary)
    }

    async fn combine_window(&self) -> Result<AggregateSummary, IngestError> {
        let mut summary = AggregateSummary::default();

        let posts = self
            .store
            .recent_predictions(self.config.window_hours)
            .await?;
        summary.posts = posts.len();
        if posts.is_empty() {
            tracing::info!(
                window_hours = self.config.window_hours,
                "aggregate: no predictions in window"
            );
            return Ok(summary);
        }

        let agents = self.store.agents().await?;
        let digests = build_digests(&agents, &posts);
        summary.agents = digests.len();
        if digests.is_empty() {
            tracing::info!("aggregate: no agent tracks an account with recent predictions");
            return Ok(summary);
        }

        let combined = self.aggregator.combine(&digests).await?;
        let agents_by_id: HashMap<i64, &AgentWithAccounts> =
            agents.iter().map(|a| (a.agent.id, a)).collect();

        for prediction in &combined {
            let Some(agent) = agents_by_id.get(&prediction.agent_id) else {
                continue;
            };
            let supporting: Vec<AccountRef> = agent
                .accounts
                .iter()
                .filter(|a| prediction.supporting_influencers.contains(&a.username))
                .cloned()
                .collect();

            match self
                .store
                .save_combined(agent.agent.id, prediction, &supporting)
                .await
            {
                Ok(id) => {
                    summary.stored += 1;
                    tracing::debug!(
                        id,
                        agent_id = agent.agent.id,
                        token = %prediction.token,
                        "aggregate: combined prediction stored"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        agent_id = agent.agent.id,
                        token = %prediction.token,
                        error = %e,
                        "aggregate: failed to store combined prediction"
                    );
                }
            }
        }

        Ok(summary)
    }

    async fn prune(&self) -> u64 {
        let cutoff = Utc::now() - Duration::days(i64::from(self.config.retention_days));
        match self.store.prune_combined(cutoff).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "aggregate: failed to prune old combined predictions");
                0
            }
        }
    }
}

/// Group recent prediction posts under every agent tracking their account.
///
/// Agents without any such post are left out.
fn build_digests(agents: &[AgentWithAccounts], posts: &[PostRow]) -> Vec<AgentDigest> {
    let mut by_handle: HashMap<&str, Vec<&PostRow>> = HashMap::new();
    for post in posts {
        by_handle
            .entry(post.account_handle.as_str())
            .or_default()
            .push(post);
    }

    agents
        .iter()
        .filter_map(|agent| {
            let predictions: Vec<DigestEntry> = agent
                .accounts
                .iter()
                .flat_map(|account| {
                    by_handle
                        .get(account.username.as_str())
                        .into_iter()
                        .flatten()
                        .filter_map(|row| {
                            let prediction =
                                row.extraction_result().filter(|r| r.is_prediction)?;
                            Some(DigestEntry {
                                username: account.username.clone(),
                                post_id: row.post_id.clone(),
                                created_at: row.created_at.to_rfc3339(),
                                prediction,
                            })
                        })
                })
                .collect();

            (!predictions.is_empty()).then(|| AgentDigest {
                agent_id: agent.agent.id,
                agent_name: agent.agent.name.clone(),
                accounts: agent.accounts.clone(),
                predictions,
            })
        })
        .collect()
}
