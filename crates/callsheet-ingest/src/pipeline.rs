//! Production wiring of both jobs from an [`AppConfig`].

use std::sync::Arc;

use callsheet_analyst::{Aggregator, ChatModel, Extractor, OpenAiChat};
use callsheet_core::AppConfig;
use callsheet_quotes::QuoteSource;
use callsheet_social::XClient;
use sqlx::PgPool;

use crate::aggregate::{AggregateConfig, AggregationJob};
use crate::error::IngestError;
use crate::ingest::{IngestConfig, IngestionLoop};
use crate::store::PgStore;

/// The live clients and both jobs built on top of them.
pub struct Pipeline {
    pub social: Arc<XClient>,
    pub quotes: Arc<QuoteSource>,
    pub ingestion: Arc<IngestionLoop>,
    pub aggregation: Arc<AggregationJob>,
}

impl Pipeline {
    /// # Errors
    ///
    /// Returns [`IngestError`] if an HTTP client cannot be built or a
    /// configured base URL does not parse.
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, IngestError> {
        let social = Arc::new(
            XClient::with_base_url(
                &config.x_bearer_token,
                config.social_timeout_secs,
                &config.x_api_base_url,
            )?
            .with_rate_limit_fallback(config.rate_limit_fallback_secs),
        );
        let quotes = Arc::new(QuoteSource::with_default_providers(config.quote_timeout_secs)?);
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::with_base_url(
            &config.openai_api_key,
            &config.openai_model,
            config.llm_timeout_secs,
            &config.openai_base_url,
        )?);
        let store = Arc::new(PgStore::new(pool));

        let extractor = Arc::new(Extractor::new(Arc::clone(&model), quotes.clone()));
        let ingestion = Arc::new(IngestionLoop::new(
            social.clone(),
            extractor,
            store.clone(),
            IngestConfig::from_app_config(config),
        ));
        let aggregation = Arc::new(AggregationJob::new(
            store,
            Aggregator::new(model),
            AggregateConfig::from_app_config(config),
        ));

        tracing::info!(
            model = %config.openai_model,
            quote_providers = ?quotes.provider_names(),
            "ingest: pipeline ready"
        );

        Ok(Self {
            social,
            quotes,
            ingestion,
            aggregation,
        })
    }
}
