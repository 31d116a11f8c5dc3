//! Command handlers. Each builds only the clients its command needs.

use callsheet_core::AppConfig;
use callsheet_ingest::Pipeline;
use callsheet_quotes::{PriceLookup, QuoteSource};
use sqlx::PgPool;

/// One ingestion pass, then a one-line summary.
///
/// # Errors
///
/// Returns an error if the clients cannot be built or tracked accounts
/// cannot be loaded.
pub(crate) async fn run_ingest(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(pool, config)?;
    let summary = pipeline.ingestion.run_once().await?;
    println!(
        "accounts: {}  new: {}  existing: {}  no posts: {}  failed: {}  invalid ids: {}",
        summary.accounts,
        summary.created,
        summary.existing,
        summary.without_posts,
        summary.failed,
        summary.invalid_ids
    );
    Ok(())
}

/// One aggregation run over the configured window.
///
/// # Errors
///
/// Returns an error if the clients cannot be built, the window cannot be
/// read, or the model answer is unusable.
pub(crate) async fn run_aggregate(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(pool, config)?;
    let summary = pipeline.aggregation.run_once().await?;
    println!(
        "posts: {}  agents: {}  stored: {}  pruned: {}",
        summary.posts, summary.agents, summary.stored, summary.pruned
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if the database or the social provider fails.
pub(crate) async fn run_lookup(
    pool: PgPool,
    config: &AppConfig,
    handle: &str,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(pool.clone(), config)?;
    match callsheet_ingest::search_account(&pool, &pipeline.social, handle).await? {
        Some(account) => println!("{}", serde_json::to_string_pretty(&account)?),
        None => println!("no account found for '{handle}'"),
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if a provider client cannot be built.
pub(crate) async fn run_price(symbol: &str, timeout_secs: u64) -> anyhow::Result<()> {
    let quotes = QuoteSource::with_default_providers(timeout_secs)?;
    match quotes.fetch_price(symbol).await {
        Some(price) => println!("{}: {price} USD", symbol.trim().to_uppercase()),
        None => println!("no quote available for '{symbol}'"),
    }
    Ok(())
}
