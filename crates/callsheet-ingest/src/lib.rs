//! Scheduled work: the ingestion pass and the aggregation job.
//!
//! Both are plain async operations invoked by the server scheduler, the
//! on-demand API triggers, or the CLI. Storage goes through [`PostStore`] so
//! the jobs can run against in-memory fakes.

pub mod accounts;
pub mod aggregate;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod store;

pub use accounts::search_account;
pub use aggregate::{AggregateConfig, AggregateSummary, AggregationJob};
pub use error::IngestError;
pub use ingest::{IngestConfig, IngestSummary, IngestionLoop};
pub use pipeline::Pipeline;
pub use store::{PgStore, PostStore};
