//! The two recurring pipeline jobs.

use std::sync::Arc;
use std::time::Duration;

use callsheet_core::AppConfig;
use callsheet_ingest::{AggregationJob, IngestionLoop};

use super::{JobDefinition, JobFuture};

pub const INGEST_JOB: &str = "ingest";
pub const AGGREGATE_JOB: &str = "aggregate";

/// Both job definitions, shared by the scheduler and the trigger endpoints.
#[derive(Debug, Clone)]
pub struct PipelineJobs {
    pub ingest: JobDefinition,
    pub aggregate: JobDefinition,
}

impl PipelineJobs {
    #[must_use]
    pub fn all(&self) -> Vec<JobDefinition> {
        vec![self.ingest.clone(), self.aggregate.clone()]
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&JobDefinition> {
        match name {
            INGEST_JOB => Some(&self.ingest),
            AGGREGATE_JOB => Some(&self.aggregate),
            _ => None,
        }
    }
}

/// Build the ingest and aggregate definitions at their configured intervals.
///
/// Failures inside a run are logged here; a run never panics the scheduler.
#[must_use]
pub fn pipeline_jobs(
    ingestion: Arc<IngestionLoop>,
    aggregation: Arc<AggregationJob>,
    config: &AppConfig,
) -> PipelineJobs {
    let ingest = JobDefinition::new(
        INGEST_JOB,
        Duration::from_secs(config.ingest_interval_secs),
        move || -> JobFuture {
            let ingestion = Arc::clone(&ingestion);
            Box::pin(async move {
                if let Err(e) = ingestion.run_once().await {
                    tracing::error!(error = %e, "scheduler: ingest pass failed");
                }
            })
        },
    );

    let aggregate = JobDefinition::new(
        AGGREGATE_JOB,
        Duration::from_secs(config.aggregate_interval_secs),
        move || -> JobFuture {
            let aggregation = Arc::clone(&aggregation);
            Box::pin(async move {
                if let Err(e) = aggregation.run_once().await {
                    tracing::error!(error = %e, "scheduler: aggregation run failed");
                }
            })
        },
    );

    PipelineJobs { ingest, aggregate }
}
