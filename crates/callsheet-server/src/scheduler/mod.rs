//! Background job scheduler.
//!
//! [`Scheduler`] is owned by `main`, built from explicit [`JobDefinition`]s
//! and started and stopped there. Every definition carries a [`JobGuard`] so
//! at most one run of a job is in flight, whether it was started by a
//! scheduler tick or by an API trigger.

mod jobs;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

pub use jobs::{pipeline_jobs, PipelineJobs};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Per-job concurrency cap of one.
#[derive(Debug, Clone, Default)]
pub struct JobGuard {
    running: Arc<Mutex<()>>,
}

impl JobGuard {
    /// A permit for one run, or `None` while another run holds it.
    fn try_start(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.running).try_lock_owned().ok()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }
}

/// A named job, how often to run it, and what to run.
#[derive(Clone)]
pub struct JobDefinition {
    pub name: &'static str,
    pub interval: Duration,
    guard: JobGuard,
    run: JobFn,
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.guard.is_running())
            .finish_non_exhaustive()
    }
}

impl JobDefinition {
    pub fn new<F>(name: &'static str, interval: Duration, run: F) -> Self
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        Self {
            name,
            interval,
            guard: JobGuard::default(),
            run: Arc::new(run),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Run to completion unless a previous run is still in flight.
    ///
    /// Returns `false` when the run was skipped.
    pub async fn run_guarded(&self) -> bool {
        let Some(_permit) = self.guard.try_start() else {
            tracing::warn!(job = self.name, "scheduler: previous run still in flight; skipping");
            return false;
        };
        tracing::info!(job = self.name, "scheduler: run started");
        (self.run)().await;
        tracing::info!(job = self.name, "scheduler: run finished");
        true
    }

    /// Start a run in the background unless one is already in flight.
    ///
    /// Returns `false` when a run is already in flight.
    pub fn trigger(&self) -> bool {
        let Some(permit) = self.guard.try_start() else {
            return false;
        };
        let name = self.name;
        let run = Arc::clone(&self.run);
        tokio::spawn(async move {
            let _permit = permit;
            tracing::info!(job = name, "scheduler: on-demand run started");
            run().await;
            tracing::info!(job = name, "scheduler: on-demand run finished");
        });
        true
    }
}

/// Owns the cron scheduler for the lifetime of the process.
pub struct Scheduler {
    definitions: Vec<JobDefinition>,
    inner: Option<JobScheduler>,
}

impl Scheduler {
    #[must_use]
    pub fn new(definitions: Vec<JobDefinition>) -> Self {
        Self {
            definitions,
            inner: None,
        }
    }

    /// Register every definition as a repeated job and start ticking.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
    /// a job cannot be registered, or the scheduler fails to start.
    pub async fn start(&mut self) -> Result<(), JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;

        for definition in &self.definitions {
            let for_job = definition.clone();
            let job = Job::new_repeated_async(definition.interval, move |_uuid, _lock| {
                let definition = for_job.clone();
                Box::pin(async move {
                    definition.run_guarded().await;
                })
            })?;
            scheduler.add(job).await?;
            tracing::info!(
                job = definition.name,
                interval_secs = definition.interval.as_secs(),
                "scheduler: registered job"
            );
        }

        scheduler.start().await?;
        self.inner = Some(scheduler);
        Ok(())
    }

    /// Stop ticking. Runs already in flight are not awaited.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if the scheduler fails to shut down.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        if let Some(mut scheduler) = self.inner.take() {
            scheduler.shutdown().await?;
            tracing::info!("scheduler: stopped");
        }
        Ok(())
    }
}
