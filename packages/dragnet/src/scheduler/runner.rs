//! Trigger runner abstraction over tokio-cron-scheduler.
//!
//! The scheduler manipulates cron triggers through this trait so tests can
//! observe trigger lifecycles without spinning up the real cron engine.

use async_trait::async_trait;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::error::{SchedulerError, SchedulerResult};
use crate::scheduler::TaskFn;

/// Creates and removes cron triggers.
#[async_trait]
pub trait TriggerRunner: Send + Sync {
    /// Add a trigger invoking `task` on every match of `expression`.
    async fn add(&self, expression: &str, task: TaskFn) -> SchedulerResult<Uuid>;

    /// Remove a trigger by its guid.
    async fn remove(&self, trigger_id: &Uuid) -> SchedulerResult<()>;

    /// Stop the underlying engine.
    async fn shutdown(&self) -> SchedulerResult<()>;
}

/// Production trigger runner backed by `tokio_cron_scheduler::JobScheduler`.
pub struct CronRunner {
    scheduler: JobScheduler,
}

impl CronRunner {
    /// Create and start the cron engine.
    pub async fn new() -> SchedulerResult<Self> {
        let scheduler = JobScheduler::new().await.map_err(trigger_error)?;
        scheduler.start().await.map_err(trigger_error)?;
        Ok(Self { scheduler })
    }
}

#[async_trait]
impl TriggerRunner for CronRunner {
    async fn add(&self, expression: &str, task: TaskFn) -> SchedulerResult<Uuid> {
        let job = Job::new_async(expression, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })
        .map_err(trigger_error)?;

        self.scheduler.add(job).await.map_err(trigger_error)
    }

    async fn remove(&self, trigger_id: &Uuid) -> SchedulerResult<()> {
        self.scheduler
            .remove(trigger_id)
            .await
            .map_err(trigger_error)
    }

    async fn shutdown(&self) -> SchedulerResult<()> {
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await.map_err(trigger_error)
    }
}

fn trigger_error(e: JobSchedulerError) -> SchedulerError {
    SchedulerError::Trigger(Box::new(e))
}
