//! Cron-backed job scheduling.
//!
//! Jobs are described by a recurrence (`once` through `yearly`) anchored at
//! a start date. Scheduling a job arms up to two timers and one trigger:
//!
//! ```text
//! schedule(request)
//!     │
//!     ├─► start timer (start_at - now)
//!     │       ├─► add cron trigger        recurring kinds only
//!     │       └─► spawn task once         once: entry removed here
//!     │
//!     └─► stop timer (end_at - now)
//!             └─► remove cron trigger     entry kept, state Stopped
//! ```
//!
//! `schedule` is idempotent per job id: re-scheduling destroys the previous
//! timers and trigger before arming replacements. Timer tasks re-check
//! their cancellation token under the jobs lock, so a concurrent `stop` or
//! `delete` can never resurrect a trigger.

pub mod expression;
mod runner;

pub use expression::{recurrence_expression, run_bounds, RunBounds, RunWindow};
pub use runner::{CronRunner, TriggerRunner};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::{SchedulerError, SchedulerResult};
use crate::types::ScheduleType;

/// The work a job runs when it fires.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into the boxed task type.
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || {
        let fut: BoxFuture<'static, ()> = Box::pin(f());
        fut
    })
}

/// Everything needed to schedule one job.
#[derive(Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ScheduleRequest {
    pub id: String,
    pub name: String,
    pub kind: ScheduleType,
    /// First fire; also the anchor for the recurrence expression.
    pub start_at: DateTime<Utc>,
    /// When set, the trigger is stopped at this instant.
    #[builder(default)]
    pub end_at: Option<DateTime<Utc>>,
    /// Reference instant for timer delays. Callers pass `Utc::now()`
    /// outside tests.
    pub now: DateTime<Utc>,
    pub task: TaskFn,
}

impl ScheduleRequest {
    /// A job that fires once at `start_at`.
    pub fn once(
        id: impl Into<String>,
        name: impl Into<String>,
        start_at: DateTime<Utc>,
        task: TaskFn,
    ) -> Self {
        Self::builder()
            .id(id)
            .name(name)
            .kind(ScheduleType::Once)
            .start_at(start_at)
            .now(Utc::now())
            .task(task)
            .build()
    }

    /// A job firing on a recurrence anchored at `start_at`.
    pub fn recurring(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ScheduleType,
        start_at: DateTime<Utc>,
        task: TaskFn,
    ) -> Self {
        Self::builder()
            .id(id)
            .name(name)
            .kind(kind)
            .start_at(start_at)
            .now(Utc::now())
            .task(task)
            .build()
    }
}

/// Lifecycle of a scheduled job's trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Start timer armed, trigger not yet created.
    PendingStart,
    /// Trigger live in the cron engine.
    Active,
    /// Trigger removed (stop timer or explicit stop); entry retained.
    Stopped,
}

/// Read-only view of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronJobInfo {
    pub id: String,
    pub name: String,
    pub kind: ScheduleType,
    pub expression: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub state: TriggerState,
}

struct CronJob {
    name: String,
    kind: ScheduleType,
    expression: Option<String>,
    start_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
    state: TriggerState,
    trigger: Option<Uuid>,
    /// Cancels both timers of this entry.
    timers: CancellationToken,
}

/// Schedules jobs onto cron triggers and one-shot timers.
///
/// One scheduler per process; shared behind an `Arc` by whatever layer
/// accepts job edits.
pub struct CronScheduler {
    jobs: Arc<RwLock<HashMap<String, CronJob>>>,
    runner: Arc<dyn TriggerRunner>,
    shutdown_token: CancellationToken,
}

impl CronScheduler {
    /// Create a scheduler on the production cron engine.
    pub async fn new() -> SchedulerResult<Self> {
        Ok(Self::with_runner(Arc::new(CronRunner::new().await?)))
    }

    /// Create a scheduler on a caller-supplied trigger runner.
    pub fn with_runner(runner: Arc<dyn TriggerRunner>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            runner,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Schedule a job, replacing any previous schedule under the same id.
    pub async fn schedule(&self, request: ScheduleRequest) -> SchedulerResult<()> {
        let ScheduleRequest {
            id,
            name,
            kind,
            start_at,
            end_at,
            now,
            task,
        } = request;

        if let Some(end) = end_at {
            if end < start_at {
                warn!(job_id = %id, start_at = %start_at, end_at = %end, "job ends before it starts");
            }
        }

        // Re-scheduling destroys the previous timers and trigger first.
        let previous = self.jobs.write().await.remove(&id);
        if let Some(previous) = previous {
            debug!(job_id = %id, "replacing existing schedule");
            self.release(&id, previous).await;
        }

        let expression = recurrence_expression(kind, start_at);
        let timers = self.shutdown_token.child_token();

        let entry = CronJob {
            name: name.clone(),
            kind,
            expression: expression.clone(),
            start_at,
            end_at,
            state: TriggerState::PendingStart,
            trigger: None,
            timers: timers.clone(),
        };
        self.jobs.write().await.insert(id.clone(), entry);

        self.arm_start_timer(id.clone(), kind, expression, start_at, now, task, timers.clone());
        if let Some(end) = end_at {
            self.arm_stop_timer(id.clone(), end, now, timers);
        }

        info!(job_id = %id, name = %name, kind = %kind, start_at = %start_at, "job scheduled");
        Ok(())
    }

    /// Stop a job's trigger, keeping the entry for a later `schedule`.
    pub async fn stop(&self, id: &str) -> SchedulerResult<()> {
        let trigger = {
            let mut jobs = self.jobs.write().await;
            let entry = jobs.get_mut(id).ok_or_else(|| SchedulerError::JobNotFound {
                id: id.to_string(),
            })?;
            entry.timers.cancel();
            entry.state = TriggerState::Stopped;
            entry.trigger.take()
        };

        self.remove_trigger(id, trigger).await;
        info!(job_id = %id, "job stopped");
        Ok(())
    }

    /// Delete a job outright: timers, trigger, and entry.
    pub async fn delete(&self, id: &str) -> SchedulerResult<()> {
        let entry = self
            .jobs
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SchedulerError::JobNotFound {
                id: id.to_string(),
            })?;

        self.release(id, entry).await;
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    /// Snapshot of every scheduled job.
    pub async fn jobs(&self) -> Vec<CronJobInfo> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|(id, entry)| CronJobInfo {
                id: id.clone(),
                name: entry.name.clone(),
                kind: entry.kind,
                expression: entry.expression.clone(),
                start_at: entry.start_at,
                end_at: entry.end_at,
                state: entry.state,
            })
            .collect()
    }

    /// Next and previous fire times for a job, bounded by its start and end
    /// dates. Unknown ids and `once` jobs yield empty bounds; this query
    /// never fails.
    pub async fn next_and_previous_run(&self, id: &str) -> RunBounds {
        self.run_bounds_at(id, Utc::now()).await
    }

    async fn run_bounds_at(&self, id: &str, now: DateTime<Utc>) -> RunBounds {
        let jobs = self.jobs.read().await;
        let entry = match jobs.get(id) {
            Some(entry) => entry,
            None => {
                debug!(job_id = %id, "run bounds queried for unknown job");
                return RunBounds::default();
            }
        };
        let expression = match &entry.expression {
            Some(expression) => expression,
            None => return RunBounds::default(),
        };

        run_bounds(
            expression,
            RunWindow {
                now,
                start: entry.start_at,
                end: entry.end_at,
            },
        )
    }

    /// Stop every job and shut the trigger engine down.
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        self.shutdown_token.cancel();

        let entries: Vec<(String, CronJob)> = self.jobs.write().await.drain().collect();
        for (id, entry) in entries {
            self.release(&id, entry).await;
        }

        info!("scheduler shut down");
        self.runner.shutdown().await
    }

    /// Cancel timers and remove the live trigger of a detached entry.
    async fn release(&self, id: &str, entry: CronJob) {
        entry.timers.cancel();
        self.remove_trigger(id, entry.trigger).await;
    }

    async fn remove_trigger(&self, id: &str, trigger: Option<Uuid>) {
        if let Some(trigger) = trigger {
            if let Err(e) = self.runner.remove(&trigger).await {
                warn!(job_id = %id, trigger_id = %trigger, error = %e, "failed to remove trigger");
            }
        }
    }

    fn arm_start_timer(
        &self,
        id: String,
        kind: ScheduleType,
        expression: Option<String>,
        start_at: DateTime<Utc>,
        now: DateTime<Utc>,
        task: TaskFn,
        token: CancellationToken,
    ) {
        let jobs = self.jobs.clone();
        let runner = self.runner.clone();
        let delay = delay_until(start_at, now);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            // Create the trigger before touching the map; the runner call
            // must not run under the lock.
            let trigger = match &expression {
                Some(expr) => match runner.add(expr, task.clone()).await {
                    Ok(trigger) => Some(trigger),
                    Err(e) => {
                        error!(job_id = %id, expression = %expr, error = %e, "failed to add trigger");
                        None
                    }
                },
                None => None,
            };

            let entry_gone = {
                let mut jobs = jobs.write().await;
                // `stop` and `delete` cancel this token while holding the
                // lock, so a cancelled token here means the entry must not
                // be touched again.
                if token.is_cancelled() || !jobs.contains_key(&id) {
                    true
                } else {
                    if kind == ScheduleType::Once {
                        jobs.remove(&id);
                    } else if let Some(entry) = jobs.get_mut(&id) {
                        entry.trigger = trigger;
                        entry.state = if expression.is_some() && trigger.is_none() {
                            // Trigger creation failed; leave the entry
                            // stopped so a re-schedule can revive it.
                            TriggerState::Stopped
                        } else {
                            TriggerState::Active
                        };
                    }
                    false
                }
            };

            if entry_gone {
                if let Some(trigger) = trigger {
                    if let Err(e) = runner.remove(&trigger).await {
                        warn!(job_id = %id, trigger_id = %trigger, error = %e, "failed to remove orphaned trigger");
                    }
                }
                return;
            }

            debug!(job_id = %id, "start timer fired");
            tokio::spawn(task());
        });
    }

    fn arm_stop_timer(
        &self,
        id: String,
        end_at: DateTime<Utc>,
        now: DateTime<Utc>,
        token: CancellationToken,
    ) {
        let jobs = self.jobs.clone();
        let runner = self.runner.clone();
        let delay = delay_until(end_at, now);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let trigger = {
                let mut jobs = jobs.write().await;
                if token.is_cancelled() {
                    return;
                }
                match jobs.get_mut(&id) {
                    Some(entry) => {
                        entry.state = TriggerState::Stopped;
                        entry.trigger.take()
                    }
                    None => return,
                }
            };

            info!(job_id = %id, end_at = %end_at, "job reached its end date");
            if let Some(trigger) = trigger {
                if let Err(e) = runner.remove(&trigger).await {
                    warn!(job_id = %id, trigger_id = %trigger, error = %e, "failed to remove trigger at end date");
                }
            }
        });
    }
}

/// Timer delay from `now` to `at`, clamped at zero for past instants.
fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}
