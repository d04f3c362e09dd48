//! Cron-driven scrape job scheduling, delegation, and crawl orchestration.
//!
//! Three pieces, wired together by the host application:
//!
//! - [`CronScheduler`] turns a job's recurrence into timers and cron
//!   triggers, and answers next/previous-run queries.
//! - [`Delegator`] takes a fired job, runs its tools strictly one at a
//!   time, and persists the collected results with retries.
//! - [`CrawlOrchestrator`] runs one tool's targets through a bounded
//!   request pool, tracking pagination per target and handing each
//!   target's results over exactly once.
//!
//! The host supplies the outer edges: [`Target`] implementations for the
//! sites it crawls, a [`ResultStore`] for finished executions, and the API
//! surface that turns user edits into [`ScheduleRequest`]s.

pub mod crawl;
pub mod delegator;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod testing;
pub mod types;

pub use crawl::request::{CrawlRequest, PageRequest, RequestKind};
pub use crawl::{CrawlConfig, CrawlOrchestrator, Target, TargetOutcome, TargetRegistry};
pub use delegator::{Delegator, ResultStore, ToolExecutor};
pub use error::{RequestValidationError, SchedulerError, SchedulerResult};
pub use retry::{retry_fixed, RetryPolicy};
pub use scheduler::{
    task_fn, CronJobInfo, CronRunner, CronScheduler, RunBounds, RunWindow, ScheduleRequest, TaskFn,
    TriggerRunner, TriggerState,
};
pub use types::{
    DelegationPayload, ExecutionPayload, ExecutionSchedule, RequestOutcome, ScheduleType,
    TargetResult, Tool, ToolTarget, ToolWithResults,
};
