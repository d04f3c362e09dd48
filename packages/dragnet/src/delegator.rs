//! Delegation of scrape jobs to their tools.
//!
//! The delegator owns two lookup maps: `pending` holds payloads registered
//! for scheduled delivery, `running` holds jobs mid-delegation. A job id
//! sits in `running` for exactly the span of its `delegate` call, which is
//! what keeps a slow run and an eager trigger from starting the same job
//! twice. Delegation never fails its caller: tool errors and exhausted
//! persistence retries are logged and swallowed here.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::retry::{retry_fixed, RetryPolicy};
use crate::scheduler::{task_fn, TaskFn};
use crate::types::{
    DelegationPayload, ExecutionPayload, ExecutionSchedule, TargetResult, Tool, ToolWithResults,
};

/// Runs one tool and reports per-target results.
///
/// The crawl orchestrator is the production implementation; the seam keeps
/// tool execution swappable and the sequencing testable.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &Tool) -> anyhow::Result<Vec<TargetResult>>;
}

/// Writes finished executions to wherever the host keeps them.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_execution(&self, execution: &ExecutionPayload) -> anyhow::Result<()>;
}

/// Hands jobs to their tools, one tool at a time, and persists the results.
pub struct Delegator {
    running: RwLock<HashMap<String, DelegationPayload>>,
    pending: RwLock<HashMap<String, DelegationPayload>>,
    executor: Arc<dyn ToolExecutor>,
    store: Arc<dyn ResultStore>,
    retry: RetryPolicy,
}

impl Delegator {
    pub fn new(executor: Arc<dyn ToolExecutor>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            running: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            executor,
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the persistence retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Store a payload for later scheduled delivery, replacing any payload
    /// already registered under the job id.
    pub async fn register(&self, payload: DelegationPayload) {
        debug!(job_id = %payload.job_id, name = %payload.name, "job registered for scheduled delegation");
        self.pending
            .write()
            .await
            .insert(payload.job_id.clone(), payload);
    }

    /// Delegate a job previously handed to `register`. Fired by triggers,
    /// so an unknown id only logs.
    pub async fn delegate_scheduled(&self, job_id: &str) {
        let payload = self.pending.read().await.get(job_id).cloned();
        match payload {
            Some(payload) => self.delegate(payload).await,
            None => warn!(job_id = %job_id, "trigger fired for a job with no registered payload"),
        }
    }

    /// Run every tool of the job in order and persist the outcome.
    ///
    /// Never returns an error: a job already running is skipped, a failing
    /// tool aborts the rest and is logged. The id leaves both maps on the
    /// way out whatever happened in between.
    pub async fn delegate(&self, payload: DelegationPayload) {
        let job_id = payload.job_id.clone();

        {
            let mut running = self.running.write().await;
            if running.contains_key(&job_id) {
                warn!(job_id = %job_id, "job is already running, skipping this delegation");
                return;
            }
            running.insert(job_id.clone(), payload.clone());
        }
        info!(job_id = %job_id, name = %payload.name, tools = payload.tools.len(), "delegating job");

        if let Err(e) = self.run_tools(&payload).await {
            error!(job_id = %job_id, error = %e, "job delegation failed");
        }

        // Cleanup
        self.running.write().await.remove(&job_id);
        self.pending.write().await.remove(&job_id);
        debug!(job_id = %job_id, "job bookkeeping cleared");
    }

    /// Whether a delegation for this job is in flight right now.
    pub async fn is_running(&self, job_id: &str) -> bool {
        self.running.read().await.contains_key(job_id)
    }

    /// Ids of all in-flight delegations.
    pub async fn running_ids(&self) -> Vec<String> {
        self.running.read().await.keys().cloned().collect()
    }

    /// Whether a payload is registered and waiting for its trigger.
    pub async fn is_pending(&self, job_id: &str) -> bool {
        self.pending.read().await.contains_key(job_id)
    }

    /// The task a scheduler trigger runs for this job.
    pub fn scheduled_task(self: &Arc<Self>, job_id: impl Into<String>) -> TaskFn {
        let delegator = self.clone();
        let job_id = job_id.into();
        task_fn(move || {
            let delegator = delegator.clone();
            let job_id = job_id.clone();
            async move {
                delegator.delegate_scheduled(&job_id).await;
            }
        })
    }

    async fn run_tools(&self, payload: &DelegationPayload) -> anyhow::Result<()> {
        let delegated_at = Utc::now();
        let mut tools = Vec::with_capacity(payload.tools.len());

        // Tools run one at a time; each must finish before the next starts.
        for tool in &payload.tools {
            debug!(job_id = %payload.job_id, tool = %tool.kind, "executing tool");
            let targets = self
                .executor
                .execute(tool)
                .await
                .with_context(|| format!("executing tool '{}'", tool.kind))?;
            tools.push(ToolWithResults::new(tool, targets));
        }

        let execution = ExecutionPayload {
            job_id: payload.job_id.clone(),
            schedule: ExecutionSchedule {
                kind: payload.schedule_type,
                delegated_at,
                finished_at: Utc::now(),
            },
            tools,
        };
        self.persist_result(&execution).await;
        Ok(())
    }

    /// Save with fixed-interval retries; exhaustion is logged, never raised.
    async fn persist_result(&self, execution: &ExecutionPayload) {
        let outcome = retry_fixed(self.retry, "save_execution", || async move {
            self.store.save_execution(execution).await
        })
        .await;

        match outcome {
            Ok(()) => {
                info!(job_id = %execution.job_id, records = execution.record_count(), "execution result persisted")
            }
            Err(e) => {
                error!(job_id = %execution.job_id, error = %e, "giving up on persisting execution result")
            }
        }
    }
}
