//! Hand-written fakes for exercising the engine without a cron runtime,
//! real targets, or a document store behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::crawl::request::{CrawlRequest, PageRequest};
use crate::crawl::{Target, TargetOutcome};
use crate::delegator::{ResultStore, ToolExecutor};
use crate::error::{SchedulerError, SchedulerResult};
use crate::scheduler::{TaskFn, TriggerRunner};
use crate::types::{ExecutionPayload, RequestOutcome, TargetResult, Tool};

/// What a [`MockTarget`] answers for one URL.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Paginate(Vec<PageRequest>),
    Record(serde_json::Value),
    Fail(String),
}

/// A scripted crawl target: responses keyed by request URL, with the seed
/// request keyed by the empty string.
pub struct MockTarget {
    name: String,
    responses: Mutex<HashMap<String, MockResponse>>,
    seen: Mutex<Vec<CrawlRequest>>,
}

impl MockTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Script the response to this target's seed request.
    pub fn on_seed(self, response: MockResponse) -> Self {
        self.on_url("", response)
    }

    /// Script the response to an extraction request for `url`.
    pub fn on_url(self, url: &str, response: MockResponse) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), response);
        self
    }

    /// Every request this target has processed, in arrival order.
    pub fn requests(&self) -> Vec<CrawlRequest> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Target for MockTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, request: &CrawlRequest) -> anyhow::Result<TargetOutcome> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let response = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request.url)
            .cloned();
        match response {
            Some(MockResponse::Paginate(pages)) => Ok(TargetOutcome::Paginate(pages)),
            Some(MockResponse::Record(value)) => Ok(TargetOutcome::Record(value)),
            Some(MockResponse::Fail(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!(
                "no scripted response for url '{}'",
                request.url
            )),
        }
    }
}

/// A trigger runner that records adds and removes and fires triggers only
/// when told to.
#[derive(Default)]
pub struct TestTriggerRunner {
    added: Mutex<Vec<(Uuid, String)>>,
    removed: Mutex<Vec<Uuid>>,
    tasks: Mutex<HashMap<Uuid, TaskFn>>,
    fail_add: AtomicBool,
}

impl TestTriggerRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `add` fail.
    pub fn set_fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    /// Every trigger ever added, with its expression.
    pub fn added(&self) -> Vec<(Uuid, String)> {
        self.added.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every trigger id ever removed.
    pub fn removed(&self) -> Vec<Uuid> {
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Triggers added and not yet removed.
    pub fn live_triggers(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run a trigger's task to completion, as the cron engine would.
    pub async fn fire(&self, trigger_id: &Uuid) {
        let task = {
            let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.get(trigger_id).cloned()
        };
        match task {
            Some(task) => task().await,
            None => warn!(trigger_id = %trigger_id, "fired a trigger that was never added"),
        }
    }
}

#[async_trait]
impl TriggerRunner for TestTriggerRunner {
    async fn add(&self, expression: &str, task: TaskFn) -> SchedulerResult<Uuid> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(SchedulerError::Trigger("injected add failure".into()));
        }
        let trigger_id = Uuid::new_v4();
        self.added
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((trigger_id, expression.to_string()));
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(trigger_id, task);
        Ok(trigger_id)
    }

    async fn remove(&self, trigger_id: &Uuid) -> SchedulerResult<()> {
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*trigger_id);
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(trigger_id);
        Ok(())
    }

    async fn shutdown(&self) -> SchedulerResult<()> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

/// A tool executor that logs start/end events instead of crawling.
///
/// Produces one ok outcome per target so persisted payloads have a shape
/// worth asserting on.
pub struct RecordingExecutor {
    events: Mutex<Vec<String>>,
    delay: Duration,
    fail_on: Option<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail_on: None,
        }
    }

    /// Hold each execution open for `delay` of (paused) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the tool with this kind instead of finishing it.
    pub fn failing_for(mut self, kind: &str) -> Self {
        self.fail_on = Some(kind.to_string());
        self
    }

    /// `start`/`end`/`fail` events in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, tool: &Tool) -> anyhow::Result<Vec<TargetResult>> {
        self.push(format!("start {}", tool.kind));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.as_deref() == Some(tool.kind.as_str()) {
            self.push(format!("fail {}", tool.kind));
            anyhow::bail!("tool '{}' exploded", tool.kind);
        }
        self.push(format!("end {}", tool.kind));

        Ok(tool
            .targets
            .iter()
            .map(|target| TargetResult {
                target_id: target.target_id.clone(),
                target_name: target.target_name.clone(),
                results: vec![RequestOutcome::ok(serde_json::json!({"tool": tool.kind}))],
            })
            .collect())
    }
}

/// An in-memory result store with scriptable failures.
#[derive(Default)]
pub struct MemoryResultStore {
    saved: Mutex<Vec<ExecutionPayload>>,
    attempts: AtomicU32,
    fail_remaining: AtomicU32,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` saves before letting one through.
    pub fn set_fail_times(&self, times: u32) {
        self.fail_remaining.store(times, Ordering::SeqCst);
    }

    /// How many saves were attempted, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every execution successfully persisted.
    pub fn saved(&self) -> Vec<ExecutionPayload> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save_execution(&self, execution: &ExecutionPayload) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("result store offline");
        }

        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(execution.clone());
        Ok(())
    }
}
