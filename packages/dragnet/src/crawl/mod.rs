//! Bounded-concurrency crawl orchestration.
//!
//! One `run` call crawls every target of a tool through a shared pool:
//!
//! ```text
//! run(tool)
//!     │ one seed request per distinct target
//!     ▼
//! [semaphore permit] ─► request task ─► Target::process(request)
//!     ▲                     │
//!     │     Paginate: stamp pages, spawn fresh keys
//!     └─────────────────────┤
//!                           │ Record / Err: append outcome
//!                           ▼
//!                 pending keys drained? ─► send TargetResult (once)
//! ```
//!
//! Each target tracks the unique keys of its in-flight extraction requests.
//! New keys are inserted before the finishing request's own key is removed,
//! always inside one critical section, so the drained check can fire the
//! completion exactly once no matter how requests interleave. Every request
//! task holds a clone of the completion sender; the channel closing is the
//! signal that the whole crawl is quiescent.

pub mod request;
mod registry;

pub use registry::TargetRegistry;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::delegator::ToolExecutor;
use crate::types::{RequestOutcome, TargetResult, Tool, ToolTarget};
use request::{CrawlRequest, PageRequest, RequestKind};

/// A site (or site family) the crawler knows how to walk.
///
/// Implementations live with the host application; the orchestrator only
/// needs a name to resolve requests by and a way to process them.
#[async_trait]
pub trait Target: Send + Sync {
    fn name(&self) -> &str;

    /// Handle one request. Seed requests usually answer with the pages to
    /// visit; extraction requests usually answer with a scraped record.
    async fn process(&self, request: &CrawlRequest) -> anyhow::Result<TargetOutcome>;
}

/// What a target made of one request.
#[derive(Debug)]
pub enum TargetOutcome {
    /// More pages to visit before this target is done.
    Paginate(Vec<PageRequest>),
    /// A scraped record for the stored results.
    Record(serde_json::Value),
}

/// Knobs for one crawl run.
#[derive(Debug, Clone, Copy)]
pub struct CrawlConfig {
    /// Upper bound on requests in flight across all targets of one tool.
    pub max_concurrency: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self { max_concurrency: 5 }
    }
}

impl CrawlConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Runs a tool's targets through a bounded request pool.
pub struct CrawlOrchestrator {
    registry: Arc<TargetRegistry>,
    config: CrawlConfig,
}

impl CrawlOrchestrator {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self {
            registry,
            config: CrawlConfig::default(),
        }
    }

    pub fn with_config(registry: Arc<TargetRegistry>, config: CrawlConfig) -> Self {
        Self { registry, config }
    }

    /// Crawl every target of the tool. One request's failure only marks its
    /// own outcome; the run itself always comes back with whatever each
    /// target produced, in completion order.
    pub async fn run(&self, tool: &Tool) -> Vec<TargetResult> {
        info!(tool = %tool.kind, targets = tool.targets.len(), "running crawl tool");

        let run = Arc::new(CrawlRun::default());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let mut seeded = 0usize;
        for target in &tool.targets {
            if !run.init_target(target) {
                warn!(target_id = %target.target_id, "duplicate target in tool, seeding once");
                continue;
            }
            seeded += 1;
            spawn_request(
                run.clone(),
                self.registry.clone(),
                semaphore.clone(),
                done_tx.clone(),
                CrawlRequest::seed(tool, target),
            );
        }
        drop(done_tx);

        // The channel closes once the last request task drops its sender,
        // so this drains to quiescence even if a task died mid-crawl.
        let mut results = Vec::with_capacity(seeded);
        while let Some(result) = done_rx.recv().await {
            results.push(result);
        }

        if results.len() != seeded {
            warn!(
                expected = seeded,
                completed = results.len(),
                "crawl finished with missing target results"
            );
        }
        debug!(tool = %tool.kind, targets = results.len(), "crawl tool finished");
        results
    }
}

#[async_trait]
impl ToolExecutor for CrawlOrchestrator {
    async fn execute(&self, tool: &Tool) -> anyhow::Result<Vec<TargetResult>> {
        Ok(self.run(tool).await)
    }
}

struct TargetState {
    target_name: String,
    /// Unique keys of extraction requests not yet finished.
    pending: HashSet<String>,
    results: Vec<RequestOutcome>,
    done: bool,
}

/// Shared bookkeeping for one `run` call.
///
/// All methods take the lock once, mutate, and run the drained check before
/// releasing it. Nothing awaits while holding the lock.
#[derive(Default)]
struct CrawlRun {
    targets: Mutex<HashMap<String, TargetState>>,
}

impl CrawlRun {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TargetState>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track a target for this run. False when the id is already tracked.
    fn init_target(&self, target: &ToolTarget) -> bool {
        let mut targets = self.lock();
        match targets.entry(target.target_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(TargetState {
                    target_name: target.target_name.clone(),
                    pending: HashSet::new(),
                    results: Vec::new(),
                    done: false,
                });
                true
            }
        }
    }

    /// Append a finished request's outcome and retire its key.
    fn record(
        &self,
        request: &CrawlRequest,
        outcome: RequestOutcome,
        done_tx: &mpsc::UnboundedSender<TargetResult>,
    ) {
        let mut targets = self.lock();
        let state = match targets.get_mut(&request.target_id) {
            Some(state) => state,
            None => return,
        };

        state.results.push(outcome);
        if request.kind == RequestKind::Extraction {
            state.pending.remove(&request.unique_key);
        }
        Self::finish_if_drained(&request.target_id, state, done_tx);
    }

    /// Stamp discovered pages into extraction requests, enqueueing only the
    /// keys not already seen, and retire the finishing request's key.
    /// Returns the requests to spawn.
    fn paginate(
        &self,
        request: &CrawlRequest,
        pages: Vec<PageRequest>,
        done_tx: &mpsc::UnboundedSender<TargetResult>,
    ) -> Vec<CrawlRequest> {
        let mut targets = self.lock();
        let state = match targets.get_mut(&request.target_id) {
            Some(state) => state,
            None => return Vec::new(),
        };

        let mut fresh = Vec::new();
        for page in pages {
            let child = CrawlRequest::extraction(page, request);
            if state.pending.insert(child.unique_key.clone()) {
                fresh.push(child);
            } else {
                debug!(target_id = %request.target_id, unique_key = %child.unique_key, "skipping already queued page");
            }
        }

        // New keys go in before this request's own key comes out, so an
        // empty pending set here really means the target is finished.
        if request.kind == RequestKind::Extraction {
            state.pending.remove(&request.unique_key);
        }
        Self::finish_if_drained(&request.target_id, state, done_tx);
        fresh
    }

    /// Hand the target's results over if nothing is pending. The `done`
    /// flag keeps this to one send per target.
    fn finish_if_drained(
        target_id: &str,
        state: &mut TargetState,
        done_tx: &mpsc::UnboundedSender<TargetResult>,
    ) {
        if state.done || !state.pending.is_empty() {
            return;
        }
        state.done = true;

        let result = TargetResult {
            target_id: target_id.to_string(),
            target_name: state.target_name.clone(),
            results: mem::take(&mut state.results),
        };
        debug!(target_id = %target_id, results = result.results.len(), "target crawl complete");
        let _ = done_tx.send(result);
    }
}

/// Run one request as its own task behind a pool permit. Plain function so
/// pagination can recurse through the spawn boundary.
fn spawn_request(
    run: Arc<CrawlRun>,
    registry: Arc<TargetRegistry>,
    semaphore: Arc<Semaphore>,
    done_tx: mpsc::UnboundedSender<TargetResult>,
    request: CrawlRequest,
) {
    tokio::spawn(async move {
        let _permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        process_request(&run, &registry, &semaphore, &done_tx, request).await;
    });
}

async fn process_request(
    run: &Arc<CrawlRun>,
    registry: &Arc<TargetRegistry>,
    semaphore: &Arc<Semaphore>,
    done_tx: &mpsc::UnboundedSender<TargetResult>,
    request: CrawlRequest,
) {
    if let Err(e) = request.validate() {
        warn!(target_id = %request.target_id, url = %request.url, error = %e, "invalid crawl request");
        run.record(&request, RequestOutcome::err(e.to_string()), done_tx);
        return;
    }

    let target = match registry.resolve(&request.target_name) {
        Some(target) => target,
        None => {
            warn!(target_id = %request.target_id, target_name = %request.target_name, "no target registered under this name");
            run.record(
                &request,
                RequestOutcome::err(format!(
                    "no target registered under '{}'",
                    request.target_name
                )),
                done_tx,
            );
            return;
        }
    };

    debug!(target_id = %request.target_id, kind = %request.kind, url = %request.url, "processing crawl request");
    match target.process(&request).await {
        Ok(TargetOutcome::Paginate(pages)) => {
            let fresh = run.paginate(&request, pages, done_tx);
            for child in fresh {
                spawn_request(
                    run.clone(),
                    registry.clone(),
                    semaphore.clone(),
                    done_tx.clone(),
                    child,
                );
            }
        }
        Ok(TargetOutcome::Record(value)) => {
            run.record(&request, RequestOutcome::ok(value), done_tx);
        }
        Err(e) => {
            warn!(target_id = %request.target_id, url = %request.url, error = %e, "target failed to process request");
            run.record(&request, RequestOutcome::err(e.to_string()), done_tx);
        }
    }
}
