//! End-to-end flow: schedule a job, let its timer fire, delegate through
//! the crawl orchestrator, and check what lands in the result store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use dragnet::testing::{MemoryResultStore, MockResponse, MockTarget, TestTriggerRunner};
use dragnet::{
    CrawlOrchestrator, CronScheduler, DelegationPayload, Delegator, PageRequest, ScheduleRequest,
    ScheduleType, TargetRegistry, Tool, ToolTarget, TriggerState,
};

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(60), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

fn single_target_tool(kind: &str, target_id: &str, target_name: &str) -> Tool {
    Tool {
        kind: kind.into(),
        keywords: vec!["duplex".into()],
        max_pages: 2,
        targets: vec![ToolTarget {
            target_id: target_id.into(),
            target_name: target_name.into(),
            keywords: None,
            max_pages: None,
        }],
    }
}

#[tokio::test(start_paused = true)]
async fn once_job_delegates_and_persists_end_to_end() {
    let craigslist = Arc::new(
        MockTarget::new("craigslist housing")
            .on_seed(MockResponse::Paginate(vec![PageRequest::new(
                "https://cl.test/housing/1",
            )]))
            .on_url(
                "https://cl.test/housing/1",
                MockResponse::Record(json!({"title": "2br duplex"})),
            ),
    );
    let mut registry = TargetRegistry::new();
    registry.register(craigslist);

    let store = Arc::new(MemoryResultStore::new());
    let executor = Arc::new(CrawlOrchestrator::new(Arc::new(registry)));
    let delegator = Arc::new(Delegator::new(executor, store.clone()));
    let runner = Arc::new(TestTriggerRunner::new());
    let scheduler = CronScheduler::with_runner(runner.clone());

    delegator
        .register(DelegationPayload {
            job_id: "j1".into(),
            name: "housing sweep".into(),
            schedule_type: ScheduleType::Once,
            tools: vec![single_target_tool(
                "listing-scan",
                "cl-1",
                "craigslist housing",
            )],
        })
        .await;

    let start = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
    scheduler
        .schedule(
            ScheduleRequest::builder()
                .id("j1")
                .name("housing sweep")
                .kind(ScheduleType::Once)
                .start_at(start)
                .now(start - chrono::Duration::seconds(30))
                .task(delegator.scheduled_task("j1"))
                .build(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    wait_until("the execution to be persisted", || !store.saved().is_empty()).await;

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    let execution = &saved[0];
    assert_eq!(execution.job_id, "j1");
    assert_eq!(execution.schedule.kind, ScheduleType::Once);
    assert_eq!(execution.tools[0].kind, "listing-scan");
    let target = &execution.tools[0].targets[0];
    assert_eq!(target.target_id, "cl-1");
    assert_eq!(target.results.len(), 1);
    assert_eq!(
        target.results[0].record,
        Some(json!({"title": "2br duplex"}))
    );

    // A once job leaves nothing behind: no entry, no trigger, no flags.
    assert!(scheduler.jobs().await.is_empty());
    assert!(runner.added().is_empty());
    assert!(!delegator.is_running("j1").await);
    assert!(!delegator.is_pending("j1").await);
}

#[tokio::test(start_paused = true)]
async fn recurring_trigger_redelivers_only_registered_payloads() {
    let acme = Arc::new(
        MockTarget::new("acme jobs").on_seed(MockResponse::Record(json!({"title": "picker"}))),
    );
    let mut registry = TargetRegistry::new();
    registry.register(acme);

    let store = Arc::new(MemoryResultStore::new());
    let executor = Arc::new(CrawlOrchestrator::new(Arc::new(registry)));
    let delegator = Arc::new(Delegator::new(executor, store.clone()));
    let runner = Arc::new(TestTriggerRunner::new());
    let scheduler = CronScheduler::with_runner(runner.clone());

    let payload = DelegationPayload {
        job_id: "j2".into(),
        name: "daily picker scan".into(),
        schedule_type: ScheduleType::Daily,
        tools: vec![single_target_tool("listing-scan", "acme-1", "acme jobs")],
    };
    delegator.register(payload.clone()).await;

    let start = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
    scheduler
        .schedule(
            ScheduleRequest::builder()
                .id("j2")
                .name("daily picker scan")
                .kind(ScheduleType::Daily)
                .start_at(start)
                .now(start - chrono::Duration::seconds(10))
                .task(delegator.scheduled_task("j2"))
                .build(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    wait_until("the start fire to persist", || store.saved().len() == 1).await;

    let jobs = scheduler.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, TriggerState::Active);
    let added = runner.added();
    assert_eq!(added.len(), 1);

    // The start fire consumed the registered payload, so a bare trigger
    // fire has nothing to deliver.
    runner.fire(&added[0].0).await;
    assert_eq!(store.saved().len(), 1);

    // Registering again re-arms the delivery.
    delegator.register(payload).await;
    runner.fire(&added[0].0).await;
    assert_eq!(store.saved().len(), 2);

    scheduler.stop("j2").await.unwrap();
    assert_eq!(runner.removed().len(), 1);
    assert_eq!(scheduler.jobs().await[0].state, TriggerState::Stopped);
}
