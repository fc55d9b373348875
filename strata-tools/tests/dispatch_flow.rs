//! Debounced dispatch queue against a real store.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    Catalog, DispatchConfig, Envelope, Package, RandomIdGenerator, Status, StrataResult, Tool,
};
use strata_storage::Session;
use strata_test_utils::assertions::assert_success;
use strata_test_utils::TestStore;
use strata_tools::{DispatchQueue, FlushReport, ToolHandler, ToolRegistry};
use tokio::sync::broadcast;

const WINDOW: Duration = Duration::from_millis(100);

fn queue(store: &TestStore, debounce: Duration) -> DispatchQueue {
    DispatchQueue::new(
        store.db(),
        Arc::new(ToolRegistry::standard(Arc::new(RandomIdGenerator))),
        DispatchConfig::with_debounce(debounce),
    )
}

fn create(owner: &str, subject: &str) -> Package {
    Package::new().with(
        Tool::Create,
        json!({ owner: {"table": ["Notes"], "field": [["subject"]], "value": [[subject]], "_UUID": owner} }),
    )
}

/// Handler that dies mid-session, taking the whole flush down with it.
struct Exploding;

impl ToolHandler for Exploding {
    fn handle(&self, _: &Value, _: &Session<'_>, _: &Catalog) -> StrataResult<Envelope> {
        panic!("handler exploded");
    }
}

async fn next_report(reports: &mut broadcast::Receiver<FlushReport>) -> FlushReport {
    tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .expect("flush did not happen")
        .expect("report channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submits_within_window_coalesce() {
    let store = TestStore::new();
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    let first = queue.submit(create("a", "one")).unwrap();
    let second = queue.submit(create("b", "two")).unwrap();
    assert_eq!(first, "request_1");
    assert_eq!(second, "request_2");
    assert_eq!(queue.pending(), 2);

    let report = next_report(&mut reports).await;
    assert_eq!(report.sequence, 1);
    assert_eq!(report.request_count, 2);
    let created = report.result(Tool::Create).unwrap();
    assert_success(created);
    assert_eq!(created.action["created"], json!(["a", "b"]));

    tokio::time::sleep(WINDOW * 3).await;
    assert_eq!(queue.flush_count(), 1);
    assert_eq!(queue.pending(), 0);
    assert!(store.owner_exists("a") && store.owner_exists("b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_separated_submits_flush_separately() {
    let store = TestStore::new();
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    queue.submit(create("a", "one")).unwrap();
    let first = next_report(&mut reports).await;
    tokio::time::sleep(WINDOW).await;
    queue.submit(create("b", "two")).unwrap();
    let second = next_report(&mut reports).await;

    assert_eq!((first.sequence, first.request_count), (1, 1));
    assert_eq!((second.sequence, second.request_count), (2, 1));
    assert_eq!(queue.flush_count(), 2);
    assert_eq!(queue.last_results().unwrap(), second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reads_see_writes_of_the_same_flush() {
    let store = TestStore::new();
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    queue
        .submit(Package::new().with(Tool::Read, json!({"UUID": "u1"})))
        .unwrap();
    queue.submit(create("u1", "hello")).unwrap();

    let report = next_report(&mut reports).await;
    let read = report.result(Tool::Read).unwrap();
    assert_success(read);
    assert_eq!(read.action["results"]["u1"]["Notes"][0]["subject"], "hello");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_later_update_wins_within_a_flush() {
    let store = TestStore::new();
    store.seed("u1", "Notes", &["subject"], &[vec![json!("orig")]]);
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    for subject in ["first", "second"] {
        queue
            .submit(Package::new().with(
                Tool::Update,
                json!({"u1": {"table": ["Notes"], "field": [["subject"]], "IND": [[0]], "value": [[subject]]}}),
            ))
            .unwrap();
    }
    let report = next_report(&mut reports).await;
    assert_eq!(report.result(Tool::Update).unwrap().action["updates"]["Notes"], 1);

    let rows = store.with_session(|s| Ok(s.select_rows("Notes", "u1")?));
    assert_eq!(rows[0][2], json!("second"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_list_cannot_be_queued() {
    let store = TestStore::new();
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    queue
        .submit(
            Package::new()
                .with(Tool::List, json!({"UUID": "u1"}))
                .with(Tool::Search, json!({})),
        )
        .unwrap();
    let report = next_report(&mut reports).await;

    let list = &report.results["list"];
    assert_eq!(list.status, Status::Error);
    assert_eq!(list.errors, vec!["request_1: tool 'list' cannot be queued".to_string()]);
    assert!(report.result(Tool::Search).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_now_cancels_the_timer() {
    let store = TestStore::new();
    let queue = queue(&store, Duration::from_millis(300));

    queue.submit(create("a", "one")).unwrap();
    let report = queue.flush_now().await.unwrap().unwrap();
    assert_eq!(report.request_count, 1);
    assert_eq!(queue.pending(), 0);
    assert!(store.owner_exists("a"));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(queue.flush_count(), 1);
    assert!(queue.flush_now().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_flushes_pending_packages() {
    let store = TestStore::new();
    let queue = queue(&store, Duration::from_secs(60));

    queue.submit(create("a", "one")).unwrap();
    queue.submit(create("b", "two")).unwrap();
    let report = queue.shutdown().await.unwrap().unwrap();

    assert_eq!(report.request_count, 2);
    assert_eq!(queue.flush_count(), 1);
    assert!(store.owner_exists("a") && store.owner_exists("b"));
    assert!(queue.shutdown().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_independent_queues_do_not_share_state() {
    let store = TestStore::new();
    let left = queue(&store, Duration::from_secs(60));
    let right = queue(&store, Duration::from_secs(60));

    left.submit(create("a", "one")).unwrap();
    assert_eq!(left.pending(), 1);
    assert_eq!(right.pending(), 0);
    assert_eq!(right.submit(create("b", "two")).unwrap(), "request_1");

    left.shutdown().await.unwrap();
    right.shutdown().await.unwrap();
    assert_eq!((left.flush_count(), right.flush_count()), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_each_submit_restarts_the_window() {
    let store = TestStore::new();
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    for i in 0..4 {
        queue.submit(create(&format!("o{}", i), "note")).unwrap();
        tokio::time::sleep(WINDOW * 6 / 10).await;
        assert_eq!(queue.flush_count(), 0, "flushed early after submit {}", i);
    }

    let report = next_report(&mut reports).await;
    assert_eq!((report.sequence, report.request_count), (1, 4));
    assert_eq!(queue.flush_count(), 1);
    assert!(store.owner_exists("o0") && store.owner_exists("o3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_from_a_plain_thread() {
    let store = TestStore::new();
    let queue = queue(&store, WINDOW);
    let mut reports = queue.subscribe();

    let remote = queue.clone();
    let key = std::thread::spawn(move || remote.submit(create("a", "from a thread")))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(key, "request_1");

    let report = next_report(&mut reports).await;
    assert_eq!(report.request_count, 1);
    assert!(store.owner_exists("a"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_flush_still_reports() {
    let store = TestStore::new();
    let registry = ToolRegistry::standard(Arc::new(RandomIdGenerator)).with(Tool::Search, Exploding);
    let queue = DispatchQueue::new(
        store.db(),
        Arc::new(registry),
        DispatchConfig::with_debounce(WINDOW),
    );
    let mut reports = queue.subscribe();

    queue.submit(create("a", "lost")).unwrap();
    queue
        .submit(Package::new().with(
            Tool::Search,
            json!({"Notes": {"subject": {"and": [{"equals": "lost"}]}}}),
        ))
        .unwrap();

    let report = next_report(&mut reports).await;
    assert_eq!(report.sequence, 1);
    assert_eq!(report.request_count, 2);
    for tool in [Tool::Create, Tool::Search] {
        let envelope = report.result(tool).unwrap();
        assert_eq!(envelope.status, Status::Error);
        assert!(envelope.errors[0].starts_with(&format!("{} failed:", tool)), "{:?}", envelope);
    }
    assert_eq!(queue.flush_count(), 1);
    assert_eq!(queue.last_results().unwrap(), report);
    assert_eq!(queue.pending(), 0);
}
