//! End-to-end cycle tests with in-process sources and notifiers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flatwatch::commands::{Command, CommandHandle};
use flatwatch::error::{FetchError, NotifyError};
use flatwatch::models::{
    Criteria, Delivery, Listing, RawListing, SourceKind, StorageConfig, Trigger,
};
use flatwatch::pipeline::{Pipeline, Scheduler};
use flatwatch::services::{LogNotifier, Notifier, Source, normalize};
use flatwatch::storage::{self, MemoryStore, SqliteStore, Store};
use tokio_util::sync::CancellationToken;

/// Replays one scripted response per fetch; empty once exhausted.
struct ScriptedSource {
    kind: SourceKind,
    script: Mutex<VecDeque<Result<Vec<RawListing>, String>>>,
}

impl ScriptedSource {
    fn new(kind: SourceKind, script: Vec<Result<Vec<RawListing>, String>>) -> Arc<dyn Source> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(records)) => Ok(records),
            Some(Err(cause)) => Err(FetchError::new(self.kind, cause)),
            None => Ok(Vec::new()),
        }
    }
}

/// Records deliveries; fails the first `failures` sends.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    failures: Mutex<usize>,
}

impl RecordingNotifier {
    fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::default(),
            failures: Mutex::new(failures),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, listing: &Listing) -> Result<(), NotifyError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(NotifyError::Rejected {
                    status: 429,
                    description: "Too Many Requests".into(),
                });
            }
        }
        self.sent.lock().unwrap().push(listing.url.clone());
        Ok(())
    }

    async fn send_text(&self, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

fn criteria() -> Criteria {
    Criteria {
        min_rooms: Some(2.0),
        max_rooms: Some(4.0),
        min_floor: Some(2),
        max_price: Some(1500.0),
        districts: vec![],
        exclude_keywords: vec!["wbs".into()],
    }
}

fn raw(url: &str, rooms: &str, floor: &str, price: &str, description: &str) -> RawListing {
    RawListing {
        url: Some(url.into()),
        title: Some("Wohnung".into()),
        address: Some("Musterstraße 1, 10115 Berlin, Mitte".into()),
        price: Some(price.into()),
        rooms: Some(rooms.into()),
        floor: Some(floor.into()),
        area: Some("70 m²".into()),
        district: None,
        description: Some(description.into()),
    }
}

const L1: &str = "https://www.immobilienscout24.de/expose/1";
const L2: &str = "https://www.immobilienscout24.de/expose/2";

fn pipeline(
    store: Arc<dyn Store>,
    sources: Vec<Arc<dyn Source>>,
    notifier: Arc<RecordingNotifier>,
) -> Pipeline {
    Pipeline::new(store, sources, notifier, criteria())
}

#[tokio::test]
async fn end_to_end_alert_suppress_and_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("flats.db")).await.unwrap());
    let notifier = RecordingNotifier::failing(0);
    let source = ScriptedSource::new(
        SourceKind::Scout24,
        vec![
            Ok(vec![
                raw(L1, "3 Zimmer", "2. OG", "1.400 €", "bright flat"),
                raw(L2, "3 Zimmer", "1. OG", "1.400 €", ""),
            ]),
            // L3: L1 seen again in the next cycle
            Ok(vec![raw(L1, "3 Zimmer", "2. OG", "1.400 €", "bright flat")]),
        ],
    );
    let pipeline = pipeline(store.clone(), vec![source], notifier.clone());
    let cancel = CancellationToken::new();

    let first = pipeline.run_cycle(1, Trigger::Timer, &cancel).await;
    assert_eq!(first.total_new(), 2);
    assert_eq!(first.total_notified(), 1);
    assert_eq!(first.suppressed, 1);
    assert_eq!(notifier.sent(), vec![L1.to_string()]);

    let l1 = store.get(L1).await.unwrap().unwrap();
    assert!(l1.notified);
    assert_eq!(l1.delivery, Some(Delivery::Alerted));
    let l2 = store.get(L2).await.unwrap().unwrap();
    assert!(l2.notified);
    assert_eq!(l2.delivery, Some(Delivery::Suppressed));

    let second = pipeline.run_cycle(2, Trigger::Timer, &cancel).await;
    assert_eq!(second.total_fetched(), 1);
    assert_eq!(second.total_new(), 0);
    assert_eq!(second.total_notified(), 0);
    assert_eq!(notifier.sent(), vec![L1.to_string()]);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn failing_source_does_not_block_others() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::failing(0);
    let broken = ScriptedSource::new(SourceKind::Immowelt, vec![Err("HTTP 503".into())]);
    let healthy = ScriptedSource::new(
        SourceKind::Immonet,
        vec![Ok(vec![raw(
            "https://www.immonet.de/angebot/9",
            "2 Zimmer",
            "3. OG",
            "1.100 €",
            "",
        )])],
    );
    let pipeline = pipeline(store.clone(), vec![broken, healthy], notifier.clone());

    let run = pipeline
        .run_cycle(1, Trigger::Manual, &CancellationToken::new())
        .await;

    let failed = run.source(SourceKind::Immowelt).unwrap();
    assert_eq!(failed.errors, 1);
    assert!(failed.last_error.as_deref().unwrap().contains("HTTP 503"));
    let ok = run.source(SourceKind::Immonet).unwrap();
    assert_eq!((ok.new, ok.notified, ok.errors), (1, 1, 0));
    assert_eq!(notifier.sent(), vec!["https://www.immonet.de/angebot/9".to_string()]);
}

#[tokio::test]
async fn failed_delivery_is_retried_next_cycle() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::failing(1);
    let source = ScriptedSource::new(
        SourceKind::Scout24,
        vec![Ok(vec![raw(L1, "3 Zimmer", "2. OG", "1.400 €", "")])],
    );
    let pipeline = pipeline(store.clone(), vec![source], notifier.clone());
    let cancel = CancellationToken::new();

    let first = pipeline.run_cycle(1, Trigger::Timer, &cancel).await;
    assert_eq!(first.total_filtered_in(), 1);
    assert_eq!(first.total_notified(), 0);
    assert_eq!(first.total_errors(), 1);
    assert!(!store.get(L1).await.unwrap().unwrap().notified);

    let second = pipeline.run_cycle(2, Trigger::Timer, &cancel).await;
    assert_eq!(second.total_new(), 0);
    assert_eq!(second.total_notified(), 1);
    assert_eq!(notifier.sent(), vec![L1.to_string()]);

    let third = pipeline.run_cycle(3, Trigger::Timer, &cancel).await;
    assert_eq!(third.total_notified(), 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn listing_found_late_in_cycle_is_notified_same_cycle() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::failing(0);
    let early = ScriptedSource::new(SourceKind::Scout24, vec![Ok(vec![])]);
    let late = ScriptedSource::new(
        SourceKind::Immonet,
        vec![Ok(vec![raw(
            "https://www.immonet.de/angebot/late",
            "4 Zimmer",
            "5. OG",
            "1.500 €",
            "",
        )])],
    );
    let pipeline = pipeline(store, vec![early, late], notifier.clone());

    let run = pipeline
        .run_cycle(1, Trigger::Timer, &CancellationToken::new())
        .await;
    assert_eq!(run.total_notified(), 1);
}

#[tokio::test]
async fn manual_refresh_through_command_handle_runs_a_cycle() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::failing(0);
    let source = ScriptedSource::new(
        SourceKind::Scout24,
        vec![Ok(vec![raw(L1, "3 Zimmer", "2. OG", "1.400 €", "")])],
    );
    let pipeline = Arc::new(pipeline(store.clone(), vec![source], notifier.clone()));
    let scheduler = Scheduler::new(Arc::clone(&pipeline), Duration::from_secs(3600));
    let handle = CommandHandle::new(Arc::clone(&pipeline), scheduler.handle());
    let mut runs = scheduler.handle().subscribe();
    let cancel = CancellationToken::new();
    let task = scheduler.spawn(cancel.clone());

    // Pause only affects the timer.
    handle.execute(&Command::Pause).await;
    let reply = handle.execute(&Command::Refresh).await;
    assert!(reply.starts_with("🔄"), "unexpected reply: {reply}");

    tokio::time::timeout(Duration::from_secs(5), runs.changed())
        .await
        .unwrap()
        .unwrap();
    let run = runs.borrow().clone().unwrap();
    assert_eq!(run.trigger, Trigger::Manual);
    assert_eq!(notifier.sent(), vec![L1.to_string()]);

    let listed = handle.execute(&Command::List(5)).await;
    assert!(listed.contains(L1));
    let status = handle.execute(&Command::Status).await;
    assert!(status.contains("paused"));
    assert!(status.contains("#1"));

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn dry_run_cycle_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("flats.db"),
    };
    let pending = normalize(
        SourceKind::Scout24,
        &raw(L1, "3 Zimmer", "2. OG", "1.400 €", ""),
        chrono::Utc::now(),
    )
    .unwrap();
    {
        let db = SqliteStore::open(&config.database_path).await.unwrap();
        db.insert(&pending).await.unwrap();
        db.close().await;
    }

    let store = storage::open(&config, true).await.unwrap();
    let source = ScriptedSource::new(
        SourceKind::Scout24,
        vec![Ok(vec![
            raw(L1, "3 Zimmer", "2. OG", "1.400 €", ""),
            raw(L2, "3 Zimmer", "4. OG", "1.200 €", ""),
        ])],
    );
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        vec![source],
        Arc::new(LogNotifier),
        criteria(),
    );
    let run = pipeline
        .run_cycle(1, Trigger::Manual, &CancellationToken::new())
        .await;
    assert_eq!(run.total_notified(), 2);
    store.close().await;

    let db = SqliteStore::open(&config.database_path).await.unwrap();
    let row = db.get(L1).await.unwrap().unwrap();
    assert!(!row.notified);
    assert_eq!(row.delivery, None);
    assert!(db.get(L2).await.unwrap().is_none());
    assert_eq!(db.count().await.unwrap(), 1);
    db.close().await;
}
