// src/pipeline/orchestrator.rs

//! One ingestion cycle: fetch, normalize, dedup, filter, notify.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::models::{Criteria, CycleRun, Delivery, Listing, Trigger};
use crate::services::filter;
use crate::services::normalize;
use crate::services::{Notifier, Source};
use crate::storage::{InsertOutcome, Store};

/// Everything a cycle needs. Shared read-only between the scheduler task
/// and the command interface.
pub struct Pipeline {
    store: Arc<dyn Store>,
    sources: Vec<Arc<dyn Source>>,
    notifier: Arc<dyn Notifier>,
    criteria: Criteria,
    stale_after: Option<chrono::Duration>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        sources: Vec<Arc<dyn Source>>,
        notifier: Arc<dyn Notifier>,
        criteria: Criteria,
    ) -> Self {
        Self {
            store,
            sources,
            notifier,
            criteria,
            stale_after: None,
        }
    }

    /// Suppress un-notified listings first seen longer ago than `window`.
    pub fn with_stale_after(mut self, window: Option<chrono::Duration>) -> Self {
        self.stale_after = window;
        self
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Run one cycle to completion and report what happened.
    ///
    /// Never fails: fetch, normalize and delivery errors are counted per
    /// source; a storage error ends the cycle early and is recorded on the
    /// run. Cancellation is honoured between sources.
    pub async fn run_cycle(
        &self,
        id: u64,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> CycleRun {
        let mut run = CycleRun::start(id, trigger);
        log::info!(
            "Cycle #{} started ({:?}, {} sources)",
            id,
            trigger,
            self.sources.len()
        );

        let mut persisted = true;
        for source in &self.sources {
            if cancel.is_cancelled() {
                log::info!("Cycle #{} interrupted before {}", id, source.kind());
                run.interrupted = true;
                break;
            }
            if let Err(e) = self.ingest_source(source.as_ref(), &mut run).await {
                log::error!(
                    "Cycle #{}: storage failed while ingesting {}: {}",
                    id,
                    source.kind(),
                    e
                );
                run.storage_error = Some(e.to_string());
                persisted = false;
                break;
            }
        }

        if persisted && !run.interrupted {
            if let Err(e) = self.notify_pending(&mut run).await {
                log::error!("Cycle #{}: storage failed during notify pass: {}", id, e);
                run.storage_error = Some(e.to_string());
            }
        }

        run.finish();
        log::info!("{}", run.summary_line());
        run
    }

    async fn ingest_source(
        &self,
        source: &dyn Source,
        run: &mut CycleRun,
    ) -> Result<(), StorageError> {
        let kind = source.kind();
        let records = match source.fetch().await {
            Ok(records) => records,
            Err(e) => {
                log::warn!("{}", e);
                run.source_mut(kind).record_error(e.to_string());
                return Ok(());
            }
        };
        run.source_mut(kind).fetched = records.len();

        let now = Utc::now();
        for raw in &records {
            let listing = match normalize(kind, raw, now) {
                Ok(listing) => listing,
                Err(e) => {
                    log::warn!("{}: dropping record {:?}: {}", kind, raw.url, e);
                    run.source_mut(kind).record_error(e.to_string());
                    continue;
                }
            };
            if self.store.exists(&listing.url).await? {
                continue;
            }
            if self.store.insert(&listing).await? == InsertOutcome::Inserted {
                run.source_mut(kind).new += 1;
            }
        }

        let stats = run.source_mut(kind);
        log::info!(
            "{}: fetched {}, new {}, errors {}",
            kind,
            stats.fetched,
            stats.new,
            stats.errors
        );
        Ok(())
    }

    /// Filter and alert every un-notified listing, not only this cycle's.
    async fn notify_pending(&self, run: &mut CycleRun) -> Result<(), StorageError> {
        let pending = self.store.unnotified().await?;
        let now = Utc::now();
        log::debug!("{} un-notified listings", pending.len());

        for listing in pending {
            if self.is_stale(&listing, now) {
                log::debug!("Suppressing stale listing {}", listing.url);
                self.store.mark_notified(&listing.url, Delivery::Suppressed).await?;
                run.suppressed += 1;
                continue;
            }

            if let Err(reason) = filter::evaluate(&listing, &self.criteria) {
                log::debug!("Suppressing {}: {}", listing.url, reason);
                self.store.mark_notified(&listing.url, Delivery::Suppressed).await?;
                run.suppressed += 1;
                continue;
            }

            run.source_mut(listing.source).filtered_in += 1;
            match self.notifier.send(&listing).await {
                Ok(()) => {
                    self.store.mark_notified(&listing.url, Delivery::Alerted).await?;
                    run.source_mut(listing.source).notified += 1;
                }
                Err(e) => {
                    log::warn!("Alert for {} failed, retrying next cycle: {}", listing.url, e);
                    run.source_mut(listing.source)
                        .record_error(format!("notify {}: {}", listing.url, e));
                }
            }
        }
        Ok(())
    }

    fn is_stale(&self, listing: &Listing, now: DateTime<Utc>) -> bool {
        self.stale_after
            .is_some_and(|window| now - listing.first_seen_at > window)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{FetchError, NotifyError};
    use crate::models::{RawListing, SourceKind};
    use crate::storage::MemoryStore;

    struct StaticSource {
        kind: SourceKind,
        records: Vec<RawListing>,
    }

    #[async_trait]
    impl Source for StaticSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
            Ok(self.records.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, listing: &Listing) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(listing.url.clone());
            Ok(())
        }

        async fn send_text(&self, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn raw(id: u32, price: &str) -> RawListing {
        RawListing {
            url: Some(format!("https://www.immonet.de/expose/{id}")),
            title: Some(format!("Wohnung {id}")),
            price: Some(price.into()),
            rooms: Some("3 Zimmer".into()),
            floor: Some("2. OG".into()),
            ..RawListing::default()
        }
    }

    fn criteria() -> Criteria {
        Criteria {
            min_rooms: Some(2.0),
            max_rooms: Some(4.0),
            min_floor: Some(2),
            max_price: Some(1500.0),
            ..Criteria::default()
        }
    }

    #[tokio::test]
    async fn unnormalizable_records_are_counted_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let source = StaticSource {
            kind: SourceKind::Immonet,
            records: vec![raw(1, "1.000 €"), RawListing::default(), raw(2, "auf Anfrage")],
        };
        let pipeline = Pipeline::new(
            store.clone(),
            vec![Arc::new(source) as Arc<dyn Source>],
            notifier.clone(),
            criteria(),
        );

        let run = pipeline.run_cycle(1, Trigger::Manual, &CancellationToken::new()).await;
        let stats = run.source(SourceKind::Immonet).unwrap();
        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.notified, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_listings_are_suppressed_without_alert() {
        let store = Arc::new(MemoryStore::new());
        let mut old = normalize(SourceKind::Immonet, &raw(7, "900 €"), Utc::now()).unwrap();
        old.first_seen_at = Utc::now() - chrono::Duration::hours(30);
        store.insert(&old).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(store.clone(), vec![], notifier.clone(), criteria())
            .with_stale_after(Some(chrono::Duration::hours(24)));

        let run = pipeline.run_cycle(1, Trigger::Timer, &CancellationToken::new()).await;
        assert_eq!(run.suppressed, 1);
        assert!(notifier.sent.lock().unwrap().is_empty());
        let stored = store.get(&old.url).await.unwrap().unwrap();
        assert!(stored.notified);
        assert_eq!(stored.delivery, Some(Delivery::Suppressed));
    }

    #[tokio::test]
    async fn cancelled_cycle_skips_sources_and_notify_pass() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let source = StaticSource {
            kind: SourceKind::Scout24,
            records: vec![raw(1, "1.000 €")],
        };
        let pipeline = Pipeline::new(
            store.clone(),
            vec![Arc::new(source) as Arc<dyn Source>],
            notifier.clone(),
            criteria(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = pipeline.run_cycle(1, Trigger::Timer, &cancel).await;
        assert!(run.interrupted);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
