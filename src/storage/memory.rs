//! In-memory storage implementation for testing and dry runs.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{Delivery, Listing};
use crate::storage::{InsertOutcome, Store, StoreResult};

/// In-memory listing store.
///
/// Data is lost on restart. The write lock makes check-and-insert atomic.
#[derive(Default)]
pub struct MemoryStore {
    listings: RwLock<HashMap<String, Listing>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, url: &str) -> StoreResult<bool> {
        Ok(self.listings.read().await.contains_key(url))
    }

    async fn insert(&self, listing: &Listing) -> StoreResult<InsertOutcome> {
        match self.listings.write().await.entry(listing.url.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(listing.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, url: &str) -> StoreResult<Option<Listing>> {
        Ok(self.listings.read().await.get(url).cloned())
    }

    async fn unnotified(&self) -> StoreResult<Vec<Listing>> {
        let mut pending: Vec<Listing> = self
            .listings
            .read()
            .await
            .values()
            .filter(|l| !l.notified)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.url.cmp(&b.url))
        });
        Ok(pending)
    }

    async fn mark_notified(&self, url: &str, delivery: Delivery) -> StoreResult<()> {
        if let Some(listing) = self.listings.write().await.get_mut(url) {
            if !listing.notified {
                listing.notified = true;
                listing.delivery = Some(delivery);
                listing.notified_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<Listing>> {
        let mut all: Vec<Listing> = self.listings.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.first_seen_at
                .cmp(&a.first_seen_at)
                .then_with(|| a.url.cmp(&b.url))
        });
        all.truncate(limit);
        Ok(all)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.listings.read().await.len())
    }
}
