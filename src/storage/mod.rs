//! Storage abstractions for listing persistence.
//!
//! The store is the single source of truth for what has been seen and what
//! has been notified. Deduplication relies on the store's uniqueness
//! guarantee on `url`, never on caller-side caches or locks.
//!
//! ## Backends
//!
//! - `SqliteStore`: durable table keyed by `url` (production)
//! - `MemoryStore`: process-local map (tests, dry runs)

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{Delivery, Listing, StorageConfig};

// Re-export for convenience
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Outcome of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer persisted the same `url` first; nothing changed.
    AlreadyExists,
}

/// Listing persistence with concurrency-safe operations.
///
/// Every method may be called concurrently from the cycle task and the
/// command interface.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether a listing with this `url` is already stored.
    async fn exists(&self, url: &str) -> StoreResult<bool>;

    /// Insert a listing unless its `url` is already present.
    ///
    /// Atomic with respect to other inserts: of N concurrent inserts of one
    /// `url`, exactly one reports `Inserted`.
    async fn insert(&self, listing: &Listing) -> StoreResult<InsertOutcome>;

    /// Fetch a single listing.
    async fn get(&self, url: &str) -> StoreResult<Option<Listing>>;

    /// All listings with `notified = false`, oldest first.
    async fn unnotified(&self) -> StoreResult<Vec<Listing>>;

    /// Flip `notified` to true and record how. Idempotent: a listing that is
    /// already notified keeps its original delivery and timestamp.
    async fn mark_notified(&self, url: &str, delivery: Delivery) -> StoreResult<()>;

    /// Up to `limit` listings, newest `first_seen_at` first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<Listing>>;

    /// Total number of stored listings.
    async fn count(&self) -> StoreResult<usize>;

    /// Release backend resources.
    async fn close(&self) {}
}

/// Open the configured backend.
///
/// Dry runs get a `MemoryStore`: alerts are only logged there, so marking
/// them notified in the database would hide them from later real runs.
pub async fn open(config: &StorageConfig, dry_run: bool) -> StoreResult<Arc<dyn Store>> {
    if dry_run {
        log::info!(
            "Dry run: using an in-memory store, {} is left untouched",
            config.database_path.display()
        );
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::open(&config.database_path).await?))
}
