//! SQLite storage implementation.
//!
//! ## Layout
//!
//! One table, `listings`, keyed by `url`. The primary key is the dedup
//! guarantee: inserts use `ON CONFLICT(url) DO NOTHING`, so concurrent
//! writers of the same URL cannot create a second row.
//!
//! ```text
//! listings
//! ├── url            TEXT PRIMARY KEY
//! ├── source, title, price, rooms, floor, area_sqm, district, address, description
//! ├── first_seen_at  TEXT (RFC 3339, UTC, fixed width)   -- idx_listings_first_seen
//! ├── notified       INTEGER 0/1                          -- idx_listings_unnotified
//! ├── delivery       TEXT 'alerted' | 'suppressed'
//! └── notified_at    TEXT
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::StorageError;
use crate::models::{Delivery, Listing, SourceKind};
use crate::storage::{InsertOutcome, Store, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    url           TEXT PRIMARY KEY NOT NULL,
    source        TEXT NOT NULL,
    title         TEXT NOT NULL,
    price         REAL NOT NULL,
    rooms         REAL,
    floor         INTEGER,
    area_sqm      REAL,
    district      TEXT,
    address       TEXT,
    description   TEXT NOT NULL DEFAULT '',
    first_seen_at TEXT NOT NULL,
    notified      INTEGER NOT NULL DEFAULT 0,
    delivery      TEXT,
    notified_at   TEXT
);

CREATE INDEX IF NOT EXISTS idx_listings_unnotified ON listings(notified, first_seen_at);
CREATE INDEX IF NOT EXISTS idx_listings_first_seen ON listings(first_seen_at);
"#;

const COLUMNS: &str = "url, source, title, price, rooms, floor, area_sqm, district, address, \
                       description, first_seen_at, notified, delivery, notified_at";

/// SQLite-backed listing store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        log::debug!("Opened listing database at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// Every SQLite in-memory connection is its own database, so the pool
    /// holds exactly one connection and never recycles it.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(url: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(url, format!("invalid timestamp {raw:?}: {e}")))
}

#[derive(Debug, FromRow)]
struct ListingRow {
    url: String,
    source: String,
    title: String,
    price: f64,
    rooms: Option<f64>,
    floor: Option<i64>,
    area_sqm: Option<f64>,
    district: Option<String>,
    address: Option<String>,
    description: String,
    first_seen_at: String,
    notified: bool,
    delivery: Option<String>,
    notified_at: Option<String>,
}

impl ListingRow {
    fn into_listing(self) -> StoreResult<Listing> {
        let source = SourceKind::from_str(&self.source)
            .map_err(|e| StorageError::corrupt(&self.url, e))?;
        let first_seen_at = parse_ts(&self.url, &self.first_seen_at)?;
        let notified_at = self
            .notified_at
            .as_deref()
            .map(|raw| parse_ts(&self.url, raw))
            .transpose()?;
        let delivery = self
            .delivery
            .as_deref()
            .map(Delivery::from_str)
            .transpose()
            .map_err(|e| StorageError::corrupt(&self.url, e))?;
        let floor = self
            .floor
            .map(i32::try_from)
            .transpose()
            .map_err(|e| StorageError::corrupt(&self.url, e))?;

        Ok(Listing {
            url: self.url,
            source,
            title: self.title,
            price: self.price,
            rooms: self.rooms,
            floor,
            area_sqm: self.area_sqm,
            district: self.district,
            address: self.address,
            description: self.description,
            first_seen_at,
            notified: self.notified,
            delivery,
            notified_at,
        })
    }
}

fn into_listings(rows: Vec<ListingRow>) -> StoreResult<Vec<Listing>> {
    rows.into_iter().map(ListingRow::into_listing).collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn exists(&self, url: &str) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM listings WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, listing: &Listing) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO listings
                (url, source, title, price, rooms, floor, area_sqm, district, address,
                 description, first_seen_at, notified, delivery, notified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&listing.url)
        .bind(listing.source.as_str())
        .bind(&listing.title)
        .bind(listing.price)
        .bind(listing.rooms)
        .bind(listing.floor)
        .bind(listing.area_sqm)
        .bind(&listing.district)
        .bind(&listing.address)
        .bind(&listing.description)
        .bind(format_ts(&listing.first_seen_at))
        .bind(listing.notified)
        .bind(listing.delivery.map(|d| d.as_str()))
        .bind(listing.notified_at.as_ref().map(format_ts))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn get(&self, url: &str) -> StoreResult<Option<Listing>> {
        let row: Option<ListingRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM listings WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ListingRow::into_listing).transpose()
    }

    async fn unnotified(&self) -> StoreResult<Vec<Listing>> {
        let rows: Vec<ListingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM listings WHERE notified = 0 ORDER BY first_seen_at ASC, url ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        into_listings(rows)
    }

    async fn mark_notified(&self, url: &str, delivery: Delivery) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE listings SET notified = 1, delivery = ?, notified_at = ? \
             WHERE url = ? AND notified = 0",
        )
        .bind(delivery.as_str())
        .bind(format_ts(&Utc::now()))
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            log::debug!("mark_notified({url}): already notified or unknown");
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<Listing>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<ListingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM listings ORDER BY first_seen_at DESC, url ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_listings(rows)
    }

    async fn count(&self) -> StoreResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
