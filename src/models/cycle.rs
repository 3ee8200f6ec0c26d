// src/models/cycle.rs

//! Per-cycle statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SourceKind;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Timer,
    Manual,
}

/// Counters for a single source within one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: SourceKind,
    /// Raw records returned by the adapter
    pub fetched: usize,
    /// Records that were inserted for the first time
    pub new: usize,
    /// Listings of this source that passed the filter this cycle
    pub filtered_in: usize,
    /// Alerts delivered for listings of this source
    pub notified: usize,
    /// Fetch, normalize and delivery failures
    pub errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SourceStats {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            fetched: 0,
            new: 0,
            filtered_in: 0,
            notified: 0,
            errors: 0,
            last_error: None,
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        self.last_error = Some(message.into());
    }
}

/// Ephemeral record of one cycle. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRun {
    /// Monotonic id assigned by the scheduler
    pub id: u64,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceStats>,
    /// Listings marked suppressed (filtered out or stale)
    pub suppressed: usize,
    /// Cycle-level storage failure, if persistence was aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
    /// Shutdown was requested before all sources were processed
    #[serde(default)]
    pub interrupted: bool,
}

impl CycleRun {
    pub fn start(id: u64, trigger: Trigger) -> Self {
        Self {
            id,
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            sources: Vec::new(),
            suppressed: 0,
            storage_error: None,
            interrupted: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Stats entry for `source`, created on first use.
    pub fn source_mut(&mut self, source: SourceKind) -> &mut SourceStats {
        let pos = match self.sources.iter().position(|s| s.source == source) {
            Some(pos) => pos,
            None => {
                self.sources.push(SourceStats::new(source));
                self.sources.len() - 1
            }
        };
        &mut self.sources[pos]
    }

    pub fn source(&self, source: SourceKind) -> Option<&SourceStats> {
        self.sources.iter().find(|s| s.source == source)
    }

    pub fn total_fetched(&self) -> usize {
        self.sources.iter().map(|s| s.fetched).sum()
    }

    pub fn total_new(&self) -> usize {
        self.sources.iter().map(|s| s.new).sum()
    }

    pub fn total_filtered_in(&self) -> usize {
        self.sources.iter().map(|s| s.filtered_in).sum()
    }

    pub fn total_notified(&self) -> usize {
        self.sources.iter().map(|s| s.notified).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.sources.iter().map(|s| s.errors).sum::<usize>()
            + usize::from(self.storage_error.is_some())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// One-line summary used in logs.
    pub fn summary_line(&self) -> String {
        format!(
            "cycle #{} ({:?}): {} fetched, {} new, {} matched, {} notified, {} suppressed, {} errors",
            self.id,
            self.trigger,
            self.total_fetched(),
            self.total_new(),
            self.total_filtered_in(),
            self.total_notified(),
            self.suppressed,
            self.total_errors()
        )
    }
}
