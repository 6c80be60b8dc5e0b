//! Immutable generations of the cached event dataset.

use tokio::time::Instant;

use crate::allocator::{LOCAL_ID_BASE, LocalIdTable};
use crate::types::EventRecord;

/// Identifier of one feed generation, monotonically increasing from 1.
pub type EpochId = u64;

/// One immutable generation of the event dataset.
///
/// Built fully off to the side during refresh and published by pointer swap.
/// Readers holding an `Arc<Epoch>` keep resolving against it even after a
/// newer epoch has been published.
#[derive(Debug)]
pub struct Epoch {
    pub id: EpochId,
    /// Cache revision of the feed snapshot this epoch was built from. Used
    /// to detect whether a fetched feed is the one already published.
    pub feed_revision: u64,
    /// Records in feed encounter order; `events[i]` belongs to local id
    /// `LOCAL_ID_BASE + i`.
    events: Vec<EventRecord>,
    table: LocalIdTable,
    pub built_at: Instant,
}

impl Epoch {
    /// Build an epoch from a feed snapshot. Records without an id were
    /// dropped at fetch time; a duplicated canonical id keeps its first
    /// record.
    pub fn build(id: EpochId, feed_revision: u64, feed: &[EventRecord]) -> Self {
        let table = LocalIdTable::allocate(feed.iter().map(|record| record.id.as_str()));
        let mut events: Vec<EventRecord> = Vec::with_capacity(table.len());
        for record in feed {
            // First encounter of this canonical id lands exactly at the end
            // of the aligned vector; later duplicates do not.
            if let Some(local) = table.local_of(&record.id) {
                if (local - LOCAL_ID_BASE) as usize == events.len() {
                    events.push(record.clone());
                }
            }
        }
        Self {
            id,
            feed_revision,
            events,
            table,
            built_at: Instant::now(),
        }
    }

    /// Full record behind `local`, if allocated in this epoch.
    pub fn record_by_local(&self, local: u32) -> Option<&EventRecord> {
        local
            .checked_sub(LOCAL_ID_BASE)
            .and_then(|idx| self.events.get(idx as usize))
    }

    /// Canonical id behind `local`, if allocated in this epoch.
    pub fn canonical_of(&self, local: u32) -> Option<&str> {
        self.table.canonical_of(local)
    }

    /// Local id assigned to `canonical` within this epoch.
    pub fn local_of(&self, canonical: &str) -> Option<u32> {
        self.table.local_of(canonical)
    }

    /// Iterate `(local id, record)` pairs in allocation order.
    pub fn records(&self) -> impl Iterator<Item = (u32, &EventRecord)> {
        self.events
            .iter()
            .enumerate()
            .map(|(idx, record)| (LOCAL_ID_BASE + idx as u32, record))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
