//! Epoch-scoped event snapshots over the campus events feed.
//!
//! This crate turns the slow, volatile upstream events feed into a stable
//! low-latency view:
//!
//! - **Allocator**: compact local ids assigned per refresh generation
//! - **Epoch**: one immutable generation of the cached feed
//! - **Snapshot**: date-windowed simplified listings plus detail resolution
//!   by local id, racing refreshes safely via grace-window retention
//! - **Refresh**: background loop that rolls epochs on a fixed interval

mod allocator;
mod epoch;
mod refresh;
mod snapshot;
mod types;
mod upstream;

pub use allocator::{LOCAL_ID_BASE, LocalIdTable};
pub use epoch::{Epoch, EpochId};
pub use refresh::run_refresh_loop;
pub use snapshot::{
    EventDetails, EventFilters, SimplifiedEvents, SnapshotConfig, SnapshotManager,
};
pub use types::{DateWindow, EventContact, EventLocation, EventRecord, SimplifiedEvent};
pub use upstream::{EventFeed, HttpEventFeed};
