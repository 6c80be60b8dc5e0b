//! Campus data core: a refresh-coordinated cache and cross-service
//! resolution layer between slow upstream providers (events feed, directory,
//! scholars) and low-latency callers.
//!
//! The facade wires three component crates together:
//!
//! - `quad-cache`: TTL store with single-flight fetches and stale grace
//! - `quad-events`: epoch-scoped event snapshots with compact local ids
//! - `quad-people`: directory cache and scholar resolution pipeline
//!
//! Routing, response formatting, and process wiring live outside this crate;
//! [`CampusCore`] is the whole surface they consume.

mod config;
mod service;

pub use config::{Config, RetryConfig, UpstreamConfig};
pub use service::{CampusCore, Upstreams};

pub use quad_cache::{Cached, RetryPolicy, UpstreamError};
pub use quad_events::{
    DateWindow, Epoch, EpochId, EventContact, EventDetails, EventFeed, EventFilters,
    EventLocation, EventRecord, LocalIdTable, SimplifiedEvent, SimplifiedEvents,
};
pub use quad_people::{
    DirectoryEntry, DirectorySearch, DirectoryUpstream, PersonDetails, PersonLookup, Resolution,
    ResolvedScholar, ScholarEducation, ScholarGrant, ScholarProfile, ScholarPublication,
    ScholarUpstream,
};
