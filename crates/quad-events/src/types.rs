//! Event feed data model.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive date window for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Physical or virtual location attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLocation {
    pub address: Option<String>,
    pub link: Option<String>,
}

/// Contact information attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A full event record as published by the upstream feed.
///
/// Fields pass through as received; the core does not normalize or
/// deduplicate upstream values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Canonical identifier assigned by the feed.
    #[serde(default)]
    pub id: String,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub sponsor: Option<String>,
    pub co_sponsors: Option<Vec<String>>,
    pub location: Option<EventLocation>,
    pub contact: Option<EventContact>,
    pub categories: Option<Vec<String>>,
    pub link: Option<String>,
    pub event_url: Option<String>,
}

impl EventRecord {
    /// Calendar date the event starts, if the timestamp parses as RFC 3339.
    /// The date is taken in the feed's own offset.
    pub fn start_date(&self) -> Option<NaiveDate> {
        let raw = self.start_timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.date_naive())
    }
}

/// Low-token projection of an [`EventRecord`], with the canonical id replaced
/// by an epoch-scoped local id. Derived on demand, never persisted past the
/// epoch that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedEvent {
    pub local_id: u32,
    pub title: Option<String>,
    /// Sponsoring group.
    pub groups: Option<String>,
    pub categories: Option<Vec<String>>,
    pub description: Option<String>,
    pub start_time: Option<String>,
}

impl SimplifiedEvent {
    pub(crate) fn project(local_id: u32, record: &EventRecord) -> Self {
        Self {
            local_id,
            title: record.summary.clone(),
            groups: record.sponsor.clone(),
            categories: record.categories.clone(),
            description: record.description.clone(),
            start_time: record.start_timestamp.clone(),
        }
    }
}
