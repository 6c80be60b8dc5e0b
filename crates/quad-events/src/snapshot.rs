//! Refresh-coordinated event snapshots.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use quad_cache::{CacheStore, Cached, UpstreamError};

use crate::epoch::{Epoch, EpochId};
use crate::types::{DateWindow, EventRecord, SimplifiedEvent};
use crate::upstream::EventFeed;

/// Cache key for the full-feed snapshot. One key: all concurrent demand for
/// the feed funnels through a single flight.
const FEED_CACHE_KEY: &str = "event-feed";

/// Tuning knobs for the snapshot manager.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// How long a fetched feed stays fresh.
    pub cache_ttl: Duration,
    /// How long past expiry/retirement stale data may still be served.
    pub stale_grace: Duration,
    /// Total epochs retained: the current one plus `epoch_retention - 1`
    /// retired ones.
    pub epoch_retention: usize,
    /// Deadline for one feed fetch, retries included.
    pub fetch_timeout: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            stale_grace: Duration::from_secs(300),
            epoch_retention: 2,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Simplified listing for one date window, tagged with the epoch that
/// produced it.
#[derive(Debug, Clone, Serialize)]
pub struct SimplifiedEvents {
    pub epoch: EpochId,
    pub window: DateWindow,
    /// True when the backing feed was served past its TTL under grace.
    pub stale: bool,
    pub events: Vec<SimplifiedEvent>,
}

/// Full records resolved from local ids against a named epoch.
///
/// Ids that do not resolve — unknown, or their epoch retired beyond the
/// grace window — land in `not_found` rather than failing the call.
#[derive(Debug, Clone, Serialize)]
pub struct EventDetails {
    pub epoch: EpochId,
    pub events: Vec<EventRecord>,
    pub not_found: Vec<u32>,
}

/// Categories and sponsoring groups active within a window, each mapped to
/// the local ids of the matching events.
#[derive(Debug, Clone, Serialize)]
pub struct EventFilters {
    pub epoch: EpochId,
    pub stale: bool,
    pub categories: BTreeMap<String, Vec<u32>>,
    pub groups: BTreeMap<String, Vec<u32>>,
}

struct RetiredEpoch {
    epoch: Arc<Epoch>,
    retired_at: Instant,
}

struct EpochSet {
    current: Option<Arc<Epoch>>,
    /// Most recently retired first.
    retired: VecDeque<RetiredEpoch>,
}

/// Owns the cached feed, the epoch pointers, and refresh coordination.
///
/// Refresh publication is a pointer swap under the write lock: the next
/// epoch is built fully off to the side, then swapped in; a live epoch's
/// table is never mutated. Readers clone the `Arc` and resolve without
/// holding any lock.
pub struct SnapshotManager {
    feed: Arc<dyn EventFeed>,
    cache: Arc<CacheStore<Arc<Vec<EventRecord>>>>,
    epochs: RwLock<EpochSet>,
    next_id: AtomicU64,
    cfg: SnapshotConfig,
}

impl SnapshotManager {
    pub fn new(feed: Arc<dyn EventFeed>, cfg: SnapshotConfig) -> Arc<Self> {
        Arc::new(Self {
            feed,
            cache: CacheStore::new(cfg.fetch_timeout, cfg.stale_grace),
            epochs: RwLock::new(EpochSet {
                current: None,
                retired: VecDeque::new(),
            }),
            next_id: AtomicU64::new(1),
            cfg,
        })
    }

    /// Simplified events within `window`, from the current (or grace-stale)
    /// snapshot. Lazily refreshes the feed when its TTL has lapsed.
    pub async fn simplified_events(
        self: &Arc<Self>,
        window: DateWindow,
    ) -> Result<SimplifiedEvents, UpstreamError> {
        let (epoch, stale) = self.ensure_snapshot().await?;

        let mut events = Vec::new();
        let mut unparseable = 0usize;
        for (local, record) in epoch.records() {
            match record.start_date() {
                Some(date) if window.contains(date) => {
                    events.push(SimplifiedEvent::project(local, record));
                }
                Some(_) => {}
                None => unparseable += 1,
            }
        }
        if unparseable > 0 {
            warn!(
                epoch = epoch.id,
                skipped = unparseable,
                "skipping events with missing or unparseable start timestamps"
            );
        }

        debug!(
            epoch = epoch.id,
            count = events.len(),
            stale,
            "serving simplified events"
        );
        Ok(SimplifiedEvents {
            epoch: epoch.id,
            window,
            stale,
            events,
        })
    }

    /// Resolve local ids against the *named* epoch — the one the caller got
    /// from a prior listing, not necessarily the current one. This models
    /// the race between a list call and a detail call spanning a refresh.
    pub async fn details_by_local_ids(&self, epoch_id: EpochId, local_ids: &[u32]) -> EventDetails {
        let mut events = Vec::new();
        let mut not_found = Vec::new();

        match self.find_epoch(epoch_id).await {
            Some(epoch) => {
                for &local in local_ids {
                    match epoch.record_by_local(local) {
                        Some(record) => events.push(record.clone()),
                        None => not_found.push(local),
                    }
                }
            }
            None => not_found.extend_from_slice(local_ids),
        }

        if !not_found.is_empty() {
            debug!(
                epoch = epoch_id,
                missing = not_found.len(),
                "local ids did not resolve"
            );
        }
        EventDetails {
            epoch: epoch_id,
            events,
            not_found,
        }
    }

    /// Active categories and sponsoring groups within `window`, keyed to
    /// local ids.
    pub async fn filters(
        self: &Arc<Self>,
        window: DateWindow,
    ) -> Result<EventFilters, UpstreamError> {
        let (epoch, stale) = self.ensure_snapshot().await?;

        let mut categories: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (local, record) in epoch.records() {
            let Some(date) = record.start_date() else {
                continue;
            };
            if !window.contains(date) {
                continue;
            }
            if let Some(cats) = &record.categories {
                for category in cats {
                    categories.entry(category.clone()).or_default().push(local);
                }
            }
            if let Some(sponsor) = &record.sponsor {
                groups.entry(sponsor.clone()).or_default().push(local);
            }
        }

        Ok(EventFilters {
            epoch: epoch.id,
            stale,
            categories,
            groups,
        })
    }

    /// Force a feed fetch and epoch rollover, regardless of TTL. Called by
    /// the time-based refresh loop. A failure leaves the current epoch (and
    /// the cached feed) in place.
    pub async fn refresh(self: &Arc<Self>) -> Result<EpochId, UpstreamError> {
        let feed = Arc::clone(&self.feed);
        let fetched = self
            .cache
            .refresh(FEED_CACHE_KEY, self.cfg.cache_ttl, move || async move {
                Ok(Arc::new(feed.fetch_events(None).await?))
            })
            .await?;
        let epoch = self.publish_from(&fetched).await;
        Ok(epoch.id)
    }

    /// Current epoch id, if a snapshot has ever been published.
    pub async fn current_epoch(&self) -> Option<EpochId> {
        self.epochs.read().await.current.as_ref().map(|e| e.id)
    }

    async fn ensure_snapshot(self: &Arc<Self>) -> Result<(Arc<Epoch>, bool), UpstreamError> {
        let feed = Arc::clone(&self.feed);
        let fetched = self
            .cache
            .get_or_fetch(FEED_CACHE_KEY, self.cfg.cache_ttl, move || async move {
                Ok(Arc::new(feed.fetch_events(None).await?))
            })
            .await?;
        let stale = fetched.stale;
        let epoch = self.publish_from(&fetched).await;
        Ok((epoch, stale))
    }

    /// Publish the epoch for a fetched feed snapshot, reusing the current
    /// epoch when it already covers this feed revision.
    async fn publish_from(&self, fetched: &Cached<Arc<Vec<EventRecord>>>) -> Arc<Epoch> {
        if let Some(current) = self.current_covering(fetched.revision).await {
            return current;
        }

        // Build fully off to the side; a racing builder may publish first,
        // in which case this build is discarded below.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let epoch = Arc::new(Epoch::build(id, fetched.revision, &fetched.value));

        let mut epochs = self.epochs.write().await;
        if let Some(current) = &epochs.current {
            if current.feed_revision >= fetched.revision {
                return Arc::clone(current);
            }
        }

        info!(
            epoch = id,
            events = epoch.len(),
            feed_revision = fetched.revision,
            "published new event epoch"
        );
        let now = Instant::now();
        if let Some(previous) = epochs.current.replace(Arc::clone(&epoch)) {
            epochs.retired.push_front(RetiredEpoch {
                epoch: previous,
                retired_at: now,
            });
        }
        let keep = self.cfg.epoch_retention.saturating_sub(1);
        epochs.retired.truncate(keep);
        epoch
    }

    /// Current epoch, if it was built from this feed revision or a newer one.
    async fn current_covering(&self, revision: u64) -> Option<Arc<Epoch>> {
        let epochs = self.epochs.read().await;
        epochs
            .current
            .as_ref()
            .filter(|current| current.feed_revision >= revision)
            .map(Arc::clone)
    }

    /// Find an epoch by id: the current one, or a retired one still within
    /// the grace window.
    async fn find_epoch(&self, id: EpochId) -> Option<Arc<Epoch>> {
        let epochs = self.epochs.read().await;
        if let Some(current) = &epochs.current {
            if current.id == id {
                return Some(Arc::clone(current));
            }
        }
        let now = Instant::now();
        epochs
            .retired
            .iter()
            .find(|retired| {
                retired.epoch.id == id && retired.retired_at + self.cfg.stale_grace > now
            })
            .map(|retired| Arc::clone(&retired.epoch))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tokio::sync::Mutex;

    use super::*;

    /// Feed that serves a scripted sequence of responses, repeating the last
    /// one, and counts upstream fetches.
    struct ScriptedFeed {
        responses: Mutex<VecDeque<Result<Vec<EventRecord>, UpstreamError>>>,
        fetches: AtomicU32,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Result<Vec<EventRecord>, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fetches: AtomicU32::new(0),
            })
        }

        fn fetch_count(&self) -> u32 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventFeed for ScriptedFeed {
        async fn fetch_events(
            &self,
            _window: Option<DateWindow>,
        ) -> Result<Vec<EventRecord>, UpstreamError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().await;
            if responses.len() > 1 {
                responses.pop_front().expect("non-empty")
            } else {
                responses.front().cloned().expect("scripted feed exhausted")
            }
        }
    }

    fn event(id: &str, date: &str) -> EventRecord {
        EventRecord {
            id: id.into(),
            summary: Some(format!("event {id}")),
            start_timestamp: Some(format!("{date}T10:00:00Z")),
            sponsor: Some("Music Department".into()),
            categories: Some(vec!["Arts".into()]),
            ..Default::default()
        }
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        )
    }

    fn config() -> SnapshotConfig {
        SnapshotConfig {
            cache_ttl: Duration::from_secs(3600),
            stale_grace: Duration::from_secs(300),
            epoch_retention: 2,
            fetch_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_listing_builds_epoch_one() {
        let feed = ScriptedFeed::new(vec![Ok(vec![
            event("a", "2025-04-05"),
            event("b", "2025-04-06"),
            event("c", "2025-04-07"),
        ])]);
        let manager = SnapshotManager::new(feed.clone(), config());

        let listing = manager.simplified_events(window()).await.unwrap();
        assert_eq!(listing.epoch, 1);
        assert!(!listing.stale);
        assert_eq!(
            listing.events.iter().map(|e| e.local_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(feed.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_within_ttl_reuses_epoch() {
        let feed = ScriptedFeed::new(vec![Ok(vec![event("a", "2025-04-05")])]);
        let manager = SnapshotManager::new(feed.clone(), config());

        let first = manager.simplified_events(window()).await.unwrap();
        tokio::time::advance(Duration::from_secs(3000)).await;
        let second = manager.simplified_events(window()).await.unwrap();

        assert_eq!(first.epoch, second.epoch);
        assert_eq!(feed.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_filtering() {
        let feed = ScriptedFeed::new(vec![Ok(vec![
            event("in", "2025-04-05"),
            event("out", "2025-05-20"),
        ])]);
        let manager = SnapshotManager::new(feed, config());

        let listing = manager.simplified_events(window()).await.unwrap();
        assert_eq!(listing.events.len(), 1);
        assert_eq!(listing.events[0].title.as_deref(), Some("event in"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_details_resolve_against_named_epoch() {
        let feed = ScriptedFeed::new(vec![Ok(vec![
            event("a", "2025-04-05"),
            event("b", "2025-04-06"),
        ])]);
        let manager = SnapshotManager::new(feed, config());

        let listing = manager.simplified_events(window()).await.unwrap();
        let details = manager
            .details_by_local_ids(listing.epoch, &[1, 2, 9])
            .await;

        assert_eq!(details.events.len(), 2);
        assert_eq!(details.events[0].id, "a");
        assert_eq!(details.not_found, vec![9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollover_reassigns_local_ids_in_encounter_order() {
        // Epoch 1: a,b,c -> 1,2,3. Epoch 2 drops b and appends d: a,c,d -> 1,2,3.
        let feed = ScriptedFeed::new(vec![
            Ok(vec![
                event("a", "2025-04-05"),
                event("b", "2025-04-06"),
                event("c", "2025-04-07"),
            ]),
            Ok(vec![
                event("a", "2025-04-05"),
                event("c", "2025-04-07"),
                event("d", "2025-04-08"),
            ]),
        ]);
        let manager = SnapshotManager::new(feed, config());

        let first = manager.simplified_events(window()).await.unwrap();
        assert_eq!(first.epoch, 1);

        tokio::time::advance(Duration::from_secs(3601)).await;
        let second = manager.simplified_events(window()).await.unwrap();
        assert_eq!(second.epoch, 2);
        assert_eq!(
            second.events.iter().map(|e| e.local_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        // "c" moved from local id 3 to local id 2 across the rollover
        let details = manager.details_by_local_ids(second.epoch, &[2]).await;
        assert_eq!(details.events[0].id, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_epoch_resolves_within_grace_then_not_found() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![event("a", "2025-04-05"), event("b", "2025-04-06")]),
            Ok(vec![event("a", "2025-04-05")]),
        ]);
        let manager = SnapshotManager::new(feed, config());

        let first = manager.simplified_events(window()).await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        let second = manager.simplified_events(window()).await.unwrap();
        assert_ne!(first.epoch, second.epoch);

        // Within grace the retired table still resolves the old id for "b"
        let details = manager.details_by_local_ids(first.epoch, &[2]).await;
        assert_eq!(details.events.len(), 1);
        assert_eq!(details.events[0].id, "b");

        // Beyond grace the retired table is unreachable
        tokio::time::advance(Duration::from_secs(301)).await;
        let details = manager.details_by_local_ids(first.epoch, &[2]).await;
        assert!(details.events.is_empty());
        assert_eq!(details.not_found, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_bounds_retired_epochs() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![event("a", "2025-04-05")]),
            Ok(vec![event("b", "2025-04-06")]),
            Ok(vec![event("c", "2025-04-07")]),
        ]);
        let manager = SnapshotManager::new(feed, config());

        let first = manager.simplified_events(window()).await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        let second = manager.simplified_events(window()).await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        let third = manager.simplified_events(window()).await.unwrap();
        assert_eq!((first.epoch, second.epoch, third.epoch), (1, 2, 3));

        // Retention of 2 keeps only the immediately preceding epoch; epoch 1
        // is gone even though its retirement was recent enough for grace.
        let details = manager.details_by_local_ids(first.epoch, &[1]).await;
        assert_eq!(details.not_found, vec![1]);
        let details = manager.details_by_local_ids(second.epoch, &[1]).await;
        assert_eq!(details.events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_failure_within_grace_serves_stale_epoch() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![event("a", "2025-04-05")]),
            Err(UpstreamError::Unavailable("feed down".into())),
        ]);
        let manager = SnapshotManager::new(feed, config());

        let first = manager.simplified_events(window()).await.unwrap();
        assert!(!first.stale);

        // TTL lapsed, upstream down, but still within the grace window
        tokio::time::advance(Duration::from_secs(3700)).await;
        let listing = manager.simplified_events(window()).await.unwrap();
        assert!(listing.stale);
        assert_eq!(listing.epoch, first.epoch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_failure_beyond_grace_propagates() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![event("a", "2025-04-05")]),
            Err(UpstreamError::Unavailable("feed down".into())),
        ]);
        let manager = SnapshotManager::new(feed, config());

        manager.simplified_events(window()).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600 + 301)).await;
        let result = manager.simplified_events(window()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refresh_rolls_epoch_and_failure_keeps_current() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![event("a", "2025-04-05")]),
            Ok(vec![event("a", "2025-04-05"), event("b", "2025-04-06")]),
            Err(UpstreamError::Status { status: 503 }),
        ]);
        let manager = SnapshotManager::new(feed, config());

        let first = manager.simplified_events(window()).await.unwrap();
        assert_eq!(first.epoch, 1);

        // Forced refresh within TTL still rolls the epoch
        let refreshed = manager.refresh().await.unwrap();
        assert_eq!(refreshed, 2);

        // Failed refresh leaves epoch 2 current
        assert!(manager.refresh().await.is_err());
        assert_eq!(manager.current_epoch().await, Some(2));
        let listing = manager.simplified_events(window()).await.unwrap();
        assert_eq!(listing.epoch, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_index_by_local_id() {
        let feed = ScriptedFeed::new(vec![Ok(vec![
            event("a", "2025-04-05"),
            event("b", "2025-04-06"),
        ])]);
        let manager = SnapshotManager::new(feed, config());

        let filters = manager.filters(window()).await.unwrap();
        assert_eq!(filters.categories["Arts"], vec![1, 2]);
        assert_eq!(filters.groups["Music Department"], vec![1, 2]);
    }
}
