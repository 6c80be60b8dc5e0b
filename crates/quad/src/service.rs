//! Wiring of the exposed operations over the component crates.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use quad_cache::UpstreamError;
use quad_events::{
    DateWindow, EpochId, EventDetails, EventFeed, EventFilters, HttpEventFeed, SimplifiedEvents,
    SnapshotManager, run_refresh_loop,
};
use quad_people::{
    DirectoryCache, DirectoryEntry, DirectorySearch, DirectoryUpstream, HttpDirectory,
    HttpScholars, PersonLookup, Resolution, ResolutionPipeline, ScholarProfile, ScholarUpstream,
};

use crate::config::Config;

/// The upstream collaborators the core is wired against.
pub struct Upstreams {
    pub events: Arc<dyn EventFeed>,
    pub directory: Arc<dyn DirectoryUpstream>,
    pub scholars: Arc<dyn ScholarUpstream>,
}

/// The campus data core: owns the caches and epoch state and exposes the
/// boundary operations to the routing layer.
///
/// Everything returns structured success/error values; nothing panics across
/// this boundary.
pub struct CampusCore {
    events: Arc<SnapshotManager>,
    directory: Arc<DirectoryCache>,
    pipeline: Arc<ResolutionPipeline>,
    config: Config,
}

impl CampusCore {
    /// Wire the core against explicit upstream implementations. Tests hand
    /// in fakes here; production callers usually go through
    /// [`CampusCore::from_config`].
    pub fn new(config: Config, upstreams: Upstreams) -> Self {
        let events = SnapshotManager::new(upstreams.events, config.snapshot_config());
        let directory = DirectoryCache::new(upstreams.directory, config.directory_config());
        let pipeline = ResolutionPipeline::new(
            Arc::clone(&directory),
            upstreams.scholars,
            config.profile_ttl(),
            config.stale_grace(),
            config.fetch_timeout(),
        );
        Self {
            events,
            directory,
            pipeline,
            config,
        }
    }

    /// Wire the core against the HTTP upstreams named in the config.
    pub fn from_config(config: Config) -> Self {
        let retry = config.retry.policy();
        let upstreams = Upstreams {
            events: Arc::new(HttpEventFeed::new(
                config.upstreams.events_url.clone(),
                retry.clone(),
            )),
            directory: Arc::new(HttpDirectory::new(
                config.upstreams.directory_url.clone(),
                config.upstreams.directory_api_key.clone(),
                retry.clone(),
            )),
            scholars: Arc::new(HttpScholars::new(
                config.upstreams.scholars_url.clone(),
                retry,
            )),
        };
        Self::new(config, upstreams)
    }

    /// Simplified events within a date window, tagged with their epoch.
    pub async fn simplified_events(
        &self,
        window: DateWindow,
    ) -> Result<SimplifiedEvents, UpstreamError> {
        self.events.simplified_events(window).await
    }

    /// Full event records behind local ids from a prior listing.
    pub async fn details_by_local_ids(
        &self,
        epoch: EpochId,
        local_ids: &[u32],
    ) -> EventDetails {
        self.events.details_by_local_ids(epoch, local_ids).await
    }

    /// Categories and sponsoring groups active within a window.
    pub async fn event_filters(
        &self,
        window: DateWindow,
    ) -> Result<EventFilters, UpstreamError> {
        self.events.filters(window).await
    }

    /// Directory search by name or NetID; ambiguity comes back as multiple
    /// ranked entries.
    pub async fn directory_search(&self, query: &str) -> Result<DirectorySearch, UpstreamError> {
        self.directory.search(query).await
    }

    /// Exact-NetID lookup.
    pub async fn directory_by_netid(
        &self,
        netid: &str,
    ) -> Result<Option<DirectoryEntry>, UpstreamError> {
        self.directory.by_netid(netid).await
    }

    /// Detailed person record behind an ldap key.
    pub async fn person_details(&self, ldap_key: &str) -> Result<PersonLookup, UpstreamError> {
        self.directory.person_details(ldap_key).await
    }

    /// Resolve a name or NetID to a scholar through the two-stage pipeline.
    pub async fn resolve_scholar(&self, query: &str) -> Result<Resolution, UpstreamError> {
        self.pipeline.resolve(query).await
    }

    /// Scholar profile for a known DUID, through the pipeline's cache.
    pub async fn scholar_profile(&self, duid: &str) -> Result<ScholarProfile, UpstreamError> {
        let cached = self.pipeline.profile_by_duid(duid).await?;
        Ok((*cached.value).clone())
    }

    /// Spawn the time-based refresh loop for the event snapshot.
    pub fn spawn_refresh_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(run_refresh_loop(
            Arc::clone(&self.events),
            self.config.refresh_interval(),
            shutdown,
        ))
    }
}
