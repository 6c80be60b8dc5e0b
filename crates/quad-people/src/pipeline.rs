//! Two-stage resolution: directory lookup chained into a scholar-profile
//! fetch, each stage cached and failing independently.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use quad_cache::{CacheStore, Cached, UpstreamError};

use crate::directory::DirectoryCache;
use crate::types::{DirectoryEntry, ScholarProfile};
use crate::upstream::ScholarUpstream;

/// Outcome of a resolution request.
///
/// Ambiguity and not-found are results, not errors: the pipeline never
/// guesses between candidates, and an unknown name is a definitive answer.
#[derive(Debug, Clone, Serialize)]
pub enum Resolution {
    Resolved(Box<ResolvedScholar>),
    Ambiguous {
        query: String,
        candidates: Vec<DirectoryEntry>,
    },
    NotFound {
        query: String,
    },
}

/// A directory entry merged with the scholar profile behind its DUID.
///
/// When the scholar stage fails, the directory stage's data still comes
/// back, with `profile_error` describing what went wrong.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedScholar {
    pub entry: DirectoryEntry,
    pub profile: Option<ScholarProfile>,
    pub profile_error: Option<String>,
    /// True when any stage was served past its TTL under grace.
    pub stale: bool,
}

/// Chains the directory cache into a DUID-keyed profile cache.
pub struct ResolutionPipeline {
    directory: Arc<DirectoryCache>,
    scholars: Arc<dyn ScholarUpstream>,
    profiles: Arc<CacheStore<Arc<ScholarProfile>>>,
    profile_ttl: Duration,
}

impl ResolutionPipeline {
    pub fn new(
        directory: Arc<DirectoryCache>,
        scholars: Arc<dyn ScholarUpstream>,
        profile_ttl: Duration,
        stale_grace: Duration,
        fetch_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            directory,
            scholars,
            profiles: CacheStore::new(fetch_timeout, stale_grace),
            profile_ttl,
        })
    }

    /// Resolve a name or NetID to a scholar.
    ///
    /// Directory-stage upstream failures propagate as errors; everything
    /// after a successful directory lookup degrades to partial data instead.
    pub async fn resolve(&self, query: &str) -> Result<Resolution, UpstreamError> {
        let search = self.directory.search(query).await?;
        let mut candidates = search.entries;

        match candidates.len() {
            0 => {
                debug!(query = %search.query, "no directory match");
                Ok(Resolution::NotFound {
                    query: search.query,
                })
            }
            1 => {
                let entry = candidates.remove(0);
                Ok(Resolution::Resolved(Box::new(
                    self.scholar_stage(entry, search.stale).await,
                )))
            }
            count => {
                debug!(query = %search.query, count, "ambiguous directory result, not auto-selecting");
                Ok(Resolution::Ambiguous {
                    query: search.query,
                    candidates,
                })
            }
        }
    }

    /// Profile fetch for callers that already hold a DUID, through the same
    /// cache the pipeline uses.
    pub async fn profile_by_duid(
        &self,
        duid: &str,
    ) -> Result<Cached<Arc<ScholarProfile>>, UpstreamError> {
        let scholars = Arc::clone(&self.scholars);
        let key = format!("profile:{duid}");
        let lookup = duid.to_string();
        self.profiles
            .get_or_fetch(&key, self.profile_ttl, move || async move {
                Ok(Arc::new(scholars.fetch_profile(&lookup).await?))
            })
            .await
    }

    async fn scholar_stage(&self, entry: DirectoryEntry, directory_stale: bool) -> ResolvedScholar {
        match self.profile_by_duid(&entry.duid).await {
            Ok(cached) => ResolvedScholar {
                entry,
                profile: Some((*cached.value).clone()),
                profile_error: None,
                stale: directory_stale || cached.stale,
            },
            Err(err) => {
                warn!(duid = %entry.duid, error = %err, "scholar fetch failed, returning directory data only");
                ResolvedScholar {
                    entry,
                    profile: None,
                    profile_error: Some(err.to_string()),
                    stale: directory_stale,
                }
            }
        }
    }
}
