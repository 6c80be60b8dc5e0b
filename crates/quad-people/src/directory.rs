//! Normalized-query cache over the campus directory.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use quad_cache::{CacheStore, UpstreamError};

use crate::types::{DirectoryEntry, PersonDetails};
use crate::upstream::DirectoryUpstream;

/// Tuning knobs for the directory cache. Directory data changes rarely, so
/// the default TTLs are long.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub search_ttl: Duration,
    pub person_ttl: Duration,
    pub stale_grace: Duration,
    pub fetch_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            search_ttl: Duration::from_secs(86_400),
            person_ttl: Duration::from_secs(86_400),
            stale_grace: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Ranked search results. Ambiguity is preserved: every match is returned,
/// never a silently chosen one.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySearch {
    /// The normalized query the results were cached under.
    pub query: String,
    pub entries: Vec<DirectoryEntry>,
    pub stale: bool,
}

/// A person-detail lookup result.
#[derive(Debug, Clone, Serialize)]
pub struct PersonLookup {
    pub person: PersonDetails,
    pub stale: bool,
}

/// Collapse interior whitespace and lowercase, so equivalent queries share
/// one cache entry.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Exact display-name matches first, then alphabetical by display name.
fn rank(query: &str, entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| {
        let a_exact = a.display_name.eq_ignore_ascii_case(query);
        let b_exact = b.display_name.eq_ignore_ascii_case(query);
        b_exact
            .cmp(&a_exact)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
}

/// TTL cache of directory lookups keyed by normalized query.
pub struct DirectoryCache {
    upstream: Arc<dyn DirectoryUpstream>,
    searches: Arc<CacheStore<Arc<Vec<DirectoryEntry>>>>,
    people: Arc<CacheStore<Arc<PersonDetails>>>,
    cfg: DirectoryConfig,
}

impl DirectoryCache {
    pub fn new(upstream: Arc<dyn DirectoryUpstream>, cfg: DirectoryConfig) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            searches: CacheStore::new(cfg.fetch_timeout, cfg.stale_grace),
            people: CacheStore::new(cfg.fetch_timeout, cfg.stale_grace),
            cfg,
        })
    }

    /// Search by name or NetID. Results are ranked and cached under the
    /// normalized query.
    pub async fn search(&self, query: &str) -> Result<DirectorySearch, UpstreamError> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(DirectorySearch {
                query: normalized,
                entries: Vec::new(),
                stale: false,
            });
        }

        let upstream = Arc::clone(&self.upstream);
        let key = format!("search:{normalized}");
        let lookup = normalized.clone();
        let cached = self
            .searches
            .get_or_fetch(&key, self.cfg.search_ttl, move || async move {
                let mut entries = upstream.search(&lookup).await?;
                rank(&lookup, &mut entries);
                Ok(Arc::new(entries))
            })
            .await?;

        debug!(
            query = %normalized,
            count = cached.value.len(),
            stale = cached.stale,
            "directory search"
        );
        Ok(DirectorySearch {
            query: normalized,
            entries: (*cached.value).clone(),
            stale: cached.stale,
        })
    }

    /// Look up the single entry whose NetID matches exactly.
    pub async fn by_netid(&self, netid: &str) -> Result<Option<DirectoryEntry>, UpstreamError> {
        let search = self.search(netid).await?;
        let normalized = normalize_query(netid);
        Ok(search
            .entries
            .into_iter()
            .find(|entry| entry.netid.eq_ignore_ascii_case(&normalized)))
    }

    /// Detailed person record, cached per ldap key.
    pub async fn person_details(&self, ldap_key: &str) -> Result<PersonLookup, UpstreamError> {
        let upstream = Arc::clone(&self.upstream);
        let key = format!("person:{ldap_key}");
        let lookup = ldap_key.to_string();
        let cached = self
            .people
            .get_or_fetch(&key, self.cfg.person_ttl, move || async move {
                Ok(Arc::new(upstream.lookup(&lookup).await?))
            })
            .await?;

        Ok(PersonLookup {
            person: (*cached.value).clone(),
            stale: cached.stale,
        })
    }
}
