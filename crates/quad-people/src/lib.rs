//! Directory lookups and scholar-profile resolution.
//!
//! Two independently cached stages:
//!
//! - **Directory**: normalized-query search cache over the campus directory,
//!   with exact-match-first ranking and ambiguity preserved for the caller
//! - **Pipeline**: directory lookup chained into a DUID-keyed scholar
//!   profile cache, failing and caching each stage independently

mod directory;
mod pipeline;
mod types;
mod upstream;

pub use directory::{DirectoryCache, DirectoryConfig, DirectorySearch, PersonLookup, normalize_query};
pub use pipeline::{Resolution, ResolutionPipeline, ResolvedScholar};
pub use types::{
    DirectoryEntry, PersonDetails, ScholarEducation, ScholarGrant, ScholarProfile,
    ScholarPublication,
};
pub use upstream::{DirectoryUpstream, HttpDirectory, HttpScholars, ScholarUpstream};
