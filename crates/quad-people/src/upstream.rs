//! Directory and scholars upstream contracts and HTTP clients.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use quad_cache::{RetryPolicy, UpstreamError};

use crate::types::{
    DirectoryEntry, PersonDetails, ScholarEducation, ScholarGrant, ScholarProfile,
    ScholarPublication,
};

/// How many publications and grants to request per profile.
const PUBLICATION_COUNT: usize = 10;
const GRANT_COUNT: usize = 10;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Contract the directory upstream must satisfy.
#[async_trait]
pub trait DirectoryUpstream: Send + Sync {
    /// Search by name or NetID, returning raw entries.
    async fn search(&self, query: &str) -> Result<Vec<DirectoryEntry>, UpstreamError>;

    /// Detailed record behind an ldap key.
    async fn lookup(&self, ldap_key: &str) -> Result<PersonDetails, UpstreamError>;
}

/// Contract the scholars upstream must satisfy.
#[async_trait]
pub trait ScholarUpstream: Send + Sync {
    /// Fetch the merged profile behind a DUID.
    async fn fetch_profile(&self, duid: &str) -> Result<ScholarProfile, UpstreamError>;
}

fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
}

// =============================================================================
// Directory
// =============================================================================

/// HTTP client for the campus directory service.
pub struct HttpDirectory {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpDirectory {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http: build_http_client(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry,
        }
    }
}

#[async_trait]
impl DirectoryUpstream for HttpDirectory {
    async fn search(&self, query: &str) -> Result<Vec<DirectoryEntry>, UpstreamError> {
        self.retry
            .run("directory search", || async move {
                let response = self
                    .http
                    .get(&self.base_url)
                    .query(&[("q", query), ("access_token", self.api_key.as_str())])
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(UpstreamError::Status {
                        status: status.as_u16(),
                    });
                }

                let raw: Vec<serde_json::Value> = response
                    .json()
                    .await
                    .map_err(|err| UpstreamError::InvalidPayload(err.to_string()))?;

                // Entries that fail validation are dropped, not fatal.
                let total = raw.len();
                let mut entries = Vec::with_capacity(total);
                for value in raw {
                    match serde_json::from_value::<DirectoryEntry>(value) {
                        Ok(entry) => entries.push(entry),
                        Err(err) => debug!(error = %err, "dropping directory entry that failed validation"),
                    }
                }
                if entries.len() < total {
                    warn!(
                        dropped = total - entries.len(),
                        "directory search returned entries that failed validation"
                    );
                }
                Ok(entries)
            })
            .await
    }

    async fn lookup(&self, ldap_key: &str) -> Result<PersonDetails, UpstreamError> {
        let url = format!("{}/{}", self.base_url, ldap_key);
        self.retry
            .run("directory person", || {
                let url = url.as_str();
                async move {
                    let response = self
                        .http
                        .get(url)
                        .query(&[("access_token", self.api_key.as_str())])
                        .send()
                        .await?;

                    let status = response.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(UpstreamError::NotFound(format!("person {ldap_key}")));
                    }
                    if !status.is_success() {
                        return Err(UpstreamError::Status {
                            status: status.as_u16(),
                        });
                    }

                    response
                        .json::<PersonDetails>()
                        .await
                        .map_err(|err| UpstreamError::InvalidPayload(err.to_string()))
                }
            })
            .await
    }
}

// =============================================================================
// Scholars
// =============================================================================

/// The scholars service answers either with `{"items": [...]}` or a bare
/// array, depending on the endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemsPayload {
    Wrapped {
        #[serde(default)]
        items: Vec<serde_json::Value>,
    },
    Bare(Vec<serde_json::Value>),
}

impl ItemsPayload {
    fn into_items(self) -> Vec<serde_json::Value> {
        match self {
            ItemsPayload::Wrapped { items } => items,
            ItemsPayload::Bare(items) => items,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Labeled {
    label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PubItem {
    label: Option<String>,
    uri: Option<String>,
    #[serde(rename = "vivoType")]
    vivo_type: Option<String>,
    attributes: PubAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PubAttributes {
    #[serde(rename = "authorList")]
    author_list: Option<String>,
    #[serde(rename = "publishedIn")]
    published_in: Option<String>,
    year: Option<String>,
    #[serde(rename = "apaCitation")]
    apa_citation: Option<String>,
    #[serde(rename = "chicagoCitation")]
    chicago_citation: Option<String>,
    #[serde(rename = "mlaCitation")]
    mla_citation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GrantItem {
    label: Option<String>,
    attributes: GrantAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GrantAttributes {
    #[serde(rename = "awardedBy")]
    awarded_by: Option<String>,
    #[serde(rename = "roleName")]
    role_name: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    #[serde(rename = "administeredBy")]
    administered_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetailItem {
    uri: Option<String>,
    attributes: DetailAttributes,
    #[serde(rename = "researchAreas")]
    research_areas: Vec<Labeled>,
    educations: Vec<EducationItem>,
    departments: Vec<Labeled>,
    addresses: Vec<AddressItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetailAttributes {
    name: Option<String>,
    #[serde(rename = "preferredTitle")]
    preferred_title: Option<String>,
    overview: Option<String>,
    #[serde(rename = "primaryEmail")]
    primary_email: Option<String>,
    phone: Option<String>,
    #[serde(rename = "officeLocation")]
    office_location: Option<String>,
    #[serde(rename = "imageUri")]
    image_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EducationItem {
    attributes: EducationAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EducationAttributes {
    degree: Option<String>,
    institution: Option<Labeled>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddressItem {
    uri: Option<String>,
    label: Option<String>,
}

/// Split a `;`-separated author list.
fn parse_authors(author_list: Option<&str>) -> Vec<String> {
    author_list
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .map(str::to_string)
        .collect()
}

/// Year portion of a possibly-ISO date string.
fn year_of(raw: Option<&str>) -> Option<String> {
    let raw = raw?.split('T').next()?;
    let year = raw.split('-').next()?;
    (!year.is_empty()).then(|| year.to_string())
}

/// Prefer APA, then Chicago, then MLA, with markup stripped.
fn parse_citation(attrs: &PubAttributes) -> Option<String> {
    let citation = attrs
        .apa_citation
        .as_deref()
        .or(attrs.chicago_citation.as_deref())
        .or(attrs.mla_citation.as_deref())?;
    let stripped = TAG_RE.replace_all(citation, "").trim().to_string();
    (!stripped.is_empty()).then_some(stripped)
}

/// Last segment of a vivo type URI, e.g. `.../AcademicArticle`.
fn parse_publication_type(vivo_type: Option<&str>) -> Option<String> {
    let segment = vivo_type?.rsplit('/').next()?;
    (!segment.is_empty()).then(|| segment.to_string())
}

/// Render an ISO date as e.g. "May 1, 2024", falling back to the raw string.
fn format_grant_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let date_part = raw.split('T').next().unwrap_or(raw);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => Some(date.format("%B %-d, %Y").to_string()),
        Err(_) => Some(raw.to_string()),
    }
}

fn parse_publication(item: PubItem) -> ScholarPublication {
    ScholarPublication {
        title: item.label.unwrap_or_default(),
        authors: parse_authors(item.attributes.author_list.as_deref()),
        journal: item.attributes.published_in.clone(),
        year: year_of(item.attributes.year.as_deref()),
        citation: parse_citation(&item.attributes),
        url: item.uri,
        publication_type: parse_publication_type(item.vivo_type.as_deref()),
    }
}

fn parse_grant(item: GrantItem) -> ScholarGrant {
    ScholarGrant {
        title: item.label.unwrap_or_default(),
        awarded_by: item.attributes.awarded_by,
        role: item.attributes.role_name,
        start_date: format_grant_date(item.attributes.start_date.as_deref()),
        end_date: format_grant_date(item.attributes.end_date.as_deref()),
        administered_by: item.attributes.administered_by,
    }
}

fn parse_education(item: EducationItem) -> ScholarEducation {
    let attrs = item.attributes;
    let degree = attrs.degree.filter(|d| !d.is_empty());
    let institution = attrs
        .institution
        .and_then(|labeled| labeled.label)
        .filter(|i| !i.is_empty());
    let year = year_of(attrs.end_date.as_deref());

    let mut description = [degree.as_deref(), institution.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(year) = &year {
        if description.is_empty() {
            description = format!("({year})");
        } else {
            description = format!("{description} ({year})");
        }
    }

    ScholarEducation {
        degree,
        institution,
        year,
        description: (!description.is_empty()).then_some(description),
    }
}

fn parse_detail(duid: &str, item: DetailItem) -> ScholarProfile {
    let office = item.attributes.office_location.clone().or_else(|| {
        item.addresses
            .iter()
            .find(|address| {
                address
                    .uri
                    .as_deref()
                    .is_some_and(|uri| uri.contains("work_location"))
            })
            .and_then(|address| address.label.clone())
    });

    ScholarProfile {
        duid: duid.to_string(),
        name: item.attributes.name.unwrap_or_default(),
        title: item.attributes.preferred_title,
        overview: item.attributes.overview,
        department: item
            .departments
            .into_iter()
            .next()
            .and_then(|labeled| labeled.label),
        email: item.attributes.primary_email,
        phone: item.attributes.phone,
        office,
        research_interests: item
            .research_areas
            .into_iter()
            .filter_map(|labeled| labeled.label)
            .collect(),
        education: item.educations.into_iter().map(parse_education).collect(),
        profile_url: item.uri,
        image_url: item.attributes.image_uri,
        publications: Vec::new(),
        grants: Vec::new(),
    }
}

fn parse_items<T>(payload: ItemsPayload) -> Vec<T>
where
    T: serde::de::DeserializeOwned,
{
    payload
        .into_items()
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(err) => {
                debug!(error = %err, "dropping malformed scholars item");
                None
            }
        })
        .collect()
}

/// HTTP client for the scholars service.
pub struct HttpScholars {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpScholars {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http: build_http_client(),
            base_url: base_url.into(),
            retry,
        }
    }

    async fn fetch_items(
        &self,
        what: &str,
        url: &str,
        duid: &str,
    ) -> Result<ItemsPayload, UpstreamError> {
        self.retry
            .run(what, || async move {
                let response = self.http.get(url).query(&[("uri", duid)]).send().await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(UpstreamError::Status {
                        status: status.as_u16(),
                    });
                }

                response
                    .json::<ItemsPayload>()
                    .await
                    .map_err(|err| UpstreamError::InvalidPayload(err.to_string()))
            })
            .await
    }

    async fn fetch_details(&self, duid: &str) -> Result<ScholarProfile, UpstreamError> {
        let url = format!("{}/people/complete/1.json", self.base_url);
        let payload = self.fetch_items("scholar details", &url, duid).await?;
        let mut items: Vec<DetailItem> = parse_items(payload);
        if items.is_empty() {
            return Err(UpstreamError::NotFound(format!("scholar {duid}")));
        }
        Ok(parse_detail(duid, items.remove(0)))
    }

    async fn fetch_publications(&self, duid: &str) -> Result<Vec<ScholarPublication>, UpstreamError> {
        let url = format!("{}/people/publications/{}.json", self.base_url, PUBLICATION_COUNT);
        let payload = self.fetch_items("scholar publications", &url, duid).await?;
        Ok(parse_items::<PubItem>(payload)
            .into_iter()
            .map(parse_publication)
            .collect())
    }

    async fn fetch_grants(&self, duid: &str) -> Result<Vec<ScholarGrant>, UpstreamError> {
        let url = format!("{}/people/grants/{}.json", self.base_url, GRANT_COUNT);
        let payload = self.fetch_items("scholar grants", &url, duid).await?;
        Ok(parse_items::<GrantItem>(payload)
            .into_iter()
            .map(parse_grant)
            .collect())
    }
}

#[async_trait]
impl ScholarUpstream for HttpScholars {
    async fn fetch_profile(&self, duid: &str) -> Result<ScholarProfile, UpstreamError> {
        let mut profile = self.fetch_details(duid).await?;
        profile.publications = self.fetch_publications(duid).await?;
        profile.grants = self.fetch_grants(duid).await?;
        debug!(
            duid,
            publications = profile.publications.len(),
            grants = profile.grants.len(),
            "composed scholar profile"
        );
        Ok(profile)
    }
}
