//! Directory and scholar data model.

use serde::{Deserialize, Serialize};

/// Basic person record from a directory search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(rename = "ldapkey")]
    pub ldap_key: String,
    /// Surname.
    #[serde(rename = "sn")]
    pub surname: String,
    #[serde(rename = "givenName")]
    pub given_name: String,
    pub duid: String,
    pub netid: String,
    pub display_name: String,
}

/// Detailed person record from an ldap-key lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDetails {
    #[serde(rename = "ldapkey")]
    pub ldap_key: String,
    #[serde(rename = "sn")]
    pub surname: String,
    #[serde(rename = "givenName")]
    pub given_name: String,
    pub duid: String,
    pub netid: String,
    pub display_name: String,
    pub nickname: Option<String>,
    pub titles: Option<Vec<String>>,
    pub primary_affiliation: Option<String>,
    pub emails: Option<Vec<String>>,
    pub post_office_box: Option<Vec<String>>,
    pub address: Option<Vec<String>>,
    pub phones: Option<Vec<String>>,
    pub department: Option<String>,
}

/// One publication on a scholar profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarPublication {
    pub title: String,
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub year: Option<String>,
    pub citation: Option<String>,
    pub url: Option<String>,
    pub publication_type: Option<String>,
}

/// One grant on a scholar profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarGrant {
    pub title: String,
    pub awarded_by: Option<String>,
    pub role: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub administered_by: Option<String>,
}

/// One education line on a scholar profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarEducation {
    pub degree: Option<String>,
    pub institution: Option<String>,
    pub year: Option<String>,
    pub description: Option<String>,
}

/// Merged scholar record composed from the profile, publications, and
/// grants endpoints. Cached by DUID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarProfile {
    pub duid: String,
    pub name: String,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub office: Option<String>,
    pub research_interests: Vec<String>,
    pub education: Vec<ScholarEducation>,
    pub profile_url: Option<String>,
    pub image_url: Option<String>,
    pub publications: Vec<ScholarPublication>,
    pub grants: Vec<ScholarGrant>,
}
