//! Data models for visitor analytics

use serde::{Deserialize, Serialize};

/// Raw record returned by a geo-IP provider
///
/// Both fields are optional so that a provider which breaks its contract
/// (returns a record with a missing field) can be told apart from one that
/// reports "no data" for the address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRecord {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,

    /// Country name
    pub country_name: Option<String>,
}

impl GeoRecord {
    pub fn new(country_code: impl Into<String>, country_name: impl Into<String>) -> Self {
        Self {
            country_code: Some(country_code.into()),
            country_name: Some(country_name.into()),
        }
    }
}

/// Validated geo-IP lookup result, cached per IP for the lifetime of a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLookupResult {
    pub country_code: String,
    pub country_name: String,
}

impl GeoLookupResult {
    /// Validate a provider record, returning the name of the first missing field on failure
    pub fn from_record(record: GeoRecord) -> Result<Self, &'static str> {
        let country_code = record
            .country_code
            .filter(|s| !s.is_empty())
            .ok_or("country_code")?;
        let country_name = record
            .country_name
            .filter(|s| !s.is_empty())
            .ok_or("country_name")?;

        Ok(Self {
            country_code,
            country_name,
        })
    }
}

/// Every fact extracted for a single page view, ready for a logging pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub visitor_id: String,
    pub first_visit: bool,
    pub page_enter: bool,
    pub page_exit: bool,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub client_ip: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub browser_name: Option<String>,
    pub browser_major_version: Option<String>,
    pub os_name: Option<String>,
    pub device_type: Option<String>,
    pub time_on_page: Option<u64>,
    pub total_time_on_site: Option<u64>,
    pub referrer_domain: Option<String>,
    pub referrer_path: Option<String>,
    /// Unix timestamp of when the record was assembled
    pub timestamp: i64,
}
