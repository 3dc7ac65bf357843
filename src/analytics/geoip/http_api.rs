//! Geo-IP lookups through an external web API
//!
//! Issues `GET {base_url}/geoip/{ip}` and expects a JSON body carrying
//! `country_code` and `country`. Every failure mode maps to "not found".

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{trace, warn};

use super::provider::{GeoIpProvider, GeoIpResult};
use crate::analytics::models::GeoRecord;
use crate::config::GeoIpConfig;

/// HTTP request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    country_code: Option<String>,
    country: Option<String>,
}

/// External API GeoIP provider
#[derive(Clone)]
pub struct HttpApiProvider {
    base_url: String,
    client: Client,
}

impl HttpApiProvider {
    pub fn new(base_url: &str, timeout: Duration) -> GeoIpResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("visitor-analytics/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &GeoIpConfig) -> GeoIpResult<Self> {
        Self::new(&config.api_url, Duration::from_secs(config.timeout_secs))
    }

    fn lookup_url(&self, ip: &IpAddr) -> String {
        format!("{}/geoip/{}", self.base_url, ip)
    }
}

#[async_trait]
impl GeoIpProvider for HttpApiProvider {
    async fn lookup(&self, ip: &str) -> GeoIpResult<Option<GeoRecord>> {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            trace!(ip, "Skipping geo-IP lookup for malformed address");
            return Ok(None);
        };

        let url = self.lookup_url(&addr);

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("GeoIP API request to \"{}\" failed: {}", url, e);
                return Ok(None);
            }
        };

        if !resp.status().is_success() {
            warn!("GeoIP API \"{}\" returned status {}", url, resp.status());
            return Ok(None);
        }

        let body = match resp.json::<GeoIpResponse>().await {
            Ok(b) => b,
            Err(e) => {
                warn!("GeoIP API response from \"{}\" parse failed: {}", url, e);
                return Ok(None);
            }
        };

        let (Some(country_code), Some(country_name)) = (
            body.country_code.filter(|s| !s.is_empty()),
            body.country.filter(|s| !s.is_empty()),
        ) else {
            trace!(%addr, "GeoIP API has no country data");
            return Ok(None);
        };

        trace!(%addr, %country_code, "GeoIP API lookup succeeded");
        Ok(Some(GeoRecord::new(country_code, country_name)))
    }

    fn name(&self) -> &'static str {
        "HttpApi"
    }
}
