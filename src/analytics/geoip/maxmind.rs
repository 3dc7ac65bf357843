//! GeoIP lookup using MaxMind GeoLite2/GeoIP2 MMDB
//!
//! Country data is read from a memory-mapped City or Country database.

use anyhow::Context;
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::trace;

use super::provider::{GeoIpProvider, GeoIpResult};
use crate::analytics::models::GeoRecord;

/// MaxMind database provider
#[derive(Clone)]
pub struct MaxMindProvider {
    reader: Arc<Reader<Mmap>>,
}

impl MaxMindProvider {
    /// Open a GeoLite2-City, GeoIP2-City or Country .mmdb file
    pub fn new(path: &str) -> GeoIpResult<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP database at {}", path))?;

        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    fn lookup_addr(&self, ip: IpAddr) -> GeoIpResult<Option<GeoRecord>> {
        let result = self.reader.lookup(ip)?;

        // The City database is a superset of Country data, so decoding as
        // Country works for either database type.
        let Some(country) = result.decode::<geoip2::Country>()? else {
            return Ok(None);
        };

        Ok(country_record(
            country.country.iso_code,
            country.country.names.english,
        ))
    }
}

/// Build a record only when the database knows both the code and the English name
fn country_record(iso_code: Option<&str>, name: Option<&str>) -> Option<GeoRecord> {
    match (iso_code, name) {
        (Some(code), Some(name)) if !code.is_empty() && !name.is_empty() => {
            Some(GeoRecord::new(code, name))
        }
        _ => None,
    }
}

#[async_trait]
impl GeoIpProvider for MaxMindProvider {
    async fn lookup(&self, ip: &str) -> GeoIpResult<Option<GeoRecord>> {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return Ok(None);
        };

        let record = self.lookup_addr(addr)?;
        trace!("MaxMind lookup for {}: {:?}", addr, record);
        Ok(record)
    }

    fn name(&self) -> &'static str {
        "MaxMind"
    }
}
