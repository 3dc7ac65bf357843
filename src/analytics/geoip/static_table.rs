//! Fixed in-memory geo-IP table
//!
//! Useful for tests, offline tooling and private networks whose
//! addresses no public database knows about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::provider::{GeoIpProvider, GeoIpResult};
use crate::analytics::models::GeoRecord;

#[derive(Debug, Default)]
pub struct StaticProvider {
    entries: HashMap<String, GeoRecord>,
    lookups: AtomicUsize,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style
    pub fn with_entry(mut self, ip: &str, record: GeoRecord) -> Self {
        self.entries.insert(ip.trim().to_string(), record);
        self
    }

    /// Number of `lookup` calls served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GeoIpProvider for StaticProvider {
    async fn lookup(&self, ip: &str) -> GeoIpResult<Option<GeoRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.get(ip.trim()).cloned())
    }

    fn name(&self) -> &'static str {
        "Static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_lookup_counts_calls() {
        let provider =
            StaticProvider::new().with_entry("198.51.100.4", GeoRecord::new("DE", "Germany"));

        let hit = provider.lookup("198.51.100.4").await.unwrap();
        let miss = provider.lookup("198.51.100.5").await.unwrap();

        assert_eq!(hit, Some(GeoRecord::new("DE", "Germany")));
        assert!(miss.is_none());
        assert_eq!(provider.lookup_count(), 2);
    }
}
