//! GeoIP provider abstraction
//!
//! A provider maps an IP address to a country. Implementations:
//! - `HttpApiProvider`: external geo-IP web API (default)
//! - `MaxMindProvider`: local GeoLite2/GeoIP2 database
//! - `StaticProvider`: fixed in-memory table

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::http_api::HttpApiProvider;
use super::maxmind::MaxMindProvider;
use crate::analytics::models::GeoRecord;
use crate::config::{GeoIpBackend, GeoIpConfig};

/// Unexpected provider failure.
///
/// This is distinct from "no data for this IP", which providers report as `Ok(None)`.
#[derive(Debug, Error)]
pub enum GeoIpError {
    #[error("geo-IP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geo-IP database error: {0}")]
    Database(#[from] maxminddb::MaxMindDbError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type GeoIpResult<T> = Result<T, GeoIpError>;

#[async_trait]
pub trait GeoIpProvider: Send + Sync {
    /// Look up the country of an IP address
    ///
    /// Returns `Ok(None)` when the address cannot be resolved, including
    /// malformed input and transient network failures.
    async fn lookup(&self, ip: &str) -> GeoIpResult<Option<GeoRecord>>;

    /// Provider name used in log lines
    fn name(&self) -> &'static str;
}

/// Build the provider selected by configuration
///
/// A MaxMind backend whose database cannot be opened falls back to the HTTP API.
pub fn from_config(config: &GeoIpConfig) -> GeoIpResult<Arc<dyn GeoIpProvider>> {
    let provider: Arc<dyn GeoIpProvider> = match (&config.backend, &config.city_db_path) {
        (GeoIpBackend::Maxmind, Some(path)) => match MaxMindProvider::new(path) {
            Ok(provider) => {
                info!("GeoIP: Using MaxMind database at {}", path);
                Arc::new(provider)
            }
            Err(e) => {
                warn!(
                    "GeoIP: Failed to load MaxMind database at {}: {}, falling back to external API",
                    path, e
                );
                Arc::new(HttpApiProvider::from_config(config)?)
            }
        },
        (GeoIpBackend::Maxmind, None) => {
            warn!("GeoIP: MaxMind backend selected without a database path, using external API");
            Arc::new(HttpApiProvider::from_config(config)?)
        }
        (GeoIpBackend::Api, _) => {
            debug!("GeoIP: Using external API at {}", config.api_url);
            Arc::new(HttpApiProvider::from_config(config)?)
        }
    };

    info!("GeoIP: Initialized with {} provider", provider.name());
    Ok(provider)
}
