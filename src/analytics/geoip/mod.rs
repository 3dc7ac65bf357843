//! GeoIP lookup providers
//!
//! Country resolution for visitor IP addresses, backed by:
//! - an external geo-IP web API (default)
//! - a local MaxMind GeoLite2/GeoIP2 database
//! - a static in-memory table

mod http_api;
mod maxmind;
mod provider;
mod static_table;

pub use http_api::{HttpApiProvider, DEFAULT_TIMEOUT};
pub use maxmind::MaxMindProvider;
pub use provider::{from_config, GeoIpError, GeoIpProvider, GeoIpResult};
pub use static_table::StaticProvider;
