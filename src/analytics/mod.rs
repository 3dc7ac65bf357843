//! Visitor analytics module
//!
//! Extracts page-view facts (device, browser, country, referrer, time on
//! page) from an incoming request and the client beacon, and keeps track of
//! returning visitors through a cookie.

pub mod beacon;
pub mod context;
pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod request;
pub mod sanitize;
pub mod visitor;

// Re-export commonly used types
pub use beacon::{Beacon, DeviceProperties, PageState};
pub use context::{VisitorContext, VisitorError, VisitorResult};
pub use geoip::{GeoIpError, GeoIpProvider, HttpApiProvider, MaxMindProvider, StaticProvider};
pub use ip_extractor::extract_client_ip;
pub use models::{GeoLookupResult, GeoRecord, PageView};
pub use request::RequestContext;
pub use visitor::{VisitorCookie, VisitorIdentity};
