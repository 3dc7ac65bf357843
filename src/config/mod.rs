use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub visitor: VisitorConfig,
    pub geoip: GeoIpConfig,
}

/// Visitor cookie and request header settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorConfig {
    /// Name of the cookie carrying the visitor identifier
    pub cookie_name: String,
    /// Sliding expiration window of the visitor cookie, in seconds
    pub session_duration_secs: u64,
    #[serde(default)]
    pub headers: RequestHeaderNames,
}

/// Names of the ambient request headers consulted by the accessors.
///
/// Hosting integrations behind different proxies rename these, so none of
/// them is hard-coded in the accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHeaderNames {
    pub forwarded_host: String,
    pub client_ip: String,
    pub forwarded_for: String,
    pub referrer: String,
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoIpBackend {
    Api,
    Maxmind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    pub backend: GeoIpBackend,
    /// Base URL of the geo-IP web API, requests go to `{api_url}/geoip/{ip}`
    pub api_url: String,
    #[serde(default = "GeoIpConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Path to a GeoLite2/GeoIP2 City or Country database
    #[serde(default)]
    pub city_db_path: Option<String>,
}

impl VisitorConfig {
    pub const DEFAULT_COOKIE_NAME: &'static str = "_wva";
    pub const DEFAULT_SESSION_DURATION_SECS: u64 = 1800;
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            cookie_name: Self::DEFAULT_COOKIE_NAME.to_string(),
            session_duration_secs: Self::DEFAULT_SESSION_DURATION_SECS,
            headers: RequestHeaderNames::default(),
        }
    }
}

impl Default for RequestHeaderNames {
    fn default() -> Self {
        Self {
            forwarded_host: "x-forwarded-host".to_string(),
            client_ip: "client-ip".to_string(),
            forwarded_for: "x-forwarded-for".to_string(),
            referrer: "referer".to_string(),
            host: "host".to_string(),
        }
    }
}

impl GeoIpConfig {
    pub const DEFAULT_API_URL: &'static str = "http://www.telize.com";

    const fn default_timeout_secs() -> u64 {
        3
    }
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            backend: GeoIpBackend::Api,
            api_url: Self::DEFAULT_API_URL.to_string(),
            timeout_secs: Self::default_timeout_secs(),
            city_db_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let cookie_name = std::env::var("VISITOR_COOKIE_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| VisitorConfig::DEFAULT_COOKIE_NAME.to_string());

        let session_duration_secs = match std::env::var("VISITOR_SESSION_DURATION_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .context("VISITOR_SESSION_DURATION_SECS must be a whole number of seconds")?,
            Err(_) => VisitorConfig::DEFAULT_SESSION_DURATION_SECS,
        };

        let defaults = RequestHeaderNames::default();
        let header = |key: &str, fallback: String| {
            std::env::var(key)
                .map(|v| v.to_lowercase())
                .unwrap_or(fallback)
        };
        let headers = RequestHeaderNames {
            forwarded_host: header("HEADER_FORWARDED_HOST", defaults.forwarded_host),
            client_ip: header("HEADER_CLIENT_IP", defaults.client_ip),
            forwarded_for: header("HEADER_FORWARDED_FOR", defaults.forwarded_for),
            referrer: defaults.referrer,
            host: defaults.host,
        };

        let backend = match std::env::var("GEOIP_PROVIDER")
            .unwrap_or_else(|_| "api".to_string())
            .to_lowercase()
            .as_str()
        {
            "api" => GeoIpBackend::Api,
            "maxmind" | "mmdb" => GeoIpBackend::Maxmind,
            other => {
                tracing::warn!(
                    "Unknown GEOIP_PROVIDER '{other}', falling back to 'api'. Supported values: api, maxmind"
                );
                GeoIpBackend::Api
            }
        };

        let api_url = std::env::var("GEOIP_API_URL")
            .unwrap_or_else(|_| GeoIpConfig::DEFAULT_API_URL.to_string());

        let timeout_secs = std::env::var("GEOIP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(GeoIpConfig::default_timeout_secs);

        let city_db_path = std::env::var("GEOIP_CITY_DB_PATH").ok();

        if matches!(backend, GeoIpBackend::Maxmind) && city_db_path.is_none() {
            tracing::warn!("GEOIP_PROVIDER=maxmind but GEOIP_CITY_DB_PATH is not set");
        }

        Ok(Config {
            visitor: VisitorConfig {
                cookie_name,
                session_duration_secs,
                headers,
            },
            geoip: GeoIpConfig {
                backend,
                api_url,
                timeout_secs,
                city_db_path,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visitor_defaults() {
        let config = VisitorConfig::default();
        assert_eq!(config.cookie_name, "_wva");
        assert_eq!(config.session_duration_secs, 1800);
        assert_eq!(config.headers.forwarded_for, "x-forwarded-for");
    }

    #[test]
    fn test_geoip_defaults() {
        let config = GeoIpConfig::default();
        assert!(matches!(config.backend, GeoIpBackend::Api));
        assert_eq!(config.timeout_secs, 3);
        assert!(config.city_db_path.is_none());
    }

    #[test]
    fn test_geoip_config_deserialize_fills_defaults() {
        let config: GeoIpConfig =
            serde_json::from_str(r#"{"backend":"maxmind","api_url":"http://geo.local"}"#).unwrap();
        assert!(matches!(config.backend, GeoIpBackend::Maxmind));
        assert_eq!(config.timeout_secs, 3);
    }
}
