//! Per-request visitor context
//!
//! A `VisitorContext` is created for one request, answers questions about the
//! visitor (device, location, referrer, page state) and is dropped with the
//! request. Geo-IP results are cached per IP for the lifetime of the context,
//! so repeated country lookups cost at most one provider call per address.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::analytics::beacon::Beacon;
use crate::analytics::geoip::{GeoIpError, GeoIpProvider, HttpApiProvider, DEFAULT_TIMEOUT};
use crate::analytics::ip_extractor::extract_client_ip;
use crate::analytics::models::{GeoLookupResult, PageView};
use crate::analytics::request::RequestContext;
use crate::analytics::sanitize::{sanitize_path, strip_port};
use crate::analytics::visitor::{VisitorCookie, VisitorIdentity};
use crate::config::{GeoIpConfig, VisitorConfig};

#[derive(Debug, Error)]
pub enum VisitorError {
    /// A provider returned a record missing a required field.
    ///
    /// Points at a broken provider integration, never at a missing address.
    #[error("invalid return value from the '{provider}' geo-IP provider: missing {field}")]
    InvalidProviderResult {
        provider: &'static str,
        field: &'static str,
    },
    #[error(transparent)]
    GeoIp(#[from] GeoIpError),
}

pub type VisitorResult<T> = Result<T, VisitorError>;

static DEFAULT_PROVIDER: OnceLock<Arc<dyn GeoIpProvider>> = OnceLock::new();

/// Shared HTTP API provider used when no provider is supplied
fn default_provider() -> VisitorResult<Arc<dyn GeoIpProvider>> {
    if let Some(provider) = DEFAULT_PROVIDER.get() {
        return Ok(Arc::clone(provider));
    }

    let provider: Arc<dyn GeoIpProvider> = Arc::new(HttpApiProvider::new(
        GeoIpConfig::DEFAULT_API_URL,
        DEFAULT_TIMEOUT,
    )?);
    Ok(Arc::clone(DEFAULT_PROVIDER.get_or_init(|| provider)))
}

pub struct VisitorContext {
    request: RequestContext,
    beacon: Beacon,
    identity: VisitorIdentity,
    settings: VisitorConfig,
    provider: Arc<dyn GeoIpProvider>,
    geo_cache: HashMap<String, GeoLookupResult>,
    cookie: Option<VisitorCookie>,
}

impl VisitorContext {
    /// Begin a request using the default HTTP geo-IP provider
    pub fn new(
        request: RequestContext,
        beacon: &str,
        settings: &VisitorConfig,
    ) -> VisitorResult<Self> {
        Ok(Self::with_provider(request, beacon, settings, default_provider()?))
    }

    /// Begin a request with an explicit geo-IP provider
    ///
    /// Resolves the visitor identifier from the request cookies and parses the
    /// beacon. On a first visit a cookie write is prepared, see [`Self::cookie_to_set`].
    pub fn with_provider(
        request: RequestContext,
        beacon: &str,
        settings: &VisitorConfig,
        provider: Arc<dyn GeoIpProvider>,
    ) -> Self {
        let identity = VisitorIdentity::resolve(&request, &settings.cookie_name);

        let mut ctx = Self {
            request,
            beacon: Beacon::parse(beacon),
            identity,
            settings: settings.clone(),
            provider,
            geo_cache: HashMap::new(),
            cookie: None,
        };

        if ctx.identity.first_visit {
            debug!(visitor_id = %ctx.identity.id, "New visitor");
            ctx.cookie = Some(VisitorCookie::new(
                &ctx.settings.cookie_name,
                &ctx.identity.id,
                ctx.domain_name(),
                ctx.settings.session_duration_secs,
                Utc::now(),
            ));
        }

        ctx
    }

    /// Replace the geo-IP provider; cached results stay valid
    pub fn set_geo_ip_provider(&mut self, provider: Arc<dyn GeoIpProvider>) {
        self.provider = provider;
    }

    /// Cookie the caller must set on the response, present on first visits only
    pub fn cookie_to_set(&self) -> Option<&VisitorCookie> {
        self.cookie.as_ref()
    }

    pub fn visitor_id(&self) -> &str {
        &self.identity.id
    }

    pub fn is_first_visit(&self) -> bool {
        self.identity.first_visit
    }

    pub fn beacon(&self) -> &Beacon {
        &self.beacon
    }

    pub fn browser_name(&self) -> Option<&str> {
        self.beacon.browser_name()
    }

    pub fn browser_major_version(&self) -> Option<&str> {
        self.beacon.browser_major_version()
    }

    pub fn os_name(&self) -> Option<&str> {
        self.beacon.os_name()
    }

    /// Device class reported by the beacon: desktop, mobile or tablet
    pub fn device_type(&self) -> Option<&str> {
        self.beacon.device_type()
    }

    /// Seconds the visitor spent on the page; meaningful on page exit
    ///
    /// Fractional beacon values are truncated to whole seconds (`4.7` reports `4`).
    pub fn time_on_page(&self) -> Option<u64> {
        self.beacon.time_on_page
    }

    pub fn total_time_on_site(&self) -> Option<u64> {
        self.beacon.total_time_on_site
    }

    /// Recorded when the page loads
    pub fn is_page_enter(&self) -> bool {
        self.beacon.is_page_enter()
    }

    /// Recorded when the visitor navigates away
    pub fn is_page_exit(&self) -> bool {
        self.beacon.is_page_exit()
    }

    /// Host name of the request, without port
    pub fn domain_name(&self) -> Option<String> {
        let names = &self.settings.headers;

        let host = self
            .request
            .header(&names.forwarded_host)
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .or_else(|| self.request.server_name())
            .or_else(|| self.request.header(&names.host))?;

        let host = strip_port(host.trim()).trim();
        (!host.is_empty()).then(|| host.to_string())
    }

    pub fn visitor_ip_address(&self) -> Option<String> {
        extract_client_ip(&self.request, &self.settings.headers)
    }

    /// Sanitized request path, safe to render in HTML
    pub fn current_path(&self) -> Option<String> {
        let path = sanitize_path(self.request.request_uri());
        (!path.is_empty()).then_some(path)
    }

    fn referrer_url(&self) -> Option<Url> {
        let raw = self.request.header(&self.settings.headers.referrer)?;
        Url::parse(raw.trim()).ok()
    }

    /// Host of an external referrer; same-site referrers are not reported
    pub fn referrer_domain(&self) -> Option<String> {
        let url = self.referrer_url()?;
        let host = url.host_str().filter(|h| !h.is_empty())?;

        if self
            .domain_name()
            .is_some_and(|domain| domain.eq_ignore_ascii_case(host))
        {
            return None;
        }

        Some(host.to_string())
    }

    /// Path of the referrer with its `?query` and `#fragment`
    ///
    /// Unavailable when the referrer names no path, e.g. `https://a.example?x=1`.
    pub fn referrer_path(&self) -> Option<String> {
        let raw = self.request.header(&self.settings.headers.referrer)?;
        if !has_explicit_path(raw.trim()) {
            return None;
        }

        let url = self.referrer_url()?;
        let mut path = url.path().to_string();
        if path.is_empty() {
            return None;
        }

        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            path.push('?');
            path.push_str(query);
        }
        if let Some(fragment) = url.fragment().filter(|f| !f.is_empty()) {
            path.push('#');
            path.push_str(fragment);
        }

        Some(path)
    }

    /// Two letter country code of the visitor
    ///
    /// # Errors
    /// [`VisitorError::InvalidProviderResult`] when the provider breaks its contract.
    pub async fn country_code(&mut self) -> VisitorResult<Option<String>> {
        Ok(self.geo_ip_info().await?.map(|geo| geo.country_code))
    }

    /// Country name of the visitor
    ///
    /// # Errors
    /// [`VisitorError::InvalidProviderResult`] when the provider breaks its contract.
    pub async fn country_name(&mut self) -> VisitorResult<Option<String>> {
        Ok(self.geo_ip_info().await?.map(|geo| geo.country_name))
    }

    /// Resolve the visitor's country, at most once per IP per context
    ///
    /// Provider failures are reported as "not found" and are not cached.
    async fn geo_ip_info(&mut self) -> VisitorResult<Option<GeoLookupResult>> {
        let Some(ip) = self.visitor_ip_address() else {
            debug!("No client address available for geo-IP lookup");
            return Ok(None);
        };

        if let Some(cached) = self.geo_cache.get(&ip) {
            debug!(%ip, "Geo-IP cache hit");
            return Ok(Some(cached.clone()));
        }

        let provider = self.provider.name();
        let record = match self.provider.lookup(&ip).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(%ip, provider, "Geo-IP lookup found nothing");
                return Ok(None);
            }
            Err(e) => {
                warn!(%ip, provider, error = %e, "Geo-IP provider failed, treating as not found");
                return Ok(None);
            }
        };

        let geo = GeoLookupResult::from_record(record)
            .map_err(|field| VisitorError::InvalidProviderResult { provider, field })?;

        self.geo_cache.insert(ip, geo.clone());
        Ok(Some(geo))
    }

    /// Collect every visitor fact into a single record
    pub async fn page_view(&mut self) -> VisitorResult<PageView> {
        let geo = self.geo_ip_info().await?;
        let (country_code, country_name) = match geo {
            Some(geo) => (Some(geo.country_code), Some(geo.country_name)),
            None => (None, None),
        };

        Ok(PageView {
            visitor_id: self.identity.id.clone(),
            first_visit: self.is_first_visit(),
            page_enter: self.is_page_enter(),
            page_exit: self.is_page_exit(),
            domain: self.domain_name(),
            path: self.current_path(),
            client_ip: self.visitor_ip_address(),
            country_code,
            country_name,
            browser_name: self.browser_name().map(str::to_string),
            browser_major_version: self.browser_major_version().map(str::to_string),
            os_name: self.os_name().map(str::to_string),
            device_type: self.device_type().map(str::to_string),
            time_on_page: self.time_on_page(),
            total_time_on_site: self.total_time_on_site(),
            referrer_domain: self.referrer_domain(),
            referrer_path: self.referrer_path(),
            timestamp: Utc::now().timestamp(),
        })
    }
}

/// Whether a URL spells out a path after its authority
///
/// `Url::path` reports `/` for `https://a.example`, so the raw text is checked.
fn has_explicit_path(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once("://") else {
        return true;
    };

    match rest.find(['/', '?', '#']) {
        Some(idx) => rest[idx..].starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::geoip::{GeoIpResult, StaticProvider};
    use crate::analytics::models::GeoRecord;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(headers: &[(&'static str, &'static str)]) -> RequestContext {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        RequestContext::new(map)
    }

    fn context(request: RequestContext, beacon: &str) -> VisitorContext {
        VisitorContext::with_provider(
            request,
            beacon,
            &VisitorConfig::default(),
            Arc::new(StaticProvider::new()),
        )
    }

    /// Fails on the first call, succeeds afterwards
    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoIpProvider for FlakyProvider {
        async fn lookup(&self, _ip: &str) -> GeoIpResult<Option<GeoRecord>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GeoIpError::Other(anyhow::anyhow!("connection reset")));
            }
            Ok(Some(GeoRecord::new("FR", "France")))
        }

        fn name(&self) -> &'static str {
            "Flaky"
        }
    }

    #[test]
    fn test_domain_prefers_forwarded_host() {
        let ctx = context(
            request(&[
                ("x-forwarded-host", " proxy.example.com:8443 , inner.example.com"),
                ("host", "backend:8080"),
            ]),
            "",
        );
        assert_eq!(ctx.domain_name().as_deref(), Some("proxy.example.com"));
    }

    #[test]
    fn test_domain_server_name_then_host() {
        let ctx = context(
            request(&[("host", "backend:8080")]).with_server_name("www.example.com"),
            "",
        );
        assert_eq!(ctx.domain_name().as_deref(), Some("www.example.com"));

        let ctx = context(request(&[("host", "backend:8080")]), "");
        assert_eq!(ctx.domain_name().as_deref(), Some("backend"));

        let ctx = context(request(&[]), "");
        assert_eq!(ctx.domain_name(), None);
    }

    #[test]
    fn test_current_path_is_sanitized() {
        let ctx = context(
            request(&[]).with_request_uri("/docs/%3Cb%3Eintro%3C/b%3E?x=%22y%22"),
            "",
        );
        assert_eq!(ctx.current_path().as_deref(), Some("/docs/intro?x=&quot;y&quot;"));
    }

    #[test]
    fn test_referrer_without_path_parts() {
        let ctx = context(
            request(&[("referer", "https://search.example/results")]),
            "",
        );
        assert_eq!(ctx.referrer_domain().as_deref(), Some("search.example"));
        assert_eq!(ctx.referrer_path().as_deref(), Some("/results"));
    }

    #[test]
    fn test_referrer_without_explicit_path() {
        for referer in ["https://a.example", "https://a.example?x=1", "https://a.example#top"] {
            let ctx = context(request(&[("host", "other.com"), ("referer", referer)]), "");
            assert_eq!(ctx.referrer_path(), None, "referer: {referer}");
            assert_eq!(ctx.referrer_domain().as_deref(), Some("a.example"));
        }

        let ctx = context(
            request(&[("host", "other.com"), ("referer", "https://a.example/?x=1")]),
            "",
        );
        assert_eq!(ctx.referrer_path().as_deref(), Some("/?x=1"));
    }

    #[test]
    fn test_has_explicit_path() {
        assert!(has_explicit_path("https://a.example/"));
        assert!(has_explicit_path("https://user@a.example:8080/x"));
        assert!(!has_explicit_path("https://a.example:8080"));
        assert!(!has_explicit_path("https://a.example?next=/x"));
    }

    #[test]
    fn test_unparsable_referrer() {
        let ctx = context(request(&[("referer", "not a url")]), "");
        assert_eq!(ctx.referrer_domain(), None);
        assert_eq!(ctx.referrer_path(), None);
    }

    #[test]
    fn test_first_visit_prepares_cookie() {
        let ctx = context(request(&[("host", "example.com")]), "");
        let cookie = ctx.cookie_to_set().expect("cookie on first visit");
        assert_eq!(cookie.value, ctx.visitor_id());
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(cookie.max_age_secs, 1800);
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn test_new_uses_default_provider() {
        let ctx = VisitorContext::new(request(&[]), "", &VisitorConfig::default()).unwrap();
        assert_eq!(ctx.provider.name(), "HttpApi");
    }

    #[tokio::test]
    async fn test_no_address_means_no_lookup() {
        let provider = Arc::new(StaticProvider::new());
        let mut ctx = VisitorContext::with_provider(
            request(&[]),
            "",
            &VisitorConfig::default(),
            provider.clone(),
        );

        assert_eq!(ctx.country_code().await.unwrap(), None);
        assert_eq!(provider.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_is_not_found_and_not_cached() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let mut ctx = VisitorContext::with_provider(
            request(&[("client-ip", "198.51.100.20")]),
            "",
            &VisitorConfig::default(),
            provider.clone(),
        );

        assert_eq!(ctx.country_code().await.unwrap(), None);
        assert_eq!(ctx.country_code().await.unwrap().as_deref(), Some("FR"));
        assert_eq!(ctx.country_name().await.unwrap().as_deref(), Some("France"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_page_view_uses_a_single_lookup() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let mut ctx = VisitorContext::with_provider(
            request(&[("client-ip", "198.51.100.20")]),
            "",
            &VisitorConfig::default(),
            provider.clone(),
        );

        let view = ctx.page_view().await.unwrap();
        assert_eq!(view.country_code, None);
        assert_eq!(view.country_name, None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let view = ctx.page_view().await.unwrap();
        assert_eq!(view.country_code.as_deref(), Some("FR"));
        assert_eq!(view.country_name.as_deref(), Some("France"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_geo_ip_provider_keeps_cache() {
        let first = Arc::new(
            StaticProvider::new().with_entry("203.0.113.5", GeoRecord::new("JP", "Japan")),
        );
        let second = Arc::new(StaticProvider::new());
        let mut ctx = VisitorContext::with_provider(
            request(&[("client-ip", "203.0.113.5")]),
            "",
            &VisitorConfig::default(),
            first.clone(),
        );

        assert_eq!(ctx.country_code().await.unwrap().as_deref(), Some("JP"));
        ctx.set_geo_ip_provider(second.clone());
        assert_eq!(ctx.country_name().await.unwrap().as_deref(), Some("Japan"));
        assert_eq!(second.lookup_count(), 0);
    }
}
