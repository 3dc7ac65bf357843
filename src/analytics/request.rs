//! Request-scoped ambient state
//!
//! Everything the visitor accessors read from the incoming HTTP request is
//! captured here once, so the accessors never touch process-wide state.

use axum::http::{header, request::Parts, HeaderMap};
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    remote_addr: Option<String>,
    request_uri: String,
    server_name: Option<String>,
    cookies: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(headers: HeaderMap) -> Self {
        let cookies = parse_cookies(&headers);
        Self {
            headers,
            remote_addr: None,
            request_uri: "/".to_string(),
            server_name: None,
            cookies,
        }
    }

    /// Capture the state of an axum/http request and its connection address
    pub fn from_parts(parts: &Parts, remote_addr: Option<SocketAddr>) -> Self {
        let request_uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut ctx = Self::new(parts.headers.clone()).with_request_uri(request_uri);
        if let Some(addr) = remote_addr {
            ctx = ctx.with_remote_addr(addr.ip().to_string());
        }
        ctx
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_request_uri(mut self, uri: impl Into<String>) -> Self {
        self.request_uri = uri.into();
        self
    }

    /// Name of the virtual host as configured on the server side
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into()).filter(|n| !n.is_empty());
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|h| h.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Collect `name=value` pairs from every `Cookie` header; the first occurrence of a name wins
fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };

        for pair in value.split(';') {
            let Some((name, val)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let val = val.trim().trim_matches('"');
            cookies
                .entry(name.to_string())
                .or_insert_with(|| val.to_string());
        }
    }

    cookies
}
