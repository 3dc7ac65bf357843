//! Visitor identity resolution and the visitor cookie

use axum::http::header::{HeaderValue, InvalidHeaderValue};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::analytics::request::RequestContext;

/// Durable identifier of a visitor, carried in a cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitorIdentity {
    pub id: String,
    /// True when the request carried no visitor cookie and `id` was minted
    pub first_visit: bool,
}

impl VisitorIdentity {
    /// Reuse the identifier from the visitor cookie, or mint a new one
    ///
    /// A cookie with an empty value (`_wva=`) counts as missing: a new
    /// identifier is minted and the visit is reported as a first visit.
    pub fn resolve(request: &RequestContext, cookie_name: &str) -> Self {
        match request.cookie(cookie_name).filter(|v| !v.is_empty()) {
            Some(id) => Self {
                id: id.to_string(),
                first_visit: false,
            },
            None => Self {
                id: mint_visitor_id(cookie_name, Utc::now()),
                first_visit: true,
            },
        }
    }
}

/// `<prefix>.<seconds:8 hex><micros:5 hex><random:8 hex>`
fn mint_visitor_id(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}.{:08x}{:05x}{:08x}",
        prefix,
        now.timestamp(),
        now.timestamp_subsec_micros(),
        rand::random::<u32>()
    )
}

/// Instruction for the hosting integration to persist the visitor cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub max_age_secs: u64,
    pub expires: DateTime<Utc>,
}

impl VisitorCookie {
    pub fn new(
        name: &str,
        value: &str,
        domain: Option<String>,
        max_age_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let max_age = i64::try_from(max_age_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let expires = now.checked_add_signed(max_age).unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            name: name.to_string(),
            value: value.to_string(),
            path: "/".to_string(),
            domain,
            max_age_secs,
            expires,
        }
    }

    /// Render as a `Set-Cookie` header value
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for VisitorCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Expires={}; Max-Age={}; Path={}",
            self.name,
            self.value,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.max_age_secs,
            self.path
        )?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        Ok(())
    }
}
