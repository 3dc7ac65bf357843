//! Client IP extraction from request headers
//!
//! Lookup order:
//! - client-IP header (e.g. `Client-IP`)
//! - forwarded-for header, originating (leftmost) entry
//! - socket remote address
//!
//! The address is reported as sent; it is not validated here. Providers
//! treat unparsable addresses as "not found".

use crate::analytics::request::RequestContext;
use crate::config::RequestHeaderNames;

/// Extract the client IP address of a request
///
/// # Arguments
/// * `request` - Captured request state
/// * `names` - Header names to consult
///
/// # Returns
/// The client address, or `None` when neither headers nor the connection provide one
pub fn extract_client_ip(request: &RequestContext, names: &RequestHeaderNames) -> Option<String> {
    if let Some(ip) = non_empty(request.header(&names.client_ip)) {
        return Some(ip.to_string());
    }

    if let Some(ip) = extract_forwarded_for(request, names) {
        return Some(ip);
    }

    non_empty(request.remote_addr()).map(str::to_string)
}

/// Originating client of an `X-Forwarded-For: client, proxy1, proxy2` chain
fn extract_forwarded_for(request: &RequestContext, names: &RequestHeaderNames) -> Option<String> {
    let xff = request.header(&names.forwarded_for)?;

    xff.split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
