//! Sanitization helpers for request-derived strings
//!
//! The request path ends up in analytics dashboards, so it is decoded,
//! stripped of markup and entity-encoded before it leaves this crate.

use std::borrow::Cow;

/// Decode, strip tags, entity-encode and trim a raw request path
pub fn sanitize_path(raw: &str) -> String {
    let decoded = url_decode(raw);
    let stripped = strip_tags(&decoded);
    encode_entities(&stripped).trim().to_string()
}

/// Form-style URL decoding: `+` becomes a space, malformed escapes are kept as-is
pub fn url_decode(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    let bytes = urlencoding::decode_binary(plus_decoded.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Remove `<...>` markup, including comments and tags with quoted `>` in attributes
///
/// A `<` followed by whitespace is text, not a tag. An unterminated tag
/// swallows the rest of the input.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some(next) if !next.is_whitespace() => {}
            _ => {
                out.push(c);
                continue;
            }
        }

        let mut quote: Option<char> = None;
        for t in chars.by_ref() {
            match (quote, t) {
                (Some(q), t) if t == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(t),
                (None, '>') => break,
                (None, _) => {}
            }
        }
    }

    out
}

/// Entity-encode `& < > " '`
pub fn encode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Drop a trailing `:port` from a host
pub fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
