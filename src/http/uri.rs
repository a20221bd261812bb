//! URL validation and normalization.
//!
//! HTTP URLs are split per RFC 3986, checked for a scheme and a host,
//! IDNA-encoded when the host is not ASCII, given a default `/` path and
//! any extra query parameters, and finally canonicalized with [`url::Url`].
//! URLs with other schemes (`mailto:`, `data:`, ...) pass through untouched.

use url::{Host, Url};

use crate::error::{Error, Result};
use crate::http::body::Params;

/// Components of a URI reference, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UriParts<'a> {
    scheme: Option<&'a str>,
    authority: Option<&'a str>,
    path: &'a str,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

impl<'a> UriParts<'a> {
    /// Splits `input` following RFC 3986 Appendix B.
    fn split(input: &'a str) -> Self {
        let mut rest = input;

        let (fragment, before) = match rest.split_once('#') {
            Some((before, frag)) => (Some(frag), before),
            None => (None, rest),
        };
        rest = before;

        let (query, before) = match rest.split_once('?') {
            Some((before, q)) => (Some(q), before),
            None => (None, rest),
        };
        rest = before;

        let scheme_end = rest.find(':').filter(|&i| {
            i > 0 && !rest[..i].contains('/')
        });
        let scheme = scheme_end.map(|i| &rest[..i]);
        if let Some(i) = scheme_end {
            rest = &rest[i + 1..];
        }

        let (authority, path) = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find('/').unwrap_or(after.len());
                (Some(&after[..end]), &after[end..])
            }
            None => (None, rest),
        };

        Self {
            scheme,
            authority,
            path,
            query,
            fragment,
        }
    }
}

/// Splits an authority into `(userinfo@, host, :port)` slices.
fn split_authority(authority: &str) -> (&str, &str, &str) {
    let (userinfo, hostport) = match authority.rfind('@') {
        Some(i) => authority.split_at(i + 1),
        None => ("", authority),
    };

    if hostport.starts_with('[') {
        if let Some(end) = hostport.find(']') {
            let (host, port) = hostport.split_at(end + 1);
            return (userinfo, host, port);
        }
        return (userinfo, hostport, "");
    }

    match hostport.rfind(':') {
        Some(i) if hostport[i + 1..].bytes().all(|b| b.is_ascii_digit()) => {
            let (host, port) = hostport.split_at(i);
            (userinfo, host, port)
        }
        _ => (userinfo, hostport, ""),
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut bytes = scheme.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

/// Encodes a non-ASCII host with IDNA (UTS-46).
fn idna_encode_host(host: &str) -> Result<String> {
    match Host::parse(host) {
        Ok(Host::Domain(domain)) => Ok(domain),
        Ok(other) => Ok(other.to_string()),
        Err(_) => Err(Error::InvalidUrl("URL has an invalid label.".to_string())),
    }
}

/// Upper-cases the hex digits of every percent escape.
fn uppercase_percent_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push('%');
            out.push(bytes[i + 1].to_ascii_uppercase() as char);
            out.push(bytes[i + 2].to_ascii_uppercase() as char);
            i += 3;
            continue;
        }
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// Normalizes a URL given as raw bytes; the bytes must be UTF-8.
pub fn normalize_url_bytes(raw: &[u8], params: &Params) -> Result<String> {
    let url = std::str::from_utf8(raw)
        .map_err(|_| Error::InvalidUrl("Invalid URL: not valid UTF-8.".to_string()))?;
    normalize_url(url, params)
}

/// Validates `raw`, appends `params` to its query, and returns the
/// canonical form.
pub fn normalize_url(raw: &str, params: &Params) -> Result<String> {
    let url = raw.trim();

    if url.contains(':') && !url.to_ascii_lowercase().starts_with("http") {
        return Ok(url.to_string());
    }

    let parts = UriParts::split(url);

    let scheme = match parts.scheme {
        Some(s) if is_valid_scheme(s) => s,
        Some(_) => {
            return Err(Error::InvalidUrl(format!(
                "Invalid URL {url:?}: URL is improper."
            )));
        }
        None => {
            return Err(Error::MissingScheme(format!(
                "Invalid URL {url:?}: No scheme supplied. Perhaps you meant http://{url}?"
            )));
        }
    };

    let authority = parts.authority.unwrap_or("");
    let (userinfo, host, port) = split_authority(authority);
    if host.is_empty() {
        return Err(Error::InvalidUrl(format!(
            "Invalid URL {url:?}: No host supplied"
        )));
    }

    let host = if !host.is_ascii() {
        idna_encode_host(host)?
    } else if host.starts_with('*') {
        return Err(Error::InvalidUrl("URL has an invalid label.".to_string()));
    } else {
        host.to_string()
    };

    let path = if parts.path.is_empty() { "/" } else { parts.path };

    let encoded = params.encode();
    let query = match (parts.query, encoded.is_empty()) {
        (Some(q), false) if !q.is_empty() => Some(format!("{q}&{encoded}")),
        (_, false) => Some(encoded),
        (q, true) => q.map(str::to_string),
    };

    let mut assembled = format!("{scheme}://{userinfo}{host}{port}{path}");
    if let Some(q) = &query {
        assembled.push('?');
        assembled.push_str(q);
    }
    if let Some(f) = parts.fragment {
        assembled.push('#');
        assembled.push_str(f);
    }

    let normalized = Url::parse(&assembled)
        .map_err(|e| Error::InvalidUrl(format!("Invalid URL {url:?}: {e}")))?;

    let result = uppercase_percent_escapes(normalized.as_str());
    tracing::trace!(input = url, url = %result, "Normalized URL");
    Ok(result)
}

/// Extracts percent-decoded `(username, password)` from a URL's authority.
///
/// Missing parts come back as empty strings.
pub fn auth_from_url(url: &str) -> (String, String) {
    let Ok(parsed) = Url::parse(url) else {
        return (String::new(), String::new());
    };
    let decode = |s: &str| {
        percent_encoding::percent_decode_str(s)
            .decode_utf8_lossy()
            .into_owned()
    };
    (
        decode(parsed.username()),
        parsed.password().map(decode).unwrap_or_default(),
    )
}

/// The request target for a URL: its path (or `/`) plus `?query`.
pub fn path_url(url: &str) -> String {
    let parts = UriParts::split(url);
    let mut out = if parts.path.is_empty() {
        "/".to_string()
    } else {
        parts.path.to_string()
    };
    if let Some(q) = parts.query.filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(q);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_full_reference() {
        let parts = UriParts::split("https://user:pw@host:8080/a/b?x=1#frag");
        assert_eq!(parts.scheme, Some("https"));
        assert_eq!(parts.authority, Some("user:pw@host:8080"));
        assert_eq!(parts.path, "/a/b");
        assert_eq!(parts.query, Some("x=1"));
        assert_eq!(parts.fragment, Some("frag"));
    }

    #[test]
    fn split_authority_with_ipv6() {
        assert_eq!(split_authority("[::1]:80"), ("", "[::1]", ":80"));
        assert_eq!(split_authority("u@h"), ("u@", "h", ""));
    }

    #[test]
    fn percent_escapes_are_uppercased() {
        assert_eq!(uppercase_percent_escapes("/a%2fb%7e"), "/a%2Fb%7E");
        assert_eq!(uppercase_percent_escapes("/é%"), "/é%");
    }
}
