//! Cookie jar seam used to derive a request's `Cookie` header.
//!
//! Storage and matching policy belong to the jar; the preparer only asks
//! it for a header value.

use std::fmt;

use url::Url;

use crate::http::request::PreparedMessage;

/// A source of `Cookie` headers.
pub trait CookieJar: Send + Sync {
    /// The `Cookie` header value for `request`, or `None` if no cookie
    /// applies.
    fn cookie_header(&self, request: &PreparedMessage) -> Option<String>;

    /// An independent copy of this jar.
    fn clone_jar(&self) -> Box<dyn CookieJar>;
}

impl Clone for Box<dyn CookieJar> {
    fn clone(&self) -> Self {
        self.clone_jar()
    }
}

impl fmt::Debug for dyn CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CookieJar")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// `None` matches every host.
    pub domain: Option<String>,
    /// `None` matches every path.
    pub path: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn matches(&self, host: &str, path: &str) -> bool {
        let domain_ok = match &self.domain {
            None => true,
            Some(d) => {
                let d = d.trim_start_matches('.').to_ascii_lowercase();
                host == d || host.ends_with(&format!(".{d}"))
            }
        };
        let path_ok = match &self.path {
            None => true,
            Some(p) => {
                path == p
                    || (path.starts_with(p.as_str())
                        && (p.ends_with('/') || path[p.len()..].starts_with('/')))
            }
        };
        domain_ok && path_ok
    }
}

/// An in-memory jar with simple domain and path matching.
#[derive(Debug, Clone, Default)]
pub struct SimpleCookieJar {
    cookies: Vec<Cookie>,
}

impl SimpleCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A jar holding host-independent cookies from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut jar = Self::new();
        for (name, value) in pairs {
            jar.set(Cookie::new(name, value));
        }
        jar
    }

    /// Adds `cookie`, replacing one with the same name, domain and path.
    pub fn set(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| {
            !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        });
        self.cookies.push(cookie);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl CookieJar for SimpleCookieJar {
    fn cookie_header(&self, request: &PreparedMessage) -> Option<String> {
        let url = Url::parse(request.url()).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        let path = url.path();

        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(&host, path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    fn clone_jar(&self) -> Box<dyn CookieJar> {
        Box::new(self.clone())
    }
}
