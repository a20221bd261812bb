use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::http::auth::Auth;
use crate::http::body::{self, Body, BodyPosition, Data, Params};
use crate::http::cookies::{CookieJar, SimpleCookieJar};
use crate::http::headers::{Headers, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use crate::http::hooks::{HookBearing, HookRegistry, HookSpec};
use crate::http::multipart::{self, FilePart};
use crate::http::uri;

/// HTTP request methods.
///
/// Parsing upper-cases the input, so `"get"` and `"GET"` are the same
/// method. Anything outside the standard set is kept as an extension method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other token, stored upper-cased
    Extension(String),
}

impl Method {
    /// Parses an HTTP method from a string, ignoring case.
    ///
    /// # Example
    ///
    /// ```
    /// # use missive::http::request::Method;
    /// assert_eq!(Method::parse("get"), Method::GET);
    /// assert_eq!(Method::parse("purge"), Method::Extension("PURGE".into()));
    /// ```
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            _ => Method::Extension(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Extension(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-built request description.
///
/// Nothing is validated until [`RequestSpec::prepare`] runs.
///
/// # Example
///
/// ```
/// # use missive::http::request::RequestSpec;
/// let prepared = RequestSpec::new("post", "http://example.com/form")
///     .form([("name", "value")])
///     .prepare()
///     .unwrap();
/// assert_eq!(prepared.method().as_str(), "POST");
/// assert_eq!(prepared.headers().get("content-length"), Some("10"));
/// ```
#[derive(Clone, Default)]
pub struct RequestSpec {
    pub method: Option<String>,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub files: Vec<(String, FilePart)>,
    pub data: Data,
    pub json: Option<serde_json::Value>,
    pub params: Params,
    pub auth: Option<Auth>,
    pub cookies: Option<Box<dyn CookieJar>>,
    pub hooks: HookRegistry,
}

impl RequestSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn data(mut self, data: impl Into<Data>) -> Self {
        self.data = data.into();
        self
    }

    /// Sets form fields as the body.
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<body::Value>,
        V: Into<body::FieldValue>,
    {
        self.data = Data::Form(fields.into_iter().collect());
        self
    }

    pub fn file(mut self, key: impl Into<String>, part: impl Into<FilePart>) -> Self {
        self.files.push((key.into(), part.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    pub fn auth(mut self, auth: impl Into<Auth>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    pub fn cookies<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.cookies = Some(Box::new(SimpleCookieJar::from_pairs(pairs)));
        self
    }

    pub fn cookie_jar(mut self, jar: impl CookieJar + 'static) -> Self {
        self.cookies = Some(Box::new(jar));
        self
    }

    /// Registers a hook; unknown events are rejected immediately.
    pub fn hook(mut self, event: &str, spec: impl Into<HookSpec>) -> Result<Self> {
        self.hooks.register(event, spec)?;
        Ok(self)
    }

    /// Builds the wire-ready message.
    pub fn prepare(&self) -> Result<PreparedMessage> {
        let mut p = PreparedMessage::new();
        p.prepare(self)?;
        Ok(p)
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("files", &self.files.len())
            .field("data", &self.data)
            .field("json", &self.json)
            .field("params", &self.params)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// A fully resolved request, ready for a transport.
///
/// `Clone` yields an independent copy: headers and the cookie jar are
/// copied, while the body is shared (byte bodies are reference counted and
/// stream bodies share one reader).
#[derive(Clone, Debug)]
pub struct PreparedMessage {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<Body>,
    body_position: BodyPosition,
    hooks: HookRegistry,
    cookies: Option<Box<dyn CookieJar>>,
}

impl Default for PreparedMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparedMessage {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            url: String::new(),
            headers: Headers::new(),
            body: None,
            body_position: BodyPosition::Unset,
            hooks: HookRegistry::new(),
            cookies: None,
        }
    }

    /// Runs every preparation stage in order.
    ///
    /// Auth runs after the body so handlers see the complete message, and
    /// hooks come last because an auth handler may register its own.
    pub fn prepare(&mut self, spec: &RequestSpec) -> Result<()> {
        self.prepare_method(spec.method.as_deref())?;
        self.prepare_url(&spec.url, &spec.params)?;
        self.prepare_headers(&spec.headers)?;
        self.prepare_cookies(spec.cookies.as_deref());
        self.prepare_body(&spec.data, &spec.files, spec.json.as_ref())?;
        self.prepare_auth(spec.auth.as_ref())?;
        self.prepare_hooks(&spec.hooks)?;

        tracing::debug!(
            method = %self.method,
            url = %self.url,
            headers = self.headers.len(),
            "Prepared request"
        );
        Ok(())
    }

    pub fn prepare_method(&mut self, method: Option<&str>) -> Result<()> {
        let method = method.ok_or_else(|| {
            Error::InvalidValue("Request method cannot be \"None\"".to_string())
        })?;
        self.method = Method::parse(method);
        Ok(())
    }

    pub fn prepare_url(&mut self, url: &str, params: &Params) -> Result<()> {
        self.url = uri::normalize_url(url, params)?;
        Ok(())
    }

    /// Replaces the headers with `headers`, validating each pair.
    pub fn prepare_headers(&mut self, headers: &[(String, String)]) -> Result<()> {
        self.headers = Headers::try_from_pairs(headers.iter().cloned())?;
        Ok(())
    }

    /// Stores a copy of `jar` and derives the `Cookie` header from it.
    ///
    /// An existing `Cookie` header is left alone, so calling this again has
    /// no effect until that header is removed.
    pub fn prepare_cookies(&mut self, jar: Option<&dyn CookieJar>) {
        let jar: Box<dyn CookieJar> = match jar {
            Some(jar) => jar.clone_jar(),
            None => Box::new(SimpleCookieJar::new()),
        };
        if !self.headers.contains("Cookie") {
            if let Some(value) = jar.cookie_header(self) {
                self.headers.insert("Cookie", value);
            }
        }
        self.cookies = Some(jar);
    }

    /// Encodes `data`, `files` or `json` into the body.
    pub fn prepare_body(
        &mut self,
        data: &Data,
        files: &[(String, FilePart)],
        json: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut body = None;
        let mut content_type: Option<String> = None;

        if data.is_empty() {
            if let Some(json) = json {
                body = Some(Body::Bytes(Bytes::from(serde_json::to_vec(json)?)));
                content_type = Some("application/json".to_string());
            }
        }

        if let Data::Stream(stream) = data {
            self.body_position = body::capture_position(stream);
            if !files.is_empty() {
                return Err(Error::ConflictingBody);
            }
            body = Some(Body::Stream(stream.clone()));
        } else {
            if !files.is_empty() {
                let (encoded, ct) = multipart::encode_files(files, data)?;
                body = Some(Body::Bytes(encoded));
                content_type = Some(ct);
            } else if !data.is_empty() {
                body = body::encode_data(data);
                if let Data::Form(_) = data {
                    content_type = Some("application/x-www-form-urlencoded".to_string());
                }
            }

            if let Some(ct) = content_type {
                if !self.headers.contains(CONTENT_TYPE) {
                    self.headers.insert(CONTENT_TYPE, ct);
                }
            }
        }

        self.prepare_content_length(body.as_ref())?;
        self.body = body;
        Ok(())
    }

    /// Sets `Content-Length` or `Transfer-Encoding` for `body`.
    ///
    /// Fails when the body has neither a length nor stream capability, or
    /// when both headers end up present.
    pub fn prepare_content_length(&mut self, body: Option<&Body>) -> Result<()> {
        match body {
            Some(body) => match body.len() {
                Some(len) if len > 0 => {
                    self.headers.insert(CONTENT_LENGTH, len.to_string());
                }
                _ if body.is_stream() => {
                    self.headers.insert(TRANSFER_ENCODING, "chunked");
                }
                _ => {
                    return Err(Error::InvalidBody(
                        "Non-null body must have length or be streamable.".to_string(),
                    ));
                }
            },
            None => {
                if !matches!(self.method, Method::GET | Method::HEAD)
                    && !self.headers.contains(CONTENT_LENGTH)
                {
                    self.headers.insert(CONTENT_LENGTH, "0");
                }
            }
        }

        if self.headers.contains(TRANSFER_ENCODING) && self.headers.contains(CONTENT_LENGTH) {
            return Err(Error::InvalidHeader(
                "Conflicting Headers: Both Transfer-Encoding and Content-Length are set."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Applies `auth`, or credentials embedded in the URL when `auth` is
    /// `None`, then re-checks the length headers.
    pub fn prepare_auth(&mut self, auth: Option<&Auth>) -> Result<()> {
        let from_url;
        let auth = match auth {
            Some(auth) => auth,
            None => {
                let (user, pass) = uri::auth_from_url(&self.url);
                if user.is_empty() && pass.is_empty() {
                    return Ok(());
                }
                from_url = Auth::from((user, pass));
                &from_url
            }
        };

        // A failing handler must leave this message untouched.
        let updated = auth.apply(self.clone())?;
        self.merge_auth_result(updated);

        tracing::debug!(url = %self.url, "Applied request auth");
        let body = self.body.clone();
        self.prepare_content_length(body.as_ref())
    }

    /// Copies back every field an auth handler is allowed to change.
    fn merge_auth_result(&mut self, updated: PreparedMessage) {
        let PreparedMessage {
            method,
            url,
            headers,
            body,
            body_position,
            hooks,
            cookies,
        } = updated;
        self.method = method;
        self.url = url;
        self.headers = headers;
        self.body = body;
        self.body_position = body_position;
        self.hooks = hooks;
        self.cookies = cookies;
    }

    /// Registers every hook in `hooks` on this message.
    pub fn prepare_hooks(&mut self, hooks: &HookRegistry) -> Result<()> {
        for (event, list) in hooks.iter() {
            self.hooks.register(event, list.to_vec())?;
        }
        Ok(())
    }

    /// Seeks a stream body back to where it was when prepared.
    pub fn rewind_body(&self) -> Result<()> {
        body::rewind(self.body.as_ref(), self.body_position)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request target: path plus query string.
    pub fn path_url(&self) -> String {
        uri::path_url(&self.url)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Replaces the body without touching headers; auth handlers that sign
    /// or rewrite the payload use this.
    pub fn set_body(&mut self, body: Option<Body>) {
        self.body = body;
    }

    pub fn body_position(&self) -> BodyPosition {
        self.body_position
    }

    pub fn cookies(&self) -> Option<&dyn CookieJar> {
        self.cookies.as_deref()
    }
}

impl HookBearing for RequestSpec {
    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }
}

impl HookBearing for PreparedMessage {
    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }
}
