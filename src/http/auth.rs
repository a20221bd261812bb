//! Request authentication.

use std::fmt;
use std::sync::Arc;

use base64::Engine;

use crate::error::Result;
use crate::http::request::PreparedMessage;

/// Applies credentials to a fully prepared message.
///
/// Handlers run after headers, cookies and body are in place and may change
/// any of them; the returned message replaces the one passed in.
pub trait AuthHandler: Send + Sync {
    fn apply(&self, request: PreparedMessage) -> Result<PreparedMessage>;
}

/// HTTP Basic authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The `Authorization` header value.
    pub fn header_value(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl AuthHandler for BasicAuth {
    fn apply(&self, mut request: PreparedMessage) -> Result<PreparedMessage> {
        request.headers_mut().insert("Authorization", self.header_value());
        Ok(request)
    }
}

/// The `auth` argument of a request.
#[derive(Clone)]
pub enum Auth {
    Basic(BasicAuth),
    Handler(Arc<dyn AuthHandler>),
}

impl Auth {
    pub fn handler(handler: impl AuthHandler + 'static) -> Self {
        Auth::Handler(Arc::new(handler))
    }

    pub(crate) fn apply(&self, request: PreparedMessage) -> Result<PreparedMessage> {
        match self {
            Auth::Basic(basic) => basic.apply(request),
            Auth::Handler(handler) => handler.apply(request),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic(b) => f.debug_tuple("Basic").field(&b.username).finish(),
            Auth::Handler(_) => f.write_str("Handler"),
        }
    }
}

impl From<(&str, &str)> for Auth {
    fn from((username, password): (&str, &str)) -> Self {
        Auth::Basic(BasicAuth::new(username, password))
    }
}

impl From<(String, String)> for Auth {
    fn from((username, password): (String, String)) -> Self {
        Auth::Basic(BasicAuth::new(username, password))
    }
}

impl From<BasicAuth> for Auth {
    fn from(basic: BasicAuth) -> Self {
        Auth::Basic(basic)
    }
}
