//! Error types surfaced by request preparation and response consumption.

use std::fmt;
use std::io;

/// Errors produced while preparing a request or reading a response body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The URL has no scheme.
    #[error("{0}")]
    MissingScheme(String),

    /// The URL could not be parsed, has no host, or has a bad IDNA label.
    #[error("{0}")]
    InvalidUrl(String),

    /// A header value is malformed, or length headers conflict.
    #[error("{0}")]
    InvalidHeader(String),

    /// A body has neither a known length nor stream capability.
    #[error("{0}")]
    InvalidBody(String),

    /// A streaming body was combined with multipart files.
    #[error("Streamed bodies and files are mutually exclusive.")]
    ConflictingBody,

    /// A caller-supplied value was rejected.
    #[error("{0}")]
    InvalidValue(String),

    /// The body was already streamed and cannot be read again.
    #[error("The content for this response was already consumed")]
    StreamConsumed,

    /// Full materialization was requested after the body was streamed.
    #[error("The content for this response was already consumed")]
    ContentConsumed,

    #[error("chunked encoding error: {0}")]
    ChunkedEncoding(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("content decoding error: {0}")]
    ContentDecoding(String),

    #[error("read timed out: {0}")]
    ReadTimeout(String),

    /// Text decoding was requested without an encoding set on the response.
    #[error("encoding must be set before consuming streaming responses")]
    EncodingNotSet,

    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    /// A stream body could not be moved back to its recorded position.
    #[error("{0}")]
    UnrewindableBody(String),

    /// Raised by `raise_for_status` for 4xx and 5xx responses.
    #[error("{0}")]
    Http(HttpError),

    /// A captured response head could not be parsed.
    #[error("invalid response: {0}")]
    Parse(#[from] crate::http::parser::ParseError),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Status failure details captured from the originating response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    pub reason: String,
    pub url: String,
}

impl HttpError {
    /// Whether the status is in the 4xx range.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_client_error() {
            "Client Error"
        } else {
            "Server Error"
        };
        write!(
            f,
            "{} {}: {} for url: {}",
            self.status, kind, self.reason, self.url
        )
    }
}

/// Failures reported by a transport while delivering body chunks.
///
/// These never reach callers directly; the content pipeline translates
/// them into [`Error`] variants.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer violated the wire protocol (truncated chunk, reset).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A content-encoding (gzip, deflate, ...) could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("read timeout: {0}")]
    ReadTimeout(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
