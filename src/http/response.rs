use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use serde::de::DeserializeOwned;

use crate::error::{Error, HttpError, Result};
use crate::http::content::{
    self, BodyPipeline, Plan, TextDecoder, CONTENT_CHUNK_SIZE,
};
use crate::http::headers::{Headers, TRANSFER_ENCODING};
use crate::http::lines::{Decoded, Lines};
use crate::http::raw::{AsyncRaw, ChunkResult, Raw, RawHandle};
use crate::http::request::PreparedMessage;

/// Status codes that mark a redirect when a `Location` header is present.
pub const REDIRECT_STATI: [u16; 5] = [301, 302, 303, 307, 308];

/// A received response whose body is read through `R`.
///
/// The body is pulled lazily. It can be streamed once, or materialized once
/// and then read any number of times; see [`Response::iter_content`] and
/// [`Response::content`].
#[derive(Debug)]
pub struct Response<R> {
    status_code: u16,
    reason: String,
    headers: Headers,
    url: String,
    encoding: Option<String>,
    history: Vec<Response<R>>,
    elapsed: Duration,
    request: Option<PreparedMessage>,
    next: Option<PreparedMessage>,
    raw: Option<R>,
    pipeline: BodyPipeline,
}

/// A response read with blocking I/O.
pub type ResponseMessage = Response<Raw>;

/// A response read with async I/O.
pub type AsyncResponseMessage = Response<AsyncRaw>;

/// Builder for constructing responses in a fluent style.
///
/// # Example
///
/// ```
/// # use missive::http::raw::Raw;
/// # use missive::http::response::ResponseBuilder;
/// let mut response = ResponseBuilder::new(200)
///     .header("Content-Type", "text/plain; charset=utf-8")
///     .raw(Raw::from_chunks(["hello ", "world"]))
///     .build();
/// assert_eq!(response.text().unwrap(), "hello world");
/// ```
pub struct ResponseBuilder<R> {
    status_code: u16,
    reason: String,
    headers: Headers,
    url: String,
    encoding: Option<String>,
    history: Vec<Response<R>>,
    elapsed: Duration,
    request: Option<PreparedMessage>,
    next: Option<PreparedMessage>,
    raw: Option<R>,
}

impl<R> ResponseBuilder<R> {
    /// Creates a new response builder with the specified status code.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            reason: String::new(),
            headers: Headers::new(),
            url: String::new(),
            encoding: None,
            history: Vec::new(),
            elapsed: Duration::ZERO,
            request: None,
            next: None,
            raw: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Adds or replaces a header.
    ///
    /// # Arguments
    ///
    /// * `key` - Header name (case-insensitive in HTTP)
    /// * `value` - Header value
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Overrides the encoding otherwise taken from `Content-Type`.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn history(mut self, history: Vec<Response<R>>) -> Self {
        self.history = history;
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn request(mut self, request: PreparedMessage) -> Self {
        self.request = Some(request);
        self
    }

    /// The request a redirect would send next.
    pub fn next(mut self, next: PreparedMessage) -> Self {
        self.next = Some(next);
        self
    }

    pub fn raw(mut self, raw: R) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Builds the final Response.
    ///
    /// Without an explicit encoding, the charset is derived from the
    /// `Content-Type` header.
    pub fn build(self) -> Response<R> {
        let chunked = self
            .headers
            .get(TRANSFER_ENCODING)
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        let encoding = self
            .encoding
            .or_else(|| content::encoding_from_headers(&self.headers));

        Response {
            status_code: self.status_code,
            reason: self.reason,
            headers: self.headers,
            url: self.url,
            encoding,
            history: self.history,
            elapsed: self.elapsed,
            request: self.request,
            next: self.next,
            raw: self.raw,
            pipeline: BodyPipeline::new(chunked),
        }
    }
}

impl<R: RawHandle> Response<R> {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The final URL of the response.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Sets the encoding used by `text`, `json` and the text iterators.
    pub fn set_encoding(&mut self, encoding: Option<String>) {
        self.encoding = encoding;
    }

    /// Earlier responses of a redirect chain, oldest first.
    pub fn history(&self) -> &[Response<R>] {
        &self.history
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn request(&self) -> Option<&PreparedMessage> {
        self.request.as_ref()
    }

    pub fn next(&self) -> Option<&PreparedMessage> {
        self.next.as_ref()
    }

    pub fn raw(&self) -> Option<&R> {
        self.raw.as_ref()
    }

    pub fn body_state(&self) -> &content::BodyState {
        self.pipeline.state()
    }

    /// `true` unless the status is 4xx or 5xx.
    pub fn ok(&self) -> bool {
        self.raise_for_status().is_ok()
    }

    pub fn raise_for_status(&self) -> Result<()> {
        if (400..600).contains(&self.status_code) {
            return Err(Error::Http(HttpError {
                status: self.status_code,
                reason: self.reason.clone(),
                url: self.url.clone(),
            }));
        }
        Ok(())
    }

    pub fn is_redirect(&self) -> bool {
        self.headers.contains("location") && REDIRECT_STATI.contains(&self.status_code)
    }

    pub fn is_permanent_redirect(&self) -> bool {
        self.headers.contains("location") && matches!(self.status_code, 301 | 308)
    }

    /// The `Link` header, keyed by `rel` (or by `url` when a link has no
    /// `rel`).
    pub fn links(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        if let Some(header) = self.headers.get("link") {
            for link in parse_header_links(header) {
                let key = link
                    .get("rel")
                    .or_else(|| link.get("url"))
                    .cloned()
                    .unwrap_or_default();
                resolved.insert(key, link);
            }
        }
        resolved
    }

    /// Releases the connection.
    ///
    /// The raw handle is closed too unless the body was fully read. Later
    /// reads of an unread body fail instead of blocking. Calling this more
    /// than once has no further effect.
    pub fn close(&mut self) {
        if let Some(mut raw) = self.raw.take() {
            if self.pipeline.needs_raw_close() {
                raw.close();
            }
            raw.release_conn();
            tracing::debug!(url = %self.url, "Closed response");
        }
        self.pipeline.mark_closed();
    }

    /// Drops the raw handle once the body is exhausted.
    fn release_raw(&mut self) {
        if let Some(mut raw) = self.raw.take() {
            raw.release_conn();
        }
    }

    fn content_chunks(&mut self, chunk_size: usize) -> Result<ContentChunks<'_, R>> {
        let mode = match self.pipeline.plan_stream(self.raw.is_some())? {
            Plan::Replay(content) => Mode::Replay(content),
            Plan::Pull => {
                self.pipeline.start();
                Mode::Pull
            }
            Plan::Empty => {
                self.pipeline.finish_empty();
                Mode::Done
            }
        };
        Ok(ContentChunks {
            response: self,
            chunk_size: chunk_size.max(1),
            mode,
        })
    }

    fn text_decoder(&self) -> Result<TextDecoder> {
        TextDecoder::for_label(self.encoding.as_deref())
    }

    fn decode_content(&self, content: &[u8]) -> String {
        content::decode_text(content, self.encoding.as_deref())
    }
}

impl Response<Raw> {
    /// Streams the body in chunks of up to `chunk_size` bytes.
    ///
    /// A materialized body is replayed from the cache. Otherwise the body
    /// can only be streamed once: a second call fails with
    /// [`Error::StreamConsumed`].
    pub fn iter_content(&mut self, chunk_size: usize) -> Result<ContentChunks<'_, Raw>> {
        self.content_chunks(chunk_size)
    }

    /// Streams the body decoded with the response encoding.
    ///
    /// The encoding is checked before anything is read.
    pub fn iter_text(&mut self, chunk_size: usize) -> Result<Decoded<ContentChunks<'_, Raw>>> {
        let decoder = self.text_decoder()?;
        Ok(Decoded::new(self.content_chunks(chunk_size)?, decoder))
    }

    pub fn iter_lines(
        &mut self,
        chunk_size: usize,
        delimiter: Option<&[u8]>,
    ) -> Result<Lines<ContentChunks<'_, Raw>, Bytes>> {
        Ok(Lines::new(self.content_chunks(chunk_size)?, delimiter))
    }

    pub fn iter_text_lines(
        &mut self,
        chunk_size: usize,
        delimiter: Option<&str>,
    ) -> Result<Lines<Decoded<ContentChunks<'_, Raw>>, String>> {
        let decoded = self.iter_text(chunk_size)?;
        Ok(Lines::new(decoded, delimiter.map(str::as_bytes)))
    }

    /// The whole body, read once and cached.
    pub fn content(&mut self) -> Result<Bytes> {
        match self.pipeline.plan_content(self.raw.is_some())? {
            Plan::Replay(content) => return Ok(content),
            Plan::Empty => return Ok(self.pipeline.materialize(Bytes::new())),
            Plan::Pull => self.pipeline.start(),
        }

        let mut buf = BytesMut::new();
        loop {
            let item = self
                .raw
                .as_mut()
                .and_then(|raw| raw.next_chunk(CONTENT_CHUNK_SIZE));
            match self.pipeline.on_chunk(item) {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        self.release_raw();
        Ok(self.pipeline.materialize(buf.freeze()))
    }

    /// The body as text, using the response encoding or a detected one.
    pub fn text(&mut self) -> Result<String> {
        let content = self.content()?;
        Ok(self.decode_content(&content))
    }

    /// The encoding detected from the body.
    pub fn apparent_encoding(&mut self) -> Result<String> {
        let content = self.content()?;
        Ok(content::detect_encoding(&content).to_string())
    }

    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let content = self.content()?;
        content::parse_json(&content, self.encoding.as_deref())
    }
}

impl Response<AsyncRaw> {
    /// Streams the body in chunks of up to `chunk_size` bytes, with the
    /// same replay and single-use rules as the blocking flavour.
    pub fn iter_content(&mut self, chunk_size: usize) -> Result<ContentChunks<'_, AsyncRaw>> {
        self.content_chunks(chunk_size)
    }

    pub fn iter_text(
        &mut self,
        chunk_size: usize,
    ) -> Result<Decoded<ContentChunks<'_, AsyncRaw>>> {
        let decoder = self.text_decoder()?;
        Ok(Decoded::new(self.content_chunks(chunk_size)?, decoder))
    }

    pub fn iter_lines(
        &mut self,
        chunk_size: usize,
        delimiter: Option<&[u8]>,
    ) -> Result<Lines<ContentChunks<'_, AsyncRaw>, Bytes>> {
        Ok(Lines::new(self.content_chunks(chunk_size)?, delimiter))
    }

    pub fn iter_text_lines(
        &mut self,
        chunk_size: usize,
        delimiter: Option<&str>,
    ) -> Result<Lines<Decoded<ContentChunks<'_, AsyncRaw>>, String>> {
        let decoded = self.iter_text(chunk_size)?;
        Ok(Lines::new(decoded, delimiter.map(str::as_bytes)))
    }

    pub async fn content(&mut self) -> Result<Bytes> {
        match self.pipeline.plan_content(self.raw.is_some())? {
            Plan::Replay(content) => return Ok(content),
            Plan::Empty => return Ok(self.pipeline.materialize(Bytes::new())),
            Plan::Pull => self.pipeline.start(),
        }

        let mut buf = BytesMut::new();
        loop {
            let item = match self.raw.as_mut() {
                Some(raw) => raw.next_chunk(CONTENT_CHUNK_SIZE).await,
                None => None,
            };
            match self.pipeline.on_chunk(item) {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        self.release_raw();
        Ok(self.pipeline.materialize(buf.freeze()))
    }

    pub async fn text(&mut self) -> Result<String> {
        let content = self.content().await?;
        Ok(self.decode_content(&content))
    }

    pub async fn apparent_encoding(&mut self) -> Result<String> {
        let content = self.content().await?;
        Ok(content::detect_encoding(&content).to_string())
    }

    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let content = self.content().await?;
        content::parse_json(&content, self.encoding.as_deref())
    }
}

enum Mode {
    Replay(Bytes),
    Pull,
    Done,
}

/// Body chunks of a response, borrowed from it for the duration of the
/// read.
///
/// Iterates over a blocking response and streams over an async one.
pub struct ContentChunks<'a, R> {
    response: &'a mut Response<R>,
    chunk_size: usize,
    mode: Mode,
}

impl<R: RawHandle> ContentChunks<'_, R> {
    /// Serves the next cached slice, or `None` when the mode is not replay.
    fn replay(&mut self) -> Option<Option<Result<Bytes>>> {
        let Mode::Replay(rest) = &mut self.mode else {
            return None;
        };
        if rest.is_empty() {
            self.mode = Mode::Done;
            return Some(None);
        }
        let n = self.chunk_size.min(rest.len());
        Some(Some(Ok(rest.split_to(n))))
    }

    fn accept(&mut self, item: Option<ChunkResult>) -> Option<Result<Bytes>> {
        let out = self.response.pipeline.on_chunk(item);
        match &out {
            None => {
                self.response.release_raw();
                self.mode = Mode::Done;
            }
            Some(Err(_)) => self.mode = Mode::Done,
            Some(Ok(_)) => {}
        }
        out
    }
}

impl Iterator for ContentChunks<'_, Raw> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(out) = self.replay() {
            return out;
        }
        if matches!(self.mode, Mode::Done) {
            return None;
        }
        let chunk_size = self.chunk_size;
        let item = self
            .response
            .raw
            .as_mut()
            .and_then(|raw| raw.next_chunk(chunk_size));
        self.accept(item)
    }
}

impl Stream for ContentChunks<'_, AsyncRaw> {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(out) = this.replay() {
            return Poll::Ready(out);
        }
        if matches!(this.mode, Mode::Done) {
            return Poll::Ready(None);
        }
        let chunk_size = this.chunk_size;
        let item = match this.response.raw.as_mut() {
            Some(raw) => match raw.poll_chunk(cx, chunk_size) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(item) => item,
            },
            None => None,
        };
        Poll::Ready(this.accept(item))
    }
}

/// Parses a `Link` header into one map of parameters per link, with the
/// target under `url`.
///
/// # Example
///
/// ```
/// # use missive::http::response::parse_header_links;
/// let links = parse_header_links(r#"<http://a/2>; rel="next", <http://a/9>; rel=last"#);
/// assert_eq!(links[0]["url"], "http://a/2");
/// assert_eq!(links[1]["rel"], "last");
/// ```
pub fn parse_header_links(value: &str) -> Vec<BTreeMap<String, String>> {
    const STRIP: &[char] = &[' ', '\'', '"'];

    let value = value.trim_matches(STRIP);
    if value.is_empty() {
        return Vec::new();
    }

    split_links(value)
        .into_iter()
        .map(|entry| {
            let (url, params) = entry.split_once(';').unwrap_or((entry, ""));
            let mut link = BTreeMap::new();
            link.insert(
                "url".to_string(),
                url.trim_matches(|c| matches!(c, '<' | '>' | ' ' | '\'' | '"'))
                    .to_string(),
            );
            for param in params.split(';') {
                let mut kv = param.split('=');
                let (Some(key), Some(val), None) = (kv.next(), kv.next(), kv.next()) else {
                    break;
                };
                link.insert(
                    key.trim_matches(STRIP).to_string(),
                    val.trim_matches(STRIP).to_string(),
                );
            }
            link
        })
        .collect()
}

/// Splits on `,` followed by optional spaces and `<`, consuming the `<`.
fn split_links(value: &str) -> Vec<&str> {
    let bytes = value.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b',' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] == b' ' {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'<' {
                parts.push(&value[start..i]);
                start = j + 1;
                i = start;
                continue;
            }
        }
        i += 1;
    }
    parts.push(&value[start..]);
    parts
}
