//! Response body state machine and decoding helpers.
//!
//! Both response flavours drive the same [`BodyPipeline`]; only the way a
//! chunk is fetched from the transport differs between them.

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, Encoding};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result, TransportError};
use crate::http::headers::{CONTENT_TYPE, Headers};
use crate::http::raw::ChunkResult;

/// Chunk size used when materializing a whole body.
pub const CONTENT_CHUNK_SIZE: usize = 10 * 1024;

/// Default chunk size for streaming iteration.
pub const ITER_CHUNK_SIZE: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodyState {
    #[default]
    Unread,
    /// Chunks are being pulled by a streaming reader.
    Streaming,
    /// The transport was drained without keeping the bytes.
    Consumed,
    /// The full body is cached.
    Materialized(Bytes),
    /// A transport error ended the body early.
    Failed,
}

/// How a read should proceed given the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Serve the cached body.
    Replay(Bytes),
    /// Pull chunks from the raw handle.
    Pull,
    /// There is no raw handle; the body is empty.
    Empty,
}

#[derive(Debug, Default)]
pub struct BodyPipeline {
    state: BodyState,
    chunked: bool,
    closed: bool,
}

impl BodyPipeline {
    /// `chunked` records whether the response declared
    /// `Transfer-Encoding: chunked`, which decides how protocol errors are
    /// reported.
    pub fn new(chunked: bool) -> Self {
        Self {
            chunked,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Plans a streaming read (`iter_content`).
    pub fn plan_stream(&self, has_raw: bool) -> Result<Plan> {
        match &self.state {
            BodyState::Materialized(content) => Ok(Plan::Replay(content.clone())),
            BodyState::Streaming | BodyState::Consumed | BodyState::Failed => {
                Err(Error::StreamConsumed)
            }
            BodyState::Unread => self.plan_unread(has_raw),
        }
    }

    /// Plans a full materialization (`content`).
    pub fn plan_content(&self, has_raw: bool) -> Result<Plan> {
        match &self.state {
            BodyState::Materialized(content) => Ok(Plan::Replay(content.clone())),
            BodyState::Streaming | BodyState::Consumed | BodyState::Failed => {
                Err(Error::ContentConsumed)
            }
            BodyState::Unread => self.plan_unread(has_raw),
        }
    }

    fn plan_unread(&self, has_raw: bool) -> Result<Plan> {
        if self.closed {
            Err(Error::Connection(
                "response was closed before its body was read".to_string(),
            ))
        } else if has_raw {
            Ok(Plan::Pull)
        } else {
            Ok(Plan::Empty)
        }
    }

    pub fn start(&mut self) {
        self.state = BodyState::Streaming;
    }

    /// Records the outcome of one pull and translates transport errors.
    ///
    /// `None` means the raw stream is exhausted.
    pub fn on_chunk(&mut self, item: Option<ChunkResult>) -> Option<Result<Bytes>> {
        match item {
            None => {
                self.state = BodyState::Consumed;
                None
            }
            Some(Ok(chunk)) => {
                tracing::trace!(len = chunk.len(), "Received body chunk");
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                self.state = BodyState::Failed;
                Some(Err(self.translate(e)))
            }
        }
    }

    /// Marks a body with no raw handle as drained.
    pub fn finish_empty(&mut self) {
        self.state = BodyState::Consumed;
    }

    pub fn materialize(&mut self, content: Bytes) -> Bytes {
        self.state = BodyState::Materialized(content.clone());
        content
    }

    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Whether closing should also close the raw handle.
    pub fn needs_raw_close(&self) -> bool {
        !matches!(
            self.state,
            BodyState::Consumed | BodyState::Materialized(_) | BodyState::Failed
        )
    }

    fn translate(&self, error: TransportError) -> Error {
        let translated = match error {
            TransportError::Protocol(msg) if self.chunked => Error::ChunkedEncoding(msg),
            TransportError::Protocol(msg) => Error::Connection(msg),
            TransportError::Decode(msg) => Error::ContentDecoding(msg),
            TransportError::ReadTimeout(msg) => Error::ReadTimeout(msg),
            TransportError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Error::ReadTimeout(e.to_string())
            }
            TransportError::Io(e) => Error::Connection(e.to_string()),
        };
        tracing::debug!(error = %translated, chunked = self.chunked, "Body read failed");
        translated
    }
}

/// Looks up an encoding by WHATWG label, ignoring surrounding whitespace.
pub fn lookup_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// The charset implied by a response's `Content-Type`.
///
/// An explicit `charset` parameter wins; `text/*` defaults to `ISO-8859-1`
/// and `application/json` to `utf-8`.
pub fn encoding_from_headers(headers: &Headers) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?;
    let parsed: mime::Mime = content_type.trim().parse().ok()?;

    if let Some(charset) = parsed.get_param(mime::CHARSET) {
        return Some(charset.as_str().trim_matches(|c| c == '"' || c == '\'').to_string());
    }
    if parsed.type_() == mime::TEXT {
        return Some("ISO-8859-1".to_string());
    }
    if parsed.type_() == mime::APPLICATION && parsed.subtype() == mime::JSON {
        return Some("utf-8".to_string());
    }
    None
}

/// Guesses the encoding of `content` by statistical detection.
pub fn detect_encoding(content: &[u8]) -> &'static str {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(content, true);
    detector.guess(None, true).name()
}

/// Decodes a full body with `encoding`, or the detected encoding when none
/// is given.
///
/// Malformed sequences become U+FFFD; an unknown label falls back to UTF-8.
pub fn decode_text(content: &[u8], encoding: Option<&str>) -> String {
    if content.is_empty() {
        return String::new();
    }
    let label = encoding.unwrap_or_else(|| detect_encoding(content));
    match lookup_encoding(label) {
        Some(enc) => enc.decode_without_bom_handling(content).0.into_owned(),
        None => String::from_utf8_lossy(content).into_owned(),
    }
}

/// Unicode encodings a JSON document can be sniffed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonUtf {
    Utf8,
    /// UTF-8 with a byte order mark.
    Utf8Sig,
    /// UTF-16 with a byte order mark.
    Utf16,
    Utf16Le,
    Utf16Be,
    /// UTF-32 with a byte order mark.
    Utf32,
    Utf32Le,
    Utf32Be,
}

impl JsonUtf {
    pub fn name(self) -> &'static str {
        match self {
            JsonUtf::Utf8 => "utf-8",
            JsonUtf::Utf8Sig => "utf-8-sig",
            JsonUtf::Utf16 => "utf-16",
            JsonUtf::Utf16Le => "utf-16-le",
            JsonUtf::Utf16Be => "utf-16-be",
            JsonUtf::Utf32 => "utf-32",
            JsonUtf::Utf32Le => "utf-32-le",
            JsonUtf::Utf32Be => "utf-32-be",
        }
    }

    /// Decodes `data` strictly; `None` on any malformed sequence.
    pub fn decode(self, data: &[u8]) -> Option<String> {
        match self {
            JsonUtf::Utf8 => std::str::from_utf8(data).ok().map(str::to_string),
            JsonUtf::Utf8Sig => {
                let data = data.strip_prefix(b"\xef\xbb\xbf").unwrap_or(data);
                std::str::from_utf8(data).ok().map(str::to_string)
            }
            JsonUtf::Utf16 => match data {
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
                _ => decode_utf16(data, u16::from_be_bytes),
            },
            JsonUtf::Utf16Le => decode_utf16(data, u16::from_le_bytes),
            JsonUtf::Utf16Be => decode_utf16(data, u16::from_be_bytes),
            JsonUtf::Utf32 => match data {
                [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => decode_utf32(rest, u32::from_le_bytes),
                [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => decode_utf32(rest, u32::from_be_bytes),
                _ => decode_utf32(data, u32::from_be_bytes),
            },
            JsonUtf::Utf32Le => decode_utf32(data, u32::from_le_bytes),
            JsonUtf::Utf32Be => decode_utf32(data, u32::from_be_bytes),
        }
    }
}

fn decode_utf16(data: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let units = data.chunks_exact(2).map(|c| unit([c[0], c[1]]));
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

fn decode_utf32(data: &[u8], unit: fn([u8; 4]) -> u32) -> Option<String> {
    if data.len() % 4 != 0 {
        return None;
    }
    data.chunks_exact(4)
        .map(|c| char::from_u32(unit([c[0], c[1], c[2], c[3]])))
        .collect()
}

/// Sniffs the Unicode encoding of a JSON document from its first four
/// bytes.
///
/// JSON text starts with two ASCII characters, so the position of null
/// bytes gives the encoding away even without a byte order mark.
pub fn guess_json_utf(data: &[u8]) -> Option<JsonUtf> {
    let sample = &data[..data.len().min(4)];

    if sample == [0xFF, 0xFE, 0x00, 0x00] || sample == [0x00, 0x00, 0xFE, 0xFF] {
        return Some(JsonUtf::Utf32);
    }
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(JsonUtf::Utf8Sig);
    }
    if sample.starts_with(&[0xFF, 0xFE]) || sample.starts_with(&[0xFE, 0xFF]) {
        return Some(JsonUtf::Utf16);
    }

    let nulls = sample.iter().filter(|&&b| b == 0).count();
    match nulls {
        0 => Some(JsonUtf::Utf8),
        2 if sample.len() == 4 && sample[0] == 0 && sample[2] == 0 => Some(JsonUtf::Utf16Be),
        2 if sample.len() == 4 && sample[1] == 0 && sample[3] == 0 => Some(JsonUtf::Utf16Le),
        3 if sample.len() == 4 && sample[..3] == [0, 0, 0] => Some(JsonUtf::Utf32Be),
        3 if sample.len() == 4 && sample[1..] == [0, 0, 0] => Some(JsonUtf::Utf32Le),
        _ => None,
    }
}

/// Parses a JSON body.
///
/// Without an explicit encoding, bodies longer than three bytes are sniffed
/// for a Unicode encoding first; if that decode fails the body goes through
/// [`decode_text`] like any other text.
pub fn parse_json<T: DeserializeOwned>(content: &[u8], encoding: Option<&str>) -> Result<T> {
    if encoding.is_none() && content.len() > 3 {
        if let Some(text) = guess_json_utf(content).and_then(|utf| utf.decode(content)) {
            return Ok(serde_json::from_str(&text)?);
        }
    }
    let text = decode_text(content, encoding);
    Ok(serde_json::from_str(&text)?)
}

/// Incremental decoder for streamed text.
pub struct TextDecoder {
    decoder: Decoder,
}

impl TextDecoder {
    /// Fails if no encoding is set or the label is not recognized.
    pub fn for_label(label: Option<&str>) -> Result<Self> {
        let label = label.ok_or(Error::EncodingNotSet)?;
        let encoding =
            lookup_encoding(label).ok_or_else(|| Error::UnknownEncoding(label.to_string()))?;
        Ok(Self {
            decoder: encoding.new_decoder_without_bom_handling(),
        })
    }

    /// Decodes one chunk; `last` flushes any buffered partial sequence.
    pub fn decode(&mut self, chunk: &[u8], last: bool) -> String {
        let mut out = String::new();
        let mut input = chunk;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len() * 3 + 16);
            out.reserve(needed);
            let (result, read, _) = self.decoder.decode_to_string(input, &mut out, last);
            input = &input[read..];
            match result {
                CoderResult::InputEmpty => return out,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

impl std::fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDecoder")
            .field("encoding", &self.decoder.encoding().name())
            .finish()
    }
}
