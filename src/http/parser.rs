use std::io::{BufRead, Read};

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::http::headers::{CONTENT_LENGTH, Headers, TRANSFER_ENCODING};
use crate::http::raw::{ChunkResult, Raw, RawStream};
use crate::http::response::{ResponseBuilder, ResponseMessage};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid status line")]
    InvalidStatusLine,
    #[error("invalid status code")]
    InvalidStatus,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("invalid content length")]
    InvalidContentLength,
    #[error("incomplete response head")]
    Incomplete,
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: String,
    pub status_code: u16,
    pub reason: String,
    pub headers: Headers,
}

/// Parses a response head from the start of `buf`.
///
/// Returns the head and the number of bytes it occupied, including the
/// blank line. Repeated headers are folded into one comma-separated value.
pub fn parse_response_head(buf: &[u8]) -> std::result::Result<(ResponseHead, usize), ParseError> {
    // Look for header/body separator
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let head_str = std::str::from_utf8(&buf[..headers_end])
        .map_err(|_| ParseError::InvalidStatusLine)?;

    let mut lines = head_str.split("\r\n");

    // Status line
    let status_line = lines.next().ok_or(ParseError::InvalidStatusLine)?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().filter(|v| v.starts_with("HTTP/"));
    let version = version.ok_or(ParseError::InvalidStatusLine)?;
    let status_code = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|s| (100..1000).contains(s))
        .ok_or(ParseError::InvalidStatus)?;
    let reason = parts.next().unwrap_or("").trim();

    // Headers
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }
        let combined = match headers.get(key) {
            Some(existing) => format!("{existing}, {value}"),
            None => value.to_string(),
        };
        headers.insert(key, combined);
    }

    let head = ResponseHead {
        version: version.to_string(),
        status_code,
        reason: reason.to_string(),
        headers,
    };
    Ok((head, headers_end + 4))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Reads a captured response from `reader` into a blocking response.
///
/// The body stays in `reader` and is framed by `Transfer-Encoding: chunked`,
/// `Content-Length`, or the end of input, in that order of preference.
pub fn read_response<R>(mut reader: R, url: &str) -> Result<ResponseMessage>
where
    R: BufRead + Send + 'static,
{
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        if reader.read_until(b'\n', &mut head)? == 0 {
            return Err(ParseError::Incomplete.into());
        }
    }
    let (head, _) = parse_response_head(&head)?;

    let chunked = head
        .headers
        .get(TRANSFER_ENCODING)
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    let raw = if chunked {
        Raw::stream(ChunkedBody::new(reader))
    } else if let Some(len) = head.headers.get(CONTENT_LENGTH) {
        let len = len
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidContentLength)?;
        Raw::reader(reader.take(len))
    } else {
        Raw::reader(reader)
    };

    tracing::debug!(
        status = head.status_code,
        chunked,
        headers = head.headers.len(),
        "Parsed response head"
    );

    Ok(ResponseBuilder::new(head.status_code)
        .reason(head.reason)
        .headers(head.headers)
        .url(url)
        .raw(raw)
        .build())
}

/// Decodes `Transfer-Encoding: chunked` framing, one transfer chunk per
/// call.
pub struct ChunkedBody<R> {
    reader: R,
    finished: bool,
}

impl<R: BufRead> ChunkedBody<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    fn read_line(&mut self) -> std::result::Result<String, TransportError> {
        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Err(TransportError::Protocol(
                "connection ended inside chunked body".to_string(),
            ));
        }
        let line = String::from_utf8(line).map_err(|_| {
            TransportError::Protocol("chunk framing line is not valid UTF-8".to_string())
        })?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        let line = self.read_line()?;
        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = u64::from_str_radix(size_str, 16).map_err(|_| {
            TransportError::Protocol(format!("invalid chunk size line {line:?}"))
        })?;

        if size == 0 {
            // Trailer section ends at the first empty line.
            while !self.read_line()?.is_empty() {}
            return Ok(None);
        }

        // Never preallocate a peer-declared size.
        let mut data = Vec::new();
        (&mut self.reader).take(size).read_to_end(&mut data)?;
        if (data.len() as u64) < size {
            return Err(TransportError::Protocol(
                "chunk shorter than its declared size".to_string(),
            ));
        }
        if !self.read_line()?.is_empty() {
            return Err(TransportError::Protocol(
                "missing CRLF after chunk data".to_string(),
            ));
        }
        Ok(Some(Bytes::from(data)))
    }
}

impl<R: BufRead + Send> RawStream for ChunkedBody<R> {
    fn next_chunk(&mut self, _chunk_size: usize) -> Option<ChunkResult> {
        if self.finished {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }

    fn close(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_head() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nbody";

        let (parsed, consumed) = parse_response_head(resp).unwrap();

        assert_eq!(parsed.status_code, 200);
        assert_eq!(parsed.reason, "OK");
        assert_eq!(parsed.headers.get("content-type"), Some("text/plain"));
        assert_eq!(&resp[consumed..], b"body");
    }

    #[test]
    fn chunked_body_decodes_frames() {
        let wire = b"3\r\nabc\r\n2;ext=1\r\nde\r\n0\r\nTrailer: x\r\n\r\n";
        let mut body = ChunkedBody::new(&wire[..]);
        assert_eq!(body.next_chunk(512).unwrap().unwrap(), "abc");
        assert_eq!(body.next_chunk(512).unwrap().unwrap(), "de");
        assert!(body.next_chunk(512).is_none());
    }

    #[test]
    fn oversized_chunk_declaration_fails_without_allocating() {
        let mut body = ChunkedBody::new(&b"ffffffffffffffff\r\nab"[..]);
        assert!(matches!(
            body.next_chunk(512),
            Some(Err(TransportError::Protocol(_)))
        ));
        assert!(body.next_chunk(512).is_none());
    }

    #[test]
    fn non_utf8_size_line_is_a_protocol_error() {
        let mut body = ChunkedBody::new(&b"\xff\xfe\r\nab\r\n"[..]);
        assert!(matches!(
            body.next_chunk(512),
            Some(Err(TransportError::Protocol(_)))
        ));
    }

    #[test]
    fn truncated_chunk_is_a_protocol_error() {
        let mut body = ChunkedBody::new(&b"5\r\nab"[..]);
        assert!(matches!(
            body.next_chunk(512),
            Some(Err(TransportError::Protocol(_)))
        ));
    }
}
