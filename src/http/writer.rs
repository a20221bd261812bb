use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::error::{Error, Result};
use crate::http::body::Body;
use crate::http::headers::TRANSFER_ENCODING;
use crate::http::request::PreparedMessage;

const HTTP_VERSION: &str = "HTTP/1.1";

const STREAM_CHUNK_SIZE: usize = 8192;

/// Serializes a prepared message to HTTP/1.1 bytes.
///
/// A `Host` header is added from the URL unless one is present. Stream
/// bodies are read to the end here, with chunked framing when the message
/// declares `Transfer-Encoding: chunked`.
pub fn serialize_request(request: &PreparedMessage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    // Request line
    let request_line = format!(
        "{} {} {}\r\n",
        request.method(),
        request.path_url(),
        HTTP_VERSION
    );
    buf.extend_from_slice(request_line.as_bytes());

    // Headers
    if !request.headers().contains("Host") {
        if let Some(host) = host_header(request.url()) {
            buf.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
        }
    }
    for (k, v) in request.headers() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    match request.body() {
        None => {}
        Some(Body::Bytes(bytes)) => buf.extend_from_slice(bytes),
        Some(Body::Stream(stream)) => {
            let chunked = request
                .headers()
                .get(TRANSFER_ENCODING)
                .is_some_and(|te| te.eq_ignore_ascii_case("chunked"));
            let mut chunk = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = stream.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                if chunked {
                    buf.extend_from_slice(format!("{n:x}\r\n").as_bytes());
                    buf.extend_from_slice(&chunk[..n]);
                    buf.extend_from_slice(b"\r\n");
                } else {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
            if chunked {
                buf.extend_from_slice(b"0\r\n\r\n");
            }
        }
    }

    Ok(buf)
}

fn host_header(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Writes a serialized message to an async sink.
pub struct MessageWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl MessageWriter {
    pub fn new(request: &PreparedMessage) -> Result<Self> {
        Ok(Self {
            buffer: serialize_request(request)?,
            written: 0,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = sink.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(Error::Connection(
                    "connection closed while writing".to_string(),
                ));
            }

            self.written += n;
        }

        sink.flush().await?;
        Ok(())
    }
}
