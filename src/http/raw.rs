//! Raw response body sources.
//!
//! A transport hands a response its body as either a chunk stream (which
//! knows how to close itself and give its connection back) or a plain
//! reader. [`Raw`] is the blocking form, [`AsyncRaw`] the suspending one.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::TransportError;

pub type ChunkResult = Result<Bytes, TransportError>;

/// Close and release operations shared by both body flavours.
pub trait RawHandle {
    fn close(&mut self);
    fn release_conn(&mut self);
}

/// A blocking chunk stream.
pub trait RawStream: Send {
    /// The next chunk of at most roughly `chunk_size` bytes, or `None` once
    /// the body is exhausted.
    fn next_chunk(&mut self, chunk_size: usize) -> Option<ChunkResult>;

    fn close(&mut self) {}

    /// Returns the underlying connection to its pool.
    fn release_conn(&mut self) {}
}

/// A suspending chunk stream.
pub trait AsyncRawStream: Send + Unpin {
    fn poll_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        chunk_size: usize,
    ) -> Poll<Option<ChunkResult>>;

    fn close(&mut self) {}

    fn release_conn(&mut self) {}
}

/// The blocking body handle of a response.
pub enum Raw {
    Stream(Box<dyn RawStream>),
    Reader(Box<dyn Read + Send>),
}

impl Raw {
    pub fn stream(stream: impl RawStream + 'static) -> Self {
        Raw::Stream(Box::new(stream))
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Raw::Reader(Box::new(reader))
    }

    /// A body delivered as exactly these chunks.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Raw::stream(ChunkQueue::from_chunks(chunks))
    }

    pub fn next_chunk(&mut self, chunk_size: usize) -> Option<ChunkResult> {
        match self {
            Raw::Stream(stream) => stream.next_chunk(chunk_size),
            Raw::Reader(reader) => read_chunk(reader.as_mut(), chunk_size),
        }
    }
}

fn read_chunk(reader: &mut dyn Read, chunk_size: usize) -> Option<ChunkResult> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return None,
            Ok(n) => {
                buf.truncate(n);
                return Some(Ok(Bytes::from(buf)));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Some(Err(TransportError::from(e))),
        }
    }
}

impl RawHandle for Raw {
    fn close(&mut self) {
        if let Raw::Stream(stream) = self {
            stream.close();
        }
    }

    fn release_conn(&mut self) {
        if let Raw::Stream(stream) = self {
            stream.release_conn();
        }
    }
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Raw::Stream(_) => f.write_str("Raw::Stream"),
            Raw::Reader(_) => f.write_str("Raw::Reader"),
        }
    }
}

/// The suspending body handle of a response.
pub enum AsyncRaw {
    Stream(Box<dyn AsyncRawStream>),
    Reader(Pin<Box<dyn AsyncRead + Send>>),
}

impl AsyncRaw {
    pub fn stream(stream: impl AsyncRawStream + 'static) -> Self {
        AsyncRaw::Stream(Box::new(stream))
    }

    pub fn reader(reader: impl AsyncRead + Send + 'static) -> Self {
        AsyncRaw::Reader(Box::pin(reader))
    }

    /// Wraps any stream of chunks. Its chunk sizes are kept as delivered.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = ChunkResult> + Send + Unpin + 'static,
    {
        AsyncRaw::stream(StreamSource(stream))
    }

    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        AsyncRaw::stream(ChunkQueue::from_chunks(chunks))
    }

    pub async fn next_chunk(&mut self, chunk_size: usize) -> Option<ChunkResult> {
        futures::future::poll_fn(|cx| self.poll_chunk(cx, chunk_size)).await
    }

    /// Polls for the next chunk of at most `chunk_size` bytes.
    pub fn poll_chunk(
        &mut self,
        cx: &mut Context<'_>,
        chunk_size: usize,
    ) -> Poll<Option<ChunkResult>> {
        match self {
            AsyncRaw::Stream(stream) => Pin::new(&mut **stream).poll_chunk(cx, chunk_size),
            AsyncRaw::Reader(reader) => {
                let mut buf = vec![0u8; chunk_size.max(1)];
                let filled = {
                    let mut read_buf = ReadBuf::new(&mut buf);
                    match reader.as_mut().poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                        Poll::Ready(Ok(())) => read_buf.filled().len(),
                    }
                };
                if filled == 0 {
                    return Poll::Ready(None);
                }
                buf.truncate(filled);
                Poll::Ready(Some(Ok(Bytes::from(buf))))
            }
        }
    }
}

impl RawHandle for AsyncRaw {
    fn close(&mut self) {
        if let AsyncRaw::Stream(stream) = self {
            stream.close();
        }
    }

    fn release_conn(&mut self) {
        if let AsyncRaw::Stream(stream) = self {
            stream.release_conn();
        }
    }
}

impl fmt::Debug for AsyncRaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncRaw::Stream(_) => f.write_str("AsyncRaw::Stream"),
            AsyncRaw::Reader(_) => f.write_str("AsyncRaw::Reader"),
        }
    }
}

struct StreamSource<S>(S);

impl<S> AsyncRawStream for StreamSource<S>
where
    S: Stream<Item = ChunkResult> + Send + Unpin,
{
    fn poll_chunk(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        _chunk_size: usize,
    ) -> Poll<Option<ChunkResult>> {
        Pin::new(&mut self.0).poll_next(cx)
    }
}

/// Close/release bookkeeping visible from outside a [`ChunkQueue`].
#[derive(Debug, Default)]
pub struct ConnState {
    closed: AtomicBool,
    released: AtomicBool,
}

impl ConnState {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// An in-memory chunk stream, usable as both a blocking and a suspending
/// source.
///
/// Chunks are delivered exactly as queued, regardless of the requested
/// chunk size, which makes it handy for replaying captured bodies and for
/// reproducing awkward chunk boundaries.
#[derive(Debug, Default)]
pub struct ChunkQueue {
    items: VecDeque<ChunkResult>,
    state: Arc<ConnState>,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let mut queue = Self::new();
        for chunk in chunks {
            queue = queue.chunk(chunk);
        }
        queue
    }

    pub fn chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.items.push_back(Ok(chunk.into()));
        self
    }

    /// Queues a transport failure after the chunks pushed so far.
    pub fn error(mut self, error: TransportError) -> Self {
        self.items.push_back(Err(error));
        self
    }

    pub fn state(&self) -> Arc<ConnState> {
        Arc::clone(&self.state)
    }

    fn pop(&mut self) -> Option<ChunkResult> {
        if self.state.is_closed() {
            return Some(Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream closed",
            ))));
        }
        let item = self.items.pop_front();
        if let Some(Ok(chunk)) = &item {
            tracing::trace!(len = chunk.len(), "Delivering queued chunk");
        }
        item
    }

    fn mark_closed(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    fn mark_released(&mut self) {
        self.state.released.store(true, Ordering::SeqCst);
    }
}

impl RawStream for ChunkQueue {
    fn next_chunk(&mut self, _chunk_size: usize) -> Option<ChunkResult> {
        self.pop()
    }

    fn close(&mut self) {
        self.mark_closed();
    }

    fn release_conn(&mut self) {
        self.mark_released();
    }
}

impl AsyncRawStream for ChunkQueue {
    fn poll_chunk(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _chunk_size: usize,
    ) -> Poll<Option<ChunkResult>> {
        Poll::Ready(self.get_mut().pop())
    }

    fn close(&mut self) {
        self.mark_closed();
    }

    fn release_conn(&mut self) {
        self.mark_released();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_respects_chunk_size() {
        let mut raw = Raw::reader(io::Cursor::new(b"abcdefg".to_vec()));
        let mut chunks = Vec::new();
        while let Some(chunk) = raw.next_chunk(3) {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn closed_queue_fails_instead_of_yielding() {
        let mut queue = ChunkQueue::from_chunks(["a", "b"]);
        RawStream::close(&mut queue);
        assert!(matches!(
            queue.next_chunk(1),
            Some(Err(TransportError::Io(_)))
        ));
    }
}
