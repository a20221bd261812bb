//! Line splitting and incremental text decoding over chunk sources.
//!
//! [`Lines`] and [`Decoded`] wrap any source of chunks and work as an
//! [`Iterator`] over a blocking source or a [`Stream`] over a suspending
//! one.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;

use crate::error::{Error, Result};
use crate::http::content::TextDecoder;

/// Something a line can be built from: raw bytes or decoded text.
pub trait Chunk: Sized {
    fn as_bytes(&self) -> &[u8];
    fn from_bytes(bytes: Vec<u8>) -> Self;
}

impl Chunk for Bytes {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn from_bytes(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes)
    }
}

impl Chunk for String {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }

    // Text is only ever split at ASCII delimiters or at a match of a
    // UTF-8 delimiter, both of which fall on character boundaries.
    fn from_bytes(bytes: Vec<u8>) -> Self {
        String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }
}

/// Splits a chunked byte sequence into lines.
///
/// Without a delimiter, `\n`, `\r` and `\r\n` all end a line, including a
/// `\r\n` whose halves arrive in different chunks. With a delimiter, the
/// text between delimiters is a line and the piece after the last
/// delimiter is held back until more data or the end arrives.
#[derive(Debug, Clone, Default)]
pub struct LineSplitter {
    delimiter: Option<Vec<u8>>,
    pending: Vec<u8>,
    last_cr: bool,
}

impl LineSplitter {
    /// An empty delimiter means universal newlines.
    pub fn new(delimiter: Option<&[u8]>) -> Self {
        Self {
            delimiter: delimiter.filter(|d| !d.is_empty()).map(<[u8]>::to_vec),
            ..Self::default()
        }
    }

    /// Feeds a chunk, pushing every completed line onto `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Vec<u8>>) {
        match self.delimiter.clone() {
            Some(delimiter) => self.push_delimited(chunk, &delimiter, out),
            None => self.push_universal(chunk, out),
        }
    }

    fn push_universal(&mut self, chunk: &[u8], out: &mut VecDeque<Vec<u8>>) {
        for &b in chunk {
            if self.last_cr {
                self.last_cr = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\r' => {
                    out.push_back(std::mem::take(&mut self.pending));
                    self.last_cr = true;
                }
                b'\n' => out.push_back(std::mem::take(&mut self.pending)),
                _ => self.pending.push(b),
            }
        }
    }

    fn push_delimited(&mut self, chunk: &[u8], delimiter: &[u8], out: &mut VecDeque<Vec<u8>>) {
        // Search from just before the old tail so a delimiter straddling
        // the chunk boundary is found.
        let mut start = self.pending.len().saturating_sub(delimiter.len() - 1);
        self.pending.extend_from_slice(chunk);

        let mut line_start = 0;
        while let Some(i) = find(&self.pending[start..], delimiter) {
            let end = start + i;
            out.push_back(self.pending[line_start..end].to_vec());
            line_start = end + delimiter.len();
            start = line_start;
        }
        self.pending.drain(..line_start);
    }

    /// The trailing fragment, if any, once the input has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.last_cr = false;
        let rest = std::mem::take(&mut self.pending);
        (!rest.is_empty()).then_some(rest)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Lines of a chunk source, as bytes or text depending on the chunk type.
pub struct Lines<S, T> {
    source: S,
    splitter: LineSplitter,
    ready: VecDeque<Vec<u8>>,
    done: bool,
    _chunk: PhantomData<fn() -> T>,
}

impl<S, T: Chunk> Lines<S, T> {
    pub fn new(source: S, delimiter: Option<&[u8]>) -> Self {
        Self {
            source,
            splitter: LineSplitter::new(delimiter),
            ready: VecDeque::new(),
            done: false,
            _chunk: PhantomData,
        }
    }

    fn pop(&mut self) -> Option<T> {
        self.ready.pop_front().map(T::from_bytes)
    }

    /// Takes one upstream item; returns the error to surface, if any.
    fn accept(&mut self, item: Option<Result<T>>) -> Option<Error> {
        match item {
            Some(Ok(chunk)) => {
                if !chunk.as_bytes().is_empty() {
                    self.splitter.push(chunk.as_bytes(), &mut self.ready);
                }
                None
            }
            Some(Err(e)) => {
                self.done = true;
                Some(e)
            }
            None => {
                self.done = true;
                if let Some(rest) = self.splitter.finish() {
                    self.ready.push_back(rest);
                }
                None
            }
        }
    }
}

impl<S, T> Iterator for Lines<S, T>
where
    S: Iterator<Item = Result<T>>,
    T: Chunk,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pop() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }
            let item = self.source.next();
            if let Some(e) = self.accept(item) {
                return Some(Err(e));
            }
        }
    }
}

impl<S, T> Stream for Lines<S, T>
where
    S: Stream<Item = Result<T>> + Unpin,
    T: Chunk,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.pop() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            let item = ready!(Pin::new(&mut this.source).poll_next(cx));
            if let Some(e) = this.accept(item) {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

/// Byte chunks decoded to text as they arrive.
///
/// Empty decoded pieces are skipped; the decoder is flushed once the
/// source ends.
pub struct Decoded<S> {
    source: S,
    decoder: TextDecoder,
    done: bool,
}

impl<S> Decoded<S> {
    pub fn new(source: S, decoder: TextDecoder) -> Self {
        Self {
            source,
            decoder,
            done: false,
        }
    }

    /// Decodes one upstream item; `None` means nothing to yield yet.
    fn accept(&mut self, item: Option<Result<Bytes>>) -> Option<Result<String>> {
        let text = match item {
            Some(Ok(chunk)) => self.decoder.decode(&chunk, false),
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            None => {
                self.done = true;
                self.decoder.decode(&[], true)
            }
        };
        (!text.is_empty()).then_some(Ok(text))
    }
}

impl<S> Iterator for Decoded<S>
where
    S: Iterator<Item = Result<Bytes>>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let item = self.source.next();
            if let Some(out) = self.accept(item) {
                return Some(out);
            }
        }
        None
    }
}

impl<S> Stream for Decoded<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        while !this.done {
            let item = ready!(Pin::new(&mut this.source).poll_next(cx));
            if let Some(out) = this.accept(item) {
                return Poll::Ready(Some(out));
            }
        }
        Poll::Ready(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(chunks: &[&[u8]], delimiter: Option<&[u8]>) -> Vec<Vec<u8>> {
        let mut splitter = LineSplitter::new(delimiter);
        let mut out = VecDeque::new();
        for chunk in chunks {
            splitter.push(chunk, &mut out);
        }
        out.extend(splitter.finish());
        out.into_iter().collect()
    }

    #[test]
    fn crlf_split_across_chunks_is_one_terminator() {
        let lines = split(&[b"a\r\nb\r", b"\nc"], None);
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn blank_lines_are_kept() {
        let lines = split(&[b"a\n\nb\r\r\n"], None);
        assert_eq!(
            lines,
            vec![b"a".to_vec(), b"".to_vec(), b"b".to_vec(), b"".to_vec()]
        );
    }

    #[test]
    fn delimiter_straddling_chunks() {
        let lines = split(&[b"one<", b">two<>", b"thr", b"ee"], Some(b"<>"));
        assert_eq!(
            lines,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[test]
    fn trailing_delimiter_yields_no_empty_line() {
        let lines = split(&[b"a,b,"], Some(b","));
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
