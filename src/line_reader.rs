//! # Line Reader
//!
//! Turns a byte stream delivered in arbitrary chunks into `\n`-delimited
//! lines.
//!
//! [`LineBuffer`] is the sans-IO half: bytes are pushed in and complete
//! lines are pulled out. It remembers how far it has already searched for
//! a delimiter so a slow sender never causes the same prefix to be scanned
//! twice. [`LineReader`] drives it from an async source.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::{MAX_LINE_LENGTH, READ_CHUNK_SIZE};

/// Accumulated bytes plus the delimiter search cursor
pub struct LineBuffer {
    /// Bytes received but not yet returned as a line
    buffer: BytesMut,
    /// Everything before this offset is known to contain no newline
    search_from: usize,
    /// Largest delimiter-free buffer tolerated
    max_line_length: usize,
    /// Set once the length limit was exceeded
    overflowed: bool,
}

impl LineBuffer {
    /// Create a buffer with the given line length limit
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            search_from: 0,
            max_line_length,
            overflowed: false,
        }
    }

    /// Add received data to the buffer
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take the next complete line.
    ///
    /// Returns `Ok(None)` when more data is needed. The returned line does
    /// not include the `\n`; a preceding `\r` is kept.
    pub fn next_line(&mut self) -> ProtocolResult<Option<Bytes>> {
        if self.overflowed {
            return Err(self.too_long());
        }

        match self.buffer[self.search_from..]
            .iter()
            .position(|&b| b == b'\n')
        {
            Some(offset) => {
                let newline = self.search_from + offset;
                let mut line = self.buffer.split_to(newline + 1);
                line.truncate(newline);
                self.search_from = 0;
                Ok(Some(line.freeze()))
            }
            None => {
                if self.buffer.len() > self.max_line_length {
                    self.overflowed = true;
                    return Err(self.too_long());
                }
                self.search_from = self.buffer.len();
                Ok(None)
            }
        }
    }

    fn too_long(&self) -> ProtocolError {
        ProtocolError::LineTooLong {
            length: self.buffer.len(),
            max: self.max_line_length,
        }
    }

    /// Get buffered data length
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Offset up to which the buffer has been searched
    pub fn search_cursor(&self) -> usize {
        self.search_from
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

/// Async line reader over any byte source
pub struct LineReader<R> {
    /// The underlying read half
    source: R,
    /// Line decoder
    lines: LineBuffer,
    /// Receive buffer
    chunk: Vec<u8>,
    /// Bytes received
    bytes_received: u64,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Create a reader with the default 16 KiB line limit
    pub fn new(source: R) -> Self {
        Self::with_max_line_length(source, MAX_LINE_LENGTH)
    }

    /// Create a reader with a custom line limit
    pub fn with_max_line_length(source: R, max_line_length: usize) -> Self {
        Self {
            source,
            lines: LineBuffer::new(max_line_length),
            chunk: vec![0u8; READ_CHUNK_SIZE],
            bytes_received: 0,
        }
    }

    /// Read the next line.
    ///
    /// A line already sitting in the buffer is returned without touching
    /// the source. After `LineTooLong` the reader keeps failing.
    pub async fn read_line(&mut self) -> ProtocolResult<Bytes> {
        loop {
            if let Some(line) = self.lines.next_line()? {
                return Ok(line);
            }

            let n = self
                .source
                .read(&mut self.chunk)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;

            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }

            self.bytes_received += n as u64;
            self.lines.push(&self.chunk[..n]);
        }
    }

    /// Get bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes waiting in the line buffer
    pub fn buffered(&self) -> usize {
        self.lines.buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use proptest::prelude::*;
    use tokio::io::ReadBuf;

    /// Source that hands out the given chunks one read at a time
    struct ChunkedSource {
        chunks: VecDeque<Vec<u8>>,
        reads: usize,
    }

    impl ChunkedSource {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
                reads: 0,
            }
        }
    }

    impl AsyncRead for ChunkedSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.reads += 1;
            if let Some(mut chunk) = self.chunks.pop_front() {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk.split_off(n);
                    self.chunks.push_front(rest);
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    fn split_into(data: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut pos = 0;
        let mut sizes = sizes.iter().cycle();
        while pos < data.len() {
            let size = (*sizes.next().unwrap_or(&1)).max(1);
            let end = (pos + size).min(data.len());
            chunks.push(data[pos..end].to_vec());
            pos = end;
        }
        chunks
    }

    #[test]
    fn test_line_buffer_basic() {
        let mut lines = LineBuffer::default();
        lines.push(b"one\ntwo\nthr");

        assert_eq!(lines.next_line().unwrap().unwrap(), &b"one"[..]);
        assert_eq!(lines.next_line().unwrap().unwrap(), &b"two"[..]);
        assert!(lines.next_line().unwrap().is_none());

        lines.push(b"ee\n");
        assert_eq!(lines.next_line().unwrap().unwrap(), &b"three"[..]);
        assert_eq!(lines.buffered(), 0);
    }

    #[test]
    fn test_search_cursor_advances() {
        let mut lines = LineBuffer::default();
        lines.push(b"abc");
        assert!(lines.next_line().unwrap().is_none());
        assert_eq!(lines.search_cursor(), 3);

        lines.push(b"de");
        assert!(lines.next_line().unwrap().is_none());
        assert_eq!(lines.search_cursor(), 5);

        lines.push(b"\nxy");
        assert_eq!(lines.next_line().unwrap().unwrap(), &b"abcde"[..]);
        assert_eq!(lines.search_cursor(), 0);
        assert_eq!(lines.buffered(), 2);
    }

    #[test]
    fn test_carriage_return_kept() {
        let mut lines = LineBuffer::default();
        lines.push(b"1\r\n\n");
        assert_eq!(lines.next_line().unwrap().unwrap(), &b"1\r"[..]);
        assert_eq!(lines.next_line().unwrap().unwrap(), &b""[..]);
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut lines = LineBuffer::new(16);
        lines.push(&[b'a'; 16]);
        assert!(lines.next_line().unwrap().is_none());

        lines.push(b"\n");
        assert_eq!(lines.next_line().unwrap().unwrap().len(), 16);
    }

    #[test]
    fn test_line_over_limit_fails() {
        let mut lines = LineBuffer::new(16);
        lines.push(&[b'a'; 17]);
        assert!(matches!(
            lines.next_line(),
            Err(ProtocolError::LineTooLong { length: 17, max: 16 })
        ));

        // Reader is unusable afterwards
        lines.push(b"\n");
        assert!(matches!(
            lines.next_line(),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[test]
    fn test_long_buffer_with_delimiter_still_yields() {
        let mut lines = LineBuffer::new(4);
        lines.push(b"abcdefgh\n");
        assert_eq!(lines.next_line().unwrap().unwrap(), &b"abcdefgh"[..]);
    }

    #[tokio::test]
    async fn test_reader_over_chunks() {
        let source = ChunkedSource::new(vec![b"he".to_vec(), b"llo\nwor".to_vec(), b"ld\n".to_vec()]);
        let mut reader = LineReader::new(source);

        assert_eq!(reader.read_line().await.unwrap(), &b"hello"[..]);
        assert_eq!(reader.read_line().await.unwrap(), &b"world"[..]);
        assert_eq!(reader.bytes_received(), 12);
        assert!(matches!(
            reader.read_line().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_buffered_line_needs_no_read() {
        let source = ChunkedSource::new(vec![b"a\nb\n".to_vec()]);
        let mut reader = LineReader::new(source);

        assert_eq!(reader.read_line().await.unwrap(), &b"a"[..]);
        assert_eq!(reader.source.reads, 1);
        assert_eq!(reader.read_line().await.unwrap(), &b"b"[..]);
        assert_eq!(reader.source.reads, 1);
    }

    #[tokio::test]
    async fn test_reader_line_too_long() {
        let source = ChunkedSource::new(vec![vec![b'x'; 40]]);
        let mut reader = LineReader::with_max_line_length(source, 32);

        assert!(matches!(
            reader.read_line().await,
            Err(ProtocolError::LineTooLong { max: 32, .. })
        ));
    }

    #[tokio::test]
    async fn test_reader_partial_line_then_eof() {
        let source = ChunkedSource::new(vec![b"no newline".to_vec()]);
        let mut reader = LineReader::new(source);

        assert!(matches!(
            reader.read_line().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_lines(
            lines in prop::collection::vec(prop::collection::vec(any::<u8>().prop_filter("no newline", |b| *b != b'\n'), 0..64), 0..16),
            sizes in prop::collection::vec(1usize..50, 1..8),
        ) {
            let mut data = Vec::new();
            for line in &lines {
                data.extend_from_slice(line);
                data.push(b'\n');
            }

            let mut decoder = LineBuffer::default();
            let mut decoded = Vec::new();
            for chunk in split_into(&data, &sizes) {
                decoder.push(&chunk);
                while let Some(line) = decoder.next_line().unwrap() {
                    decoded.push(line.to_vec());
                }
            }

            prop_assert_eq!(decoded, lines);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
