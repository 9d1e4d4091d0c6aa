//! Buffered stream adapters
//!
//! [`BufferedInput`] turns a byte stream into CRLF-delimited lines without
//! ever blocking on a partial line; [`BufferedOutput`] queues outgoing bytes in
//! a bounded buffer that is drained when the destination is writable, and
//! lets writers check for room before queuing.
//!
//! Both adapters are poll-based so they can sit inside state shared with the
//! event loop and be driven one readiness notification at a time.

use crate::error::{NntpError, Result};
use crate::list::{Arena, DList};
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Largest single read from the source stream (16KB)
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Input side: bounded buffer with non-blocking line reads
#[derive(Debug)]
pub struct BufferedInput<R> {
    source: R,
    /// Buffered bytes; `data[consumed..]` is not yet returned to the caller
    data: Vec<u8>,
    consumed: usize,
    max_size: usize,
    scratch: Box<[u8]>,
    eof: bool,
}

impl<R> BufferedInput<R> {
    /// Wrap `source` with a buffer holding at most `max_buffer_size` unread bytes
    pub fn wrap(source: R, max_buffer_size: usize) -> Self {
        let max_size = max_buffer_size.max(1);
        Self {
            source,
            data: Vec::with_capacity(max_size.min(READ_CHUNK_SIZE)),
            consumed: 0,
            max_size,
            scratch: vec![0u8; max_size.min(READ_CHUNK_SIZE)].into_boxed_slice(),
            eof: false,
        }
    }

    /// Bytes buffered and not yet returned as lines
    pub fn buffered(&self) -> usize {
        self.data.len() - self.consumed
    }

    /// Configured maximum
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether the source reported end of stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Borrow the wrapped stream
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Give back the wrapped stream, dropping buffered bytes
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Append bytes as if they had been read from the source
    ///
    /// # Errors
    ///
    /// [`NntpError::Protocol`] if the bytes would not fit in the buffer.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.room() {
            return Err(line_too_long(self.max_size));
        }
        self.compact();
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Read one line, without its CRLF
    ///
    /// The terminator must lie within the first `max_length` buffered bytes.
    /// Returns `Ok(None)` when more data is needed; that is the normal state
    /// between readiness notifications, not an error.
    ///
    /// # Errors
    ///
    /// [`NntpError::Protocol`] (line too long) when `max_length` bytes, or the
    /// whole buffer, are pending without a terminator. The line is never
    /// truncated.
    pub fn read_line(&mut self, max_length: usize) -> Result<Option<String>> {
        let limit = max_length.min(self.max_size);
        let pending = &self.data[self.consumed..];
        let window = &pending[..pending.len().min(limit)];

        match window.windows(2).position(|pair| pair == b"\r\n") {
            Some(end) => {
                let line = String::from_utf8_lossy(&pending[..end]).into_owned();
                self.consumed += end + 2;
                if self.consumed == self.data.len() {
                    self.data.clear();
                    self.consumed = 0;
                }
                Ok(Some(line))
            }
            None if !pending.is_empty() && pending.len() >= limit => Err(line_too_long(limit)),
            None => Ok(None),
        }
    }

    /// Read one line bounded only by the buffer size
    pub fn read_any_line(&mut self) -> Result<Option<String>> {
        self.read_line(self.max_size)
    }

    fn room(&self) -> usize {
        self.max_size - self.buffered()
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.data.drain(..self.consumed);
            self.consumed = 0;
        }
    }
}

impl<R: AsyncRead + Unpin> BufferedInput<R> {
    /// Pull whatever the source has ready into the buffer
    ///
    /// Resolves to the number of bytes read; `0` means end of stream.
    ///
    /// # Errors
    ///
    /// [`NntpError::Protocol`] when the buffer is already full (no line
    /// terminator within `max_buffer_size`), or the I/O error of the source.
    pub fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<Result<usize>> {
        let room = self.room();
        if room == 0 {
            return Poll::Ready(Err(line_too_long(self.max_size)));
        }
        let want = room.min(self.scratch.len());
        let mut buf = ReadBuf::new(&mut self.scratch[..want]);
        match Pin::new(&mut self.source).poll_read(cx, &mut buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len();
                if n == 0 {
                    self.eof = true;
                } else {
                    self.compact();
                    self.data.extend_from_slice(&self.scratch[..n]);
                }
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(NntpError::from_io(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Wait for the source to become readable and fill the buffer
    pub async fn fill(&mut self) -> Result<usize> {
        poll_fn(|cx| self.poll_fill(cx)).await
    }
}

fn line_too_long(limit: usize) -> NntpError {
    NntpError::protocol(format!("line too long: no CRLF within {limit} bytes"))
}

/// One queued write; `offset` bytes of it already reached the destination
#[derive(Debug)]
struct Chunk {
    data: Vec<u8>,
    offset: usize,
}

/// Output side: bounded write queue drained on write readiness
#[derive(Debug)]
pub struct BufferedOutput<W> {
    dest: W,
    chunks: Arena<Chunk>,
    queue: DList,
    queued: usize,
    max_size: usize,
}

impl<W> BufferedOutput<W> {
    /// Wrap `dest` with a queue holding at most `max_buffer_size` unwritten bytes
    pub fn wrap(dest: W, max_buffer_size: usize) -> Self {
        let mut chunks = Arena::new();
        let queue = chunks.new_list();
        Self {
            dest,
            chunks,
            queue,
            queued: 0,
            max_size: max_buffer_size,
        }
    }

    /// Whether `length` more bytes can be queued without exceeding the maximum
    pub fn has_capacity_available(&self, length: usize) -> bool {
        length <= self.max_size - self.queued
    }

    /// Bytes queued and not yet written
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Whether everything queued has been written
    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    /// Configured maximum
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Borrow the wrapped stream
    pub fn get_ref(&self) -> &W {
        &self.dest
    }

    /// Queue bytes for writing
    ///
    /// # Errors
    ///
    /// [`NntpError::Temporary`] when the queue lacks room; check
    /// [`has_capacity_available`](Self::has_capacity_available) first to defer
    /// instead.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.has_capacity_available(bytes.len()) {
            return Err(NntpError::temporary(format!(
                "output buffer full: {} of {} bytes queued, {} more requested",
                self.queued,
                self.max_size,
                bytes.len()
            )));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let id = self.chunks.insert(Chunk {
            data: bytes.to_vec(),
            offset: 0,
        });
        self.queue.push_back(&mut self.chunks, id);
        self.queued += bytes.len();
        Ok(())
    }

    /// Drop everything still queued
    pub fn discard(&mut self) {
        while let Some(id) = self.queue.pop_front(&mut self.chunks) {
            self.chunks.remove(id);
        }
        self.queued = 0;
    }
}

impl<W: AsyncWrite + Unpin> BufferedOutput<W> {
    /// Write queued chunks until the queue is empty or the destination would block
    ///
    /// Resolves once the queue is drained and the destination flushed.
    pub fn poll_flush_ready(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while let Some(id) = self.queue.front() {
            let Some(chunk) = self.chunks.get_mut(id) else {
                break;
            };
            let n = match Pin::new(&mut self.dest).poll_write(cx, &chunk.data[chunk.offset..]) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Poll::Ready(Ok(n)) => n,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };
            chunk.offset += n;
            self.queued -= n;
            if chunk.offset == chunk.data.len() {
                self.queue.pop_front(&mut self.chunks);
                self.chunks.remove(id);
            }
        }
        Pin::new(&mut self.dest).poll_flush(cx)
    }

    /// Wait until everything queued has been written
    pub async fn flush(&mut self) -> io::Result<()> {
        poll_fn(|cx| self.poll_flush_ready(cx)).await
    }

    /// Shut down the write direction of the destination
    pub fn poll_shutdown(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.dest).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn input() -> BufferedInput<tokio::io::Empty> {
        BufferedInput::wrap(tokio::io::empty(), 64)
    }

    #[test]
    fn test_read_line_complete() {
        let mut input = input();
        input.extend(b"200 ready\r\n281 ok\r\n").unwrap();
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("200 ready"));
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("281 ok"));
        assert_eq!(input.read_line(64).unwrap(), None);
        assert_eq!(input.buffered(), 0);
    }

    #[test]
    fn test_read_line_partial_is_not_an_error() {
        let mut input = input();
        input.extend(b"200 rea").unwrap();
        assert_eq!(input.read_line(64).unwrap(), None);
        input.extend(b"dy\r").unwrap();
        assert_eq!(input.read_line(64).unwrap(), None);
        input.extend(b"\n").unwrap();
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("200 ready"));
    }

    #[test]
    fn test_zero_limit_on_empty_buffer_needs_data() {
        let mut input = input();
        assert_eq!(input.read_line(0).unwrap(), None);

        input.extend(b"2").unwrap();
        assert_eq!(input.read_line(0).unwrap_err().kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn test_read_line_chunking_invariance() {
        let wire = b"100 help\r\nline one\r\n..dotted\r\n.\r\n";
        let mut whole = BufferedInput::wrap(tokio::io::empty(), 128);
        whole.extend(wire).unwrap();
        let mut expected = Vec::new();
        while let Some(line) = whole.read_line(128).unwrap() {
            expected.push(line);
        }

        for chunk_size in 1..wire.len() {
            let mut input = BufferedInput::wrap(tokio::io::empty(), 128);
            let mut lines = Vec::new();
            for piece in wire.chunks(chunk_size) {
                input.extend(piece).unwrap();
                while let Some(line) = input.read_line(128).unwrap() {
                    lines.push(line);
                }
            }
            assert_eq!(lines, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_bare_lf_is_not_a_terminator() {
        let mut input = input();
        input.extend(b"abc\ndef\r\n").unwrap();
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("abc\ndef"));
    }

    #[test]
    fn test_empty_line() {
        let mut input = input();
        input.extend(b"\r\n").unwrap();
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_line_too_long_for_max_length() {
        let mut input = input();
        input.extend(b"0123456789").unwrap();
        let err = input.read_line(8).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
        // Nothing was consumed or truncated
        assert_eq!(input.buffered(), 10);
    }

    #[test]
    fn test_terminator_must_fit_in_max_length() {
        let mut input = input();
        input.extend(b"12345678\r\n").unwrap();
        assert!(input.read_line(9).is_err());
        assert_eq!(input.read_line(10).unwrap().as_deref(), Some("12345678"));
    }

    #[test]
    fn test_extend_beyond_buffer_is_refused() {
        let mut input = BufferedInput::wrap(tokio::io::empty(), 8);
        input.extend(b"1234").unwrap();
        let err = input.extend(b"56789").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
        assert_eq!(input.buffered(), 4);
    }

    #[test]
    fn test_consumed_space_is_reused() {
        let mut input = BufferedInput::wrap(tokio::io::empty(), 8);
        input.extend(b"ab\r\n").unwrap();
        assert_eq!(input.read_line(8).unwrap().as_deref(), Some("ab"));
        input.extend(b"cdefg\r\n").unwrap();
        assert_eq!(input.read_line(8).unwrap().as_deref(), Some("cdefg"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut input = input();
        input.extend(b"200 caf\xFF\r\n").unwrap();
        let line = input.read_line(64).unwrap().unwrap();
        assert!(line.starts_with("200 caf"));
        assert!(line.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_fill_from_stream() {
        let (mut server, client) = tokio::io::duplex(64);
        let mut input = BufferedInput::wrap(client, 256);

        server.write_all(b"200 hel").await.unwrap();
        assert_eq!(input.fill().await.unwrap(), 7);
        assert_eq!(input.read_line(256).unwrap(), None);

        server.write_all(b"lo\r\n").await.unwrap();
        input.fill().await.unwrap();
        assert_eq!(input.read_line(256).unwrap().as_deref(), Some("200 hello"));

        drop(server);
        assert_eq!(input.fill().await.unwrap(), 0);
        assert!(input.is_eof());
    }

    #[tokio::test]
    async fn test_fill_on_full_buffer_is_line_too_long() {
        let (mut server, client) = tokio::io::duplex(64);
        let mut input = BufferedInput::wrap(client, 8);

        server.write_all(b"0123456789\r\n").await.unwrap();
        assert_eq!(input.fill().await.unwrap(), 8);
        assert!(input.read_line(8).is_err());
        let err = input.fill().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn test_output_capacity() {
        let mut output = BufferedOutput::wrap(tokio::io::sink(), 10);
        assert!(output.has_capacity_available(10));
        assert!(!output.has_capacity_available(11));

        output.write(b"QUIT\r\n").unwrap();
        assert_eq!(output.queued(), 6);
        assert!(output.has_capacity_available(4));
        assert!(!output.has_capacity_available(5));

        let err = output.write(b"HELP\r\n").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Temporary);
        assert_eq!(output.queued(), 6);

        output.discard();
        assert!(output.is_empty());
        assert!(output.has_capacity_available(10));
    }

    #[tokio::test]
    async fn test_output_flush_in_order() {
        let mut output = BufferedOutput::wrap(Vec::new(), 64);
        output.write(b"AUTHINFO USER bob\r\n").unwrap();
        output.write(b"AUTHINFO PASS secret\r\n").unwrap();
        output.flush().await.unwrap();

        assert!(output.is_empty());
        assert_eq!(
            output.get_ref().as_slice(),
            b"AUTHINFO USER bob\r\nAUTHINFO PASS secret\r\n"
        );
    }

    #[tokio::test]
    async fn test_output_partial_writes() {
        use tokio::io::AsyncReadExt;

        // A 4-byte pipe forces partial writes and Pending between them
        let (client, mut server) = tokio::io::duplex(4);
        let mut output = BufferedOutput::wrap(client, 64);
        output.write(b"MODE READER\r\n").unwrap();

        let reader = tokio::spawn(async move {
            let mut received = vec![0u8; 13];
            server.read_exact(&mut received).await.unwrap();
            received
        });

        output.flush().await.unwrap();
        assert_eq!(reader.await.unwrap(), b"MODE READER\r\n");
        assert!(output.has_capacity_available(64));
    }
}
