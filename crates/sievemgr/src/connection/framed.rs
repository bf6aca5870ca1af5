//! Framed I/O for the ManageSieve protocol.
//!
//! The protocol is CRLF line oriented, with raw byte payloads announced
//! by `{N}` / `{N+}` literal markers at the end of a line. This module
//! provides buffered line reading, exact literal reads and buffered
//! writing; deciding what a line means is left to the session layer.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::Result;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Framed connection for the ManageSieve protocol.
///
/// Handles line-based reading with literal support and buffered writing.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads a single line, including its terminator.
    ///
    /// Protocol lines end in CRLF; a bare LF is accepted too and
    /// treated as a complete line.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(crate::Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // Look for the line terminator
            if let Some(pos) = find_lf(buf) {
                line.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);
                break;
            }

            // No terminator found, consume all and continue
            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            // Check for maximum line length
            if line.len() > MAX_LINE_LENGTH {
                return Err(crate::Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Reads exactly `len` bytes of literal data announced by a marker.
    pub async fn read_literal(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > MAX_LITERAL_SIZE {
            return Err(crate::Error::Protocol(format!(
                "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }

        let mut literal = vec![0u8; len];
        self.reader.read_exact(&mut literal).await?;
        Ok(literal)
    }

    /// Writes a serialized command to the stream and flushes it.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }
}

/// Finds the position of the line-terminating LF in a buffer.
fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_find_lf() {
        assert_eq!(find_lf(b"hello\r\n"), Some(6));
        assert_eq!(find_lf(b"\r\n"), Some(1));
        assert_eq!(find_lf(b"bare\n"), Some(4));
        assert_eq!(find_lf(b"no newline"), None);
        assert_eq!(find_lf(b"just\r"), None);
    }

    #[tokio::test]
    async fn test_read_single_line() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"\"IMPLEMENTATION\" \"Cyrus timsieved\"\r\n").build();
        let mut framed = FramedStream::new(mock);

        let line = framed.read_line().await.unwrap();
        assert_eq!(line, b"\"IMPLEMENTATION\" \"Cyrus timsieved\"\r\n");
    }

    #[tokio::test]
    async fn test_read_line_across_chunks() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"OK \"Lis").read(b"tscripts completed\"\r\n").build();
        let mut framed = FramedStream::new(mock);

        let line = framed.read_line().await.unwrap();
        assert_eq!(line, b"OK \"Listscripts completed\"\r\n");
    }

    #[tokio::test]
    async fn test_read_line_accepts_bare_lf() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"OK\n").build();
        let mut framed = FramedStream::new(mock);

        let line = framed.read_line().await.unwrap();
        assert_eq!(line, b"OK\n");
    }

    #[tokio::test]
    async fn test_read_literal_exact() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"keep;\r\nOK\r\n").build();
        let mut framed = FramedStream::new(mock);

        let literal = framed.read_literal(5).await.unwrap();
        assert_eq!(literal, b"keep;");

        let rest = framed.read_line().await.unwrap();
        assert_eq!(rest, b"\r\n");
    }

    #[tokio::test]
    async fn test_write_command() {
        use tokio_test::io::Builder;

        let mock = Builder::new().write(b"LISTSCRIPTS\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"LISTSCRIPTS\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        use tokio_test::io::Builder;

        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_literal(MAX_LITERAL_SIZE + 1).await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("literal too large")
        );
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        use tokio_test::io::Builder;

        // Create a line longer than MAX_LINE_LENGTH
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_line().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_read_line_at_eof() {
        use tokio_test::io::Builder;

        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_line().await;
        assert!(result.is_err());
    }
}
