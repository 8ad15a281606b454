//! JSON-RPC framing codec for LSP communication.
//!
//! LSP uses `Content-Length: N\r\n\r\n{json}` framing over stdin/stdout.
//! This module provides [`FrameReader`] and [`FrameWriter`] for async
//! reading and writing of framed JSON-RPC messages.
//!
//! Recoverable protocol damage (a header block without `Content-Length`, a
//! body that is not valid JSON) drops that single frame and continues with
//! the stream; only truncation and oversized frames are fatal.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (16 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

enum HeaderBlock {
    /// Clean EOF before any header byte.
    Eof,
    /// A complete header block that declared no usable `Content-Length`.
    MissingLength,
    Length(usize),
}

/// Reads JSON-RPC frames from an async reader.
///
/// Parses `Content-Length` headers and reads exactly that many bytes,
/// then deserializes the body as JSON.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next well-formed JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on EOF (clean shutdown). Skips header blocks with
    /// no `Content-Length` and bodies that fail to parse as JSON.
    /// Returns `Err` on truncated streams or oversized frames.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        loop {
            let content_length = match self.read_headers().await? {
                HeaderBlock::Eof => return Ok(None),
                HeaderBlock::MissingLength => {
                    tracing::warn!("missing Content-Length header, discarding header block");
                    continue;
                }
                HeaderBlock::Length(len) => len,
            };

            if content_length > MAX_FRAME_BYTES {
                bail!("Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}");
            }

            let mut body = vec![0u8; content_length];
            self.reader
                .read_exact(&mut body)
                .await
                .context("reading frame body")?;

            match serde_json::from_slice(&body) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    tracing::warn!("dropping unparsable JSON-RPC frame: {e}");
                }
            }
        }
    }

    /// Parse headers until the empty line separator.
    async fn read_headers(&mut self) -> Result<HeaderBlock> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .context("reading header line")?;

            if bytes_read == 0 {
                // EOF — only valid if we haven't started reading headers at all.
                if !saw_any_header_bytes {
                    return Ok(HeaderBlock::Eof);
                }
                bail!("unexpected EOF while reading headers");
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Empty line = end of headers
                break;
            }

            // LSP spec uses "Content-Length" but parse case-insensitively for robustness.
            if let Some(colon_pos) = trimmed.find(':') {
                let key = &trimmed[..colon_pos];
                if key.eq_ignore_ascii_case("Content-Length") {
                    content_length = trimmed[colon_pos + 1..].trim().parse().ok();
                }
            }
            // Ignore other headers (e.g. Content-Type)
        }

        match content_length {
            Some(len) => Ok(HeaderBlock::Length(len)),
            None => Ok(HeaderBlock::MissingLength),
        }
    }
}

/// Writes JSON-RPC frames to an async writer.
///
/// Serializes JSON and prepends the `Content-Length` header.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_string(msg).context("serializing JSON-RPC frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(body.as_bytes())
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;

        Ok(())
    }
}
