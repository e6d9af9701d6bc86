//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! Input is read in arbitrary chunks and split by a [`LineAccumulator`], so
//! a message split across several reads is reassembled before decoding.

use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::mcp::protocol::JsonRpcReply;

/// Size of a single read from the input stream.
const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into newline-terminated lines.
///
/// Holds at most one partial line between calls to [`push`](Self::push).
#[derive(Debug, Default)]
pub struct LineAccumulator {
    pending: Vec<u8>,
}

impl LineAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Appends `chunk` and returns every line it completed, without the
    /// terminator (`\n` or `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(take_line(&mut self.pending));
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);

        lines
    }

    /// Returns the unterminated remainder at end of stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(take_line(&mut self.pending))
        }
    }

    /// Number of buffered bytes not yet part of a complete line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}

/// A line-delimited JSON-RPC transport over any byte stream pair.
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    lines: LineAccumulator,
    ready: VecDeque<String>,
    buf: Vec<u8>,
    eof: bool,
}

impl StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over arbitrary streams.
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            lines: LineAccumulator::new(),
            ready: VecDeque::new(),
            buf: vec![0; READ_CHUNK],
            eof: false,
        }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` once the stream is closed and every buffered line has
    /// been returned. An unterminated final line is returned as a line.
    /// Cancelling the returned future loses no input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the stream fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                self.eof = true;
                if let Some(rest) = self.lines.finish() {
                    return Ok(Some(rest));
                }
                return Ok(None);
            }
            self.ready.extend(self.lines.push(&self.buf[..n]));
        }
    }

    /// Writes a reply as a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_reply(&mut self, reply: &JsonRpcReply) -> io::Result<()> {
        let json = serde_json::to_string(reply)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    /// Writes a raw JSON string with newline termination.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // Messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Resolves when the process is asked to stop (SIGINT/SIGTERM).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        tracing::warn!("Failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves when the process is asked to stop (Ctrl+C).
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    } else {
        tracing::warn!("Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse, RequestId};

    #[test]
    fn accumulator_keeps_partial_line() {
        let mut acc = LineAccumulator::new();
        assert!(acc.push(b"{\"a\":").is_empty());
        assert_eq!(acc.pending_len(), 5);
        assert_eq!(acc.push(b"1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(acc.push(b":2}\r\n\n"), vec!["{\"b\":2}".to_string(), String::new()]);
        assert_eq!(acc.pending_len(), 0);
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn accumulator_flushes_remainder() {
        let mut acc = LineAccumulator::new();
        acc.push(b"tail");
        assert_eq!(acc.finish(), Some("tail".to_string()));
        assert_eq!(acc.finish(), None);
    }

    #[tokio::test]
    async fn reads_lines_split_across_chunks() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"id\":1}\n{\"id\"")
            .read(b":2}\n")
            .read(b"{\"id\":3}")
            .build();
        let mut transport = StdioTransport::with_io(reader, Vec::new());

        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("{\"id\":1}"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("{\"id\":2}"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("{\"id\":3}"));
        assert_eq!(transport.read_line().await.unwrap(), None);
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writes_one_line_per_reply() {
        let mut transport = StdioTransport::with_io(tokio::io::empty(), Vec::new());
        let ok = JsonRpcResponse::success(
            Some(RequestId::Number(1.into())),
            serde_json::json!({ "nested": { "key": "value" } }),
        );
        transport.write_reply(&ok.into()).await.unwrap();
        transport
            .write_reply(&JsonRpcError::parse_error("bad").into())
            .await
            .unwrap();

        let out = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""id":1"#));
        assert!(lines[1].contains(r#""id":null"#));
        assert!(lines[1].contains("-32700"));
    }
}
