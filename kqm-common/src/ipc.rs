//! IPC envelope exchanged between the supervisor and its workers
//!
//! Every message is `{ "type": string, "payload": any }`. On the wire each
//! envelope is one JSON object terminated by `\n`, carried over the worker's
//! stdin (supervisor → worker) and stdout (worker → supervisor). Workers log
//! to stderr.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

/// Server → scanner: start a scan (payload: scan options, opaque here)
pub const SCANNER_WORKER_SCAN: &str = "scanner/SCAN";

/// Server → scanner: cancel an in-progress scan. Honored by the scanner itself.
pub const SCANNER_WORKER_SCAN_CANCEL: &str = "scanner/SCAN_CANCEL";

/// Server → supervisor: status report; payload carries at least `url`
pub const SERVER_WORKER_STATUS: &str = "server/WORKER_STATUS";

/// One IPC message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Encode as a single line (without the trailing newline)
    pub fn encode_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Ipc(format!("Encode failed: {}", e)))
    }

    pub fn decode_line(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| Error::Ipc(format!("Malformed envelope {:?}: {}", line, e)))
    }
}

/// Reads newline-delimited envelopes from any async reader
pub struct EnvelopeReader<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> EnvelopeReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next envelope, or `None` once the stream is closed. Blank lines are skipped.
    pub async fn next(&mut self) -> Result<Option<Envelope>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Envelope::decode_line(line).map(Some);
        }
        Ok(None)
    }
}

/// Writes newline-delimited envelopes to any async writer
pub struct EnvelopeWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> EnvelopeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let mut line = envelope.encode_line()?;
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// The worker side of the channel: a worker process talks to its supervisor
/// through its own stdin/stdout.
pub struct WorkerLink<R, W> {
    reader: EnvelopeReader<R>,
    writer: EnvelopeWriter<W>,
}

impl WorkerLink<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin> WorkerLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: EnvelopeReader::new(reader),
            writer: EnvelopeWriter::new(writer),
        }
    }

    /// Next message from the supervisor; `None` when the supervisor went away
    pub async fn recv(&mut self) -> Result<Option<Envelope>> {
        self.reader.next().await
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.writer.send(envelope).await
    }
}
