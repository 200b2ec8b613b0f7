// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! I/O endpoints for the console relay: the hardware console connector
//! and the remote client link.
//!
//! Client wire format, version 1: 4-byte length prefix (big-endian) +
//! JSON payload. Version 0 is raw byte passthrough in both directions,
//! kept for old harnesses that just splice the console to a TTY.

use async_trait::async_trait;
use bx_core::JobStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::bucket::BucketHandle;

/// Maximum frame size on the client link (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read size for raw console chunks.
pub const READ_CHUNK_SIZE: usize = 8192;

/// Errors from console/client I/O.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect failed: {0}")]
    ConnectFailed(String),
}

/// Boxed read half of the hardware console.
pub type DutReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of the hardware console.
pub type DutWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connects to the hardware console ("salad") for one job.
#[async_trait]
pub trait ConsoleConnector: Clone + Send + Sync + 'static {
    async fn connect(&self) -> Result<(DutReader, DutWriter), LinkError>;
}

/// TCP console connector (console server address per machine).
#[derive(Clone)]
pub struct TcpConsole {
    addr: String,
}

impl TcpConsole {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl ConsoleConnector for TcpConsole {
    async fn connect(&self) -> Result<(DutReader, DutWriter), LinkError> {
        let stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(|e| LinkError::ConnectFailed(format!("{}: {e}", self.addr)))?;
        let (r, w) = stream.into_split();
        Ok((Box::new(r), Box::new(w)))
    }
}

/// Typed message on the version-1 client link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Console bytes, either direction.
    ConsoleIo { data: Vec<u8> },

    /// Human-readable executor log line.
    Log { severity: String, line: String },

    /// Sent once at teardown: final status plus the bucket handle the
    /// client may keep using after the session.
    SessionEnd {
        status: JobStatus,
        bucket: Option<BucketHandle>,
    },
}

/// Inbound traffic from the client, normalized across protocol versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    Console(Vec<u8>),
}

/// Encode a message to JSON bytes (without length prefix).
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, LinkError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(LinkError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

/// Decode a message from its JSON payload.
pub fn decode(bytes: &[u8]) -> Result<WireMessage, LinkError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed frame. `Ok(None)` means clean EOF.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, LinkError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(LinkError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(LinkError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Write a length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), LinkError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(LinkError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// The remote client attached to a job's console.
///
/// The relay task exclusively owns the link; every method takes
/// `&mut self`.
#[async_trait]
pub trait ClientLink: Send + 'static {
    /// Protocol version the client negotiated.
    fn version(&self) -> u8;

    /// Forward console bytes to the client.
    async fn send_console(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Send a human-readable log line.
    async fn send_log(&mut self, line: &str) -> Result<(), LinkError>;

    /// Send the session-end handoff message.
    async fn send_session_end(
        &mut self,
        status: JobStatus,
        bucket: Option<BucketHandle>,
    ) -> Result<(), LinkError>;

    /// Next inbound input. `Ok(None)` means the client closed its side.
    async fn recv(&mut self) -> Result<Option<ClientInput>, LinkError>;

    /// Half-close the write side, leaving reads open for teardown.
    async fn shutdown_write(&mut self) -> Result<(), LinkError>;
}

/// Version-0 client: raw passthrough, no framing, no handoff message.
pub struct RawClient<T> {
    stream: T,
}

impl<T> RawClient<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ClientLink for RawClient<T> {
    fn version(&self) -> u8 {
        0
    }

    async fn send_console(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send_log(&mut self, line: &str) -> Result<(), LinkError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send_session_end(
        &mut self,
        _status: JobStatus,
        _bucket: Option<BucketHandle>,
    ) -> Result<(), LinkError> {
        // No framing to carry it; the half-close is the signal.
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<ClientInput>, LinkError> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(ClientInput::Console(buf)))
    }

    async fn shutdown_write(&mut self) -> Result<(), LinkError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Version-1 client: length-prefixed JSON messages both ways.
pub struct FramedClient<T> {
    stream: T,
}

impl<T> FramedClient<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ClientLink for FramedClient<T> {
    fn version(&self) -> u8 {
        1
    }

    async fn send_console(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let msg = encode(&WireMessage::ConsoleIo {
            data: bytes.to_vec(),
        })?;
        write_frame(&mut self.stream, &msg).await
    }

    async fn send_log(&mut self, line: &str) -> Result<(), LinkError> {
        let msg = encode(&WireMessage::Log {
            severity: "info".to_string(),
            line: line.to_string(),
        })?;
        write_frame(&mut self.stream, &msg).await
    }

    async fn send_session_end(
        &mut self,
        status: JobStatus,
        bucket: Option<BucketHandle>,
    ) -> Result<(), LinkError> {
        let msg = encode(&WireMessage::SessionEnd { status, bucket })?;
        write_frame(&mut self.stream, &msg).await
    }

    async fn recv(&mut self) -> Result<Option<ClientInput>, LinkError> {
        loop {
            let Some(frame) = read_frame(&mut self.stream).await? else {
                return Ok(None);
            };
            match decode(&frame)? {
                WireMessage::ConsoleIo { data } => return Ok(Some(ClientInput::Console(data))),
                // Log and session-end frames are outbound-only; skip.
                WireMessage::Log { .. } | WireMessage::SessionEnd { .. } => continue,
            }
        }
    }

    async fn shutdown_write(&mut self) -> Result<(), LinkError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Placeholder link for jobs with no client attached. Never used at
/// runtime: the relay only drives a link when one is present.
pub struct NoClient;

#[async_trait]
impl ClientLink for NoClient {
    fn version(&self) -> u8 {
        0
    }

    async fn send_console(&mut self, _bytes: &[u8]) -> Result<(), LinkError> {
        Ok(())
    }

    async fn send_log(&mut self, _line: &str) -> Result<(), LinkError> {
        Ok(())
    }

    async fn send_session_end(
        &mut self,
        _status: JobStatus,
        _bucket: Option<BucketHandle>,
    ) -> Result<(), LinkError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<ClientInput>, LinkError> {
        Ok(None)
    }

    async fn shutdown_write(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{duplex, DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::mpsc;

    /// Console connector backed by an in-memory duplex stream.
    ///
    /// `new()` hands back the peer end: write to it to emit DUT output,
    /// read from it to observe bytes the relay sent to the DUT.
    #[derive(Clone)]
    pub struct FakeConsole {
        halves: Arc<Mutex<Option<(ReadHalf<DuplexStream>, WriteHalf<DuplexStream>)>>>,
        fail: bool,
    }

    impl FakeConsole {
        pub fn new() -> (Self, DuplexStream) {
            let (relay_side, peer) = duplex(64 * 1024);
            let (r, w) = tokio::io::split(relay_side);
            (
                Self {
                    halves: Arc::new(Mutex::new(Some((r, w)))),
                    fail: false,
                },
                peer,
            )
        }

        /// A connector whose `connect` always fails.
        pub fn failing() -> Self {
            Self {
                halves: Arc::new(Mutex::new(None)),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ConsoleConnector for FakeConsole {
        async fn connect(&self) -> Result<(DutReader, DutWriter), LinkError> {
            if self.fail {
                return Err(LinkError::ConnectFailed("scripted failure".to_string()));
            }
            let Some((r, w)) = self.halves.lock().take() else {
                return Err(LinkError::ConnectFailed("already connected".to_string()));
            };
            Ok((Box::new(r), Box::new(w)))
        }
    }

    /// What a fake client observed, for assertions.
    #[derive(Debug, Clone, Default)]
    pub struct FakeClientSeen {
        pub console: Vec<u8>,
        pub logs: Vec<String>,
        pub session_end: Option<(JobStatus, Option<BucketHandle>)>,
        pub write_shutdown: bool,
    }

    /// Scriptable in-memory client link.
    pub struct FakeClient {
        seen: Arc<Mutex<FakeClientSeen>>,
        inbound: mpsc::UnboundedReceiver<ClientInput>,
    }

    impl FakeClient {
        /// Returns the link, a sender for scripting inbound client
        /// traffic (drop it to simulate client EOF), and a shared view
        /// of everything the client received.
        pub fn new() -> (
            Self,
            mpsc::UnboundedSender<ClientInput>,
            Arc<Mutex<FakeClientSeen>>,
        ) {
            let (tx, rx) = mpsc::unbounded_channel();
            let seen = Arc::new(Mutex::new(FakeClientSeen::default()));
            (
                Self {
                    seen: Arc::clone(&seen),
                    inbound: rx,
                },
                tx,
                seen,
            )
        }
    }

    #[async_trait]
    impl ClientLink for FakeClient {
        fn version(&self) -> u8 {
            1
        }

        async fn send_console(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.seen.lock().console.extend_from_slice(bytes);
            Ok(())
        }

        async fn send_log(&mut self, line: &str) -> Result<(), LinkError> {
            self.seen.lock().logs.push(line.to_string());
            Ok(())
        }

        async fn send_session_end(
            &mut self,
            status: JobStatus,
            bucket: Option<BucketHandle>,
        ) -> Result<(), LinkError> {
            self.seen.lock().session_end = Some((status, bucket));
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<ClientInput>, LinkError> {
            Ok(self.inbound.recv().await)
        }

        async fn shutdown_write(&mut self) -> Result<(), LinkError> {
            self.seen.lock().write_shutdown = true;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeClient, FakeClientSeen, FakeConsole};

#[cfg(test)]
#[path = "console_link_tests.rs"]
mod tests;
