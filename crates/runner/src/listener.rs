// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Control listener for a running job.
//!
//! Accepts unix-socket connections and serves one request per
//! connection against the shared [`ExecutorHandle`], without blocking
//! the executor.

use std::sync::Arc;

use bx_adapters::BootImageFlasher;
use bx_engine::ExecutorHandle;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

use crate::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT};

/// Listener task for accepting control connections.
pub struct Listener<Fl: BootImageFlasher> {
    socket: UnixListener,
    handle: Arc<ExecutorHandle<Fl>>,
}

impl<Fl: BootImageFlasher> Listener<Fl> {
    pub fn new(socket: UnixListener, handle: Arc<ExecutorHandle<Fl>>) -> Self {
        Self { socket, handle }
    }

    /// Run the accept loop, spawning a task per connection. Runs until
    /// the task is aborted at session end.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let handle = Arc::clone(&self.handle);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handle).await {
                            match e {
                                ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                ProtocolError::Timeout => warn!("control connection timeout"),
                                _ => error!("control connection error: {e}"),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {e}");
                }
            }
        }
    }
}

/// Handle one request/response exchange.
async fn handle_connection<Fl: BootImageFlasher>(
    stream: UnixStream,
    handle: Arc<ExecutorHandle<Fl>>,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(request = ?request, "received control request");

    let response = match request {
        Request::State => Response::State {
            state: handle.state(),
        },
        Request::Cancel => {
            handle.cancel();
            Response::Ok
        }
        Request::BootConfig {
            platform,
            buildarch,
            bootloader,
        } => match handle.boot_config(&platform, &buildarch, &bootloader).await {
            Ok(config) => Response::BootConfig { config },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
    };

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
