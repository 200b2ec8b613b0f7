// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! The console relay: one task per job splicing the hardware console to
//! the remote client, feeding every line through the console classifier.
//!
//! Lifecycle, strictly forward:
//!
//! ```text
//! CREATED --start--> ACTIVE --(DUT EOF | session end)--> DUT_DONE
//! DUT_DONE --(no client)--> OVER
//! DUT_DONE --teardown--> TEAR_DOWN --(client closes | teardown expiry)--> OVER
//! any state --close--> OVER
//! ```
//!
//! The relay task exclusively owns both endpoints. The executor holds a
//! [`JobConsole`] handle and only requests transitions or samples the
//! shared snapshot; entry side effects (closing the DUT side, the
//! session-end handoff) always run on the relay task when it observes
//! the new state. Any I/O fault is fatal to the relay, never retried.

use bx_core::{format_relative, ConsoleState, JobStatus, Timeouts};
use parking_lot::Mutex;
use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bx_adapters::{
    BucketHandle, ClientInput, ClientLink, ConsoleConnector, DutReader, DutWriter, LinkError,
};

/// Read size for hardware console chunks.
const READ_CHUNK_SIZE: usize = 8192;

/// How often the relay wakes with no I/O to re-check its state.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// Relay lifecycle state. Ordering is part of the contract: transitions
/// only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayState {
    Created,
    Active,
    DutDone,
    TearDown,
    Over,
}

impl RelayState {
    fn next(self) -> RelayState {
        match self {
            RelayState::Created => RelayState::Active,
            RelayState::Active => RelayState::DutDone,
            RelayState::DutDone => RelayState::TearDown,
            RelayState::TearDown | RelayState::Over => RelayState::Over,
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayState::Created => "CREATED",
            RelayState::Active => "ACTIVE",
            RelayState::DutDone => "DUT_DONE",
            RelayState::TearDown => "TEAR_DOWN",
            RelayState::Over => "OVER",
        };
        write!(f, "{}", s)
    }
}

/// Errors from relay state handling.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A caller asked for a transition that would move the lifecycle
    /// backwards. This is a bug in the caller, not a runtime condition.
    #[error("backward console transition requested: {from} -> {to}")]
    BackwardTransition { from: RelayState, to: RelayState },
}

struct RelayShared {
    state: RelayState,
    start_time: Option<Instant>,
    last_activity_from_machine: Option<Instant>,
    last_activity_from_client: Option<Instant>,
    console: ConsoleState,
    bucket: Option<BucketHandle>,
}

enum Outbound {
    Log(String),
}

/// Handle to a job's console relay.
///
/// Cheap to clone; all clones observe the same relay. The task itself
/// is returned separately by [`JobConsole::spawn`] so exactly one owner
/// can join it.
#[derive(Clone)]
pub struct JobConsole {
    shared: Arc<Mutex<RelayShared>>,
    timeouts: Arc<Mutex<Timeouts>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl JobConsole {
    /// Start the relay task. `client` is `None` when no remote client is
    /// attached; the relay then skips TEAR_DOWN entirely.
    pub fn spawn<C, L>(
        connector: C,
        client: Option<L>,
        console: ConsoleState,
        timeouts: Arc<Mutex<Timeouts>>,
    ) -> (Self, JoinHandle<()>)
    where
        C: ConsoleConnector,
        L: ClientLink,
    {
        let shared = Arc::new(Mutex::new(RelayShared {
            state: RelayState::Created,
            start_time: None,
            last_activity_from_machine: None,
            last_activity_from_client: None,
            console,
            bucket: None,
        }));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = Self {
            shared: Arc::clone(&shared),
            timeouts: Arc::clone(&timeouts),
            outbound: outbound_tx,
        };
        let task_handle = handle.clone();
        let task = tokio::spawn(async move {
            RelayTask {
                shared,
                timeouts,
                handle: task_handle,
                client,
                outbound_rx,
            }
            .run(connector)
            .await;
        });
        (handle, task)
    }

    pub fn state(&self) -> RelayState {
        self.shared.lock().state
    }

    /// Request a forward transition. Requesting the current state is a
    /// no-op; a strictly backward request is an error.
    pub fn set_state(&self, to: RelayState) -> Result<(), RelayError> {
        let mut shared = self.shared.lock();
        if to < shared.state {
            return Err(RelayError::BackwardTransition {
                from: shared.state,
                to,
            });
        }
        shared.state = to;
        Ok(())
    }

    /// Advance to `to` if the relay is not already past it. Returns the
    /// resulting state. Used where a concurrent advance (e.g. the
    /// no-client auto-skip) makes a strict request racy.
    pub fn advance_to(&self, to: RelayState) -> RelayState {
        let mut shared = self.shared.lock();
        if to > shared.state {
            shared.state = to;
        }
        shared.state
    }

    /// Force the relay to OVER.
    pub fn close(&self) {
        self.advance_to(RelayState::Over);
    }

    /// Queue a log line for the client, prefixed with the relative
    /// session timestamp, and mirror it to tracing.
    pub fn log(&self, line: &str) {
        let prefixed = {
            let shared = self.shared.lock();
            match shared.start_time {
                Some(start) => format!("{}: {}", format_relative(start.elapsed()), line),
                None => line.to_string(),
            }
        };
        info!(target: "bx::job", "{}", prefixed);
        // Relay gone means nobody is listening; nothing to do.
        let _ = self.outbound.send(Outbound::Log(prefixed));
    }

    /// Bucket handle carried in the session-end handoff message.
    pub fn set_bucket(&self, bucket: Option<BucketHandle>) {
        self.shared.lock().bucket = bucket;
    }

    pub fn last_activity_from_machine(&self) -> Option<Instant> {
        self.shared.lock().last_activity_from_machine
    }

    pub fn last_activity_from_client(&self) -> Option<Instant> {
        self.shared.lock().last_activity_from_client
    }

    pub fn session_has_ended(&self) -> bool {
        self.shared.lock().console.session_has_ended()
    }

    pub fn needs_reboot(&self) -> bool {
        self.shared.lock().console.needs_reboot()
    }

    pub fn machine_is_unfit_for_service(&self) -> bool {
        self.shared.lock().console.machine_is_unfit_for_service()
    }

    pub fn job_status(&self) -> JobStatus {
        self.shared.lock().console.job_status()
    }

    /// Discard the per-boot reboot flag before a new cycle.
    pub fn reset_per_boot_state(&self) {
        self.shared.lock().console.reset_per_boot_state();
    }

    /// Stop every watchdog-bound timeout.
    ///
    /// Lock order is shared-then-timeouts here and in the relay task;
    /// callers must not hold the timeouts lock.
    pub fn cancel_watchdogs(&self) {
        let shared = self.shared.lock();
        let mut timeouts = self.timeouts.lock();
        shared.console.cancel_watchdogs(&mut timeouts);
    }
}

struct RelayTask<L: ClientLink> {
    shared: Arc<Mutex<RelayShared>>,
    timeouts: Arc<Mutex<Timeouts>>,
    handle: JobConsole,
    client: Option<L>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl<L: ClientLink> RelayTask<L> {
    async fn run<C: ConsoleConnector>(mut self, connector: C) {
        let (mut dut_reader, mut dut_writer) = match connector.connect().await {
            Ok(pair) => (Some(pair.0), Some(pair.1)),
            Err(e) => {
                warn!("could not connect to the machine console: {e}");
                self.handle.close();
                return;
            }
        };

        {
            let mut shared = self.shared.lock();
            shared.state = RelayState::Active;
            shared.start_time = Some(Instant::now());
        }
        debug!("console relay active");

        let mut observed = RelayState::Active;
        let mut client_eof = false;
        let mut line_buf: Vec<u8> = Vec::new();
        let mut saw_terminator = false;
        let mut read_buf = vec![0u8; READ_CHUNK_SIZE];
        let mut tick = tokio::time::interval(IDLE_TICK);

        loop {
            observed = self.apply_transitions(observed, &mut dut_reader, &mut dut_writer).await;
            if observed == RelayState::Over {
                break;
            }

            let dut_readable = dut_reader.is_some();
            let client_readable = self.client.is_some() && !client_eof;

            tokio::select! {
                read = read_dut(dut_reader.as_mut(), &mut read_buf), if dut_readable => {
                    match read {
                        Ok(0) => {
                            debug!("machine console EOF");
                            dut_reader = None;
                            self.handle.advance_to(RelayState::DutDone);
                        }
                        Ok(n) => {
                            let ended = self.process_dut_chunk(
                                &read_buf[..n],
                                &mut line_buf,
                                &mut saw_terminator,
                            );
                            if self.forward_to_client(&read_buf[..n]).await.is_err() {
                                self.handle.close();
                            } else if ended {
                                self.handle.advance_to(RelayState::DutDone);
                            }
                        }
                        Err(e) => {
                            warn!("machine console read failed: {e}");
                            self.handle.close();
                        }
                    }
                }
                input = recv_client(self.client.as_mut()), if client_readable => {
                    match input {
                        Ok(Some(ClientInput::Console(bytes))) => {
                            self.shared.lock().last_activity_from_client = Some(Instant::now());
                            if let Some(w) = dut_writer.as_mut() {
                                if let Err(e) = write_dut(w, &bytes).await {
                                    warn!("machine console write failed: {e}");
                                    self.handle.close();
                                }
                            }
                        }
                        Ok(None) => {
                            // Clean client close: benign during teardown,
                            // fatal to the relay at any other time.
                            client_eof = true;
                            self.handle.close();
                        }
                        Err(e) => {
                            warn!("client read failed: {e}");
                            client_eof = true;
                            self.handle.close();
                        }
                    }
                }
                msg = self.outbound_rx.recv() => {
                    if let Some(Outbound::Log(line)) = msg {
                        if let Some(client) = self.client.as_mut() {
                            if let Err(e) = client.send_log(&line).await {
                                warn!("client log write failed: {e}");
                                self.handle.close();
                            }
                        }
                    }
                }
                _ = tick.tick() => {}
            }
        }

        // OVER: both endpoints drop here; close is idempotent.
        debug!("console relay over");
    }

    /// Run entry actions for every state passed since `observed`.
    /// Returns the new observed state.
    async fn apply_transitions(
        &mut self,
        mut observed: RelayState,
        dut_reader: &mut Option<DutReader>,
        dut_writer: &mut Option<DutWriter>,
    ) -> RelayState {
        loop {
            let target = self.shared.lock().state;
            if observed >= target {
                return observed;
            }
            let entering = observed.next();
            match entering {
                RelayState::DutDone => {
                    if self.client.is_none() {
                        self.handle.advance_to(RelayState::Over);
                    }
                }
                RelayState::TearDown => {
                    *dut_reader = None;
                    *dut_writer = None;
                    if let Some(client) = self.client.as_mut() {
                        let (status, bucket) = {
                            let shared = self.shared.lock();
                            (shared.console.job_status(), shared.bucket.clone())
                        };
                        if let Err(e) = send_handoff(client, status, bucket).await {
                            warn!("session end handoff failed: {e}");
                            self.handle.close();
                        }
                    }
                }
                RelayState::Over => {
                    *dut_reader = None;
                    *dut_writer = None;
                }
                RelayState::Created | RelayState::Active => {}
            }
            observed = entering;
        }
    }

    /// Feed a chunk of machine output through the line buffer and the
    /// classifier. Returns true if the session has now ended.
    fn process_dut_chunk(
        &mut self,
        chunk: &[u8],
        line_buf: &mut Vec<u8>,
        saw_terminator: &mut bool,
    ) -> bool {
        line_buf.extend_from_slice(chunk);
        if chunk.contains(&b'\n') {
            *saw_terminator = true;
        }

        let now = Instant::now();
        let mut shared = self.shared.lock();
        let mut timeouts = self.timeouts.lock();

        while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = line_buf.drain(..=pos).collect();
            let labels = shared.console.process_line(&line, &mut timeouts, now);
            if !labels.is_empty() {
                drop(timeouts);
                drop(shared);
                self.handle
                    .log(&format!("Matched the following patterns: {}", labels.join(", ")));
                shared = self.shared.lock();
                timeouts = self.timeouts.lock();
            }
        }

        // Ignore boot-time noise before the first line terminator.
        if *saw_terminator {
            shared.last_activity_from_machine = Some(now);
        }
        shared.console.session_has_ended()
    }

    async fn forward_to_client(&mut self, chunk: &[u8]) -> Result<(), LinkError> {
        if let Some(client) = self.client.as_mut() {
            if let Err(e) = client.send_console(chunk).await {
                warn!("client console write failed: {e}");
                return Err(e);
            }
        }
        Ok(())
    }
}

async fn read_dut(reader: Option<&mut DutReader>, buf: &mut [u8]) -> std::io::Result<usize> {
    match reader {
        Some(r) => tokio::io::AsyncReadExt::read(r, buf).await,
        None => pending().await,
    }
}

async fn write_dut(writer: &mut DutWriter, bytes: &[u8]) -> std::io::Result<()> {
    tokio::io::AsyncWriteExt::write_all(writer, bytes).await?;
    tokio::io::AsyncWriteExt::flush(writer).await
}

async fn recv_client<L: ClientLink>(
    client: Option<&mut L>,
) -> Result<Option<ClientInput>, LinkError> {
    match client {
        Some(c) => c.recv().await,
        None => pending().await,
    }
}

async fn send_handoff<L: ClientLink>(
    client: &mut L,
    status: JobStatus,
    bucket: Option<BucketHandle>,
) -> Result<(), LinkError> {
    client.send_session_end(status, bucket).await?;
    client.shutdown_write().await
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
