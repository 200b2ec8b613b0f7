// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Bench Executor runner (bxr)
//!
//! Per-job process: given a runner config and a job definition, it
//! drives one machine through the job (power, console relay, boot
//! cycles) and exits with the job status as its exit code.
//!
//! Architecture:
//! - Executor loop: main task, owns the PDU and the phase sequence
//! - Relay task: owns the DUT console and the optional client link
//! - Listener task: unix-socket control surface (state / boot-config /
//!   cancel)

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bx_adapters::{
    CommandPdu, FramedClient, HttpFetcher, HttpInventory, Inventory, InventoryError, NoClient,
    NoOpBucket, NoOpFlasher, NoOpInventory, RawClient, TcpConsole,
};
use bx_core::{Job, JobStatus, SystemClock};
use bx_engine::{Executor, ExecutorTuning};
use bx_runner::config::{ConfigError, RunnerConfig};
use bx_runner::listener::Listener;
use clap::Parser;
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "bxr", version, about = "Bench Executor job runner")]
struct Args {
    /// Runner (machine wiring) configuration file
    #[arg(long)]
    config: PathBuf,

    /// Job definition file
    #[arg(long)]
    job: PathBuf,

    /// Unix socket path for the control surface
    #[arg(long)]
    socket: PathBuf,

    /// Pid lock file; refuses to start if another runner holds it
    #[arg(long)]
    lock: Option<PathBuf>,

    /// Job id used for bucket and log naming (default: job file stem)
    #[arg(long)]
    job_id: Option<String>,

    /// Log file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// `host:port` of a client to attach to the job console
    #[arg(long)]
    client: Option<String>,

    /// Client protocol version: 0 = raw passthrough, 1 = framed
    #[arg(long, default_value_t = 1)]
    client_version: u8,
}

/// Errors that abort the runner before the job starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("runner config: {0}")]
    Config(#[from] ConfigError),

    #[error("job definition: {0}")]
    Job(#[from] bx_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another runner holds the lock at {path}")]
    Locked { path: PathBuf },

    #[error("client connect failed: {0}")]
    Client(String),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(status) => {
            info!(%status, "job finished");
            status.exit_code()
        }
        Err(e) => {
            eprintln!("bxr: {e}");
            error!("runner startup failed: {e}");
            JobStatus::Incomplete.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<JobStatus, StartupError> {
    let config = RunnerConfig::from_file(&args.config)?;
    let _log_guard = setup_logging(args.log_file.as_deref())?;

    // Held for the life of the process; released on exit.
    let _lock = match &args.lock {
        Some(path) => Some(acquire_lock(path)?),
        None => None,
    };

    let job = Job::from_file(&args.job)?;
    let job_id = args.job_id.clone().unwrap_or_else(|| job_id_from(&args.job));

    std::fs::create_dir_all(&config.cache.dir)?;
    if args.socket.exists() {
        std::fs::remove_file(&args.socket)?;
    }
    let socket = UnixListener::bind(&args.socket)?;

    let inventory = match &config.inventory_url {
        Some(url) => RunnerInventory::Http(HttpInventory::new(url.clone())),
        None => RunnerInventory::NoOp(NoOpInventory::new()),
    };
    let pdu = CommandPdu::new(
        config.pdu.on_cmd.clone(),
        config.pdu.off_cmd.clone(),
        config.pdu.min_off_time(),
    );
    let connector = TcpConsole::new(config.console.addr.clone());

    let executor = Executor::new(
        job,
        job_id.clone(),
        config.machine_id.clone(),
        pdu,
        HttpFetcher::new(),
        NoOpBucket::new(),
        inventory,
        NoOpFlasher::new(),
        SystemClock::new(),
        ExecutorTuning::default(),
        config.cache.dir.clone(),
        config.cache.base_url.clone(),
    );

    let listener_task = tokio::spawn(Listener::new(socket, executor.handle()).run());

    info!(
        job_id,
        machine_id = config.machine_id,
        socket = %args.socket.display(),
        "runner ready"
    );

    let status = match &args.client {
        None => executor.run(connector, None::<NoClient>).await,
        Some(addr) => {
            let stream = tokio::net::TcpStream::connect(addr)
                .await
                .map_err(|e| StartupError::Client(format!("{addr}: {e}")))?;
            if args.client_version == 0 {
                executor.run(connector, Some(RawClient::new(stream))).await
            } else {
                executor
                    .run(connector, Some(FramedClient::new(stream)))
                    .await
            }
        }
    };

    listener_task.abort();
    let _ = std::fs::remove_file(&args.socket);
    Ok(status)
}

/// Inventory wiring: HTTP when an inventory service is configured,
/// no-op otherwise.
#[derive(Clone)]
enum RunnerInventory {
    Http(HttpInventory),
    NoOp(NoOpInventory),
}

#[async_trait]
impl Inventory for RunnerInventory {
    async fn report_unfit(&self, machine_id: &str) -> Result<(), InventoryError> {
        match self {
            RunnerInventory::Http(inner) => inner.report_unfit(machine_id).await,
            RunnerInventory::NoOp(inner) => inner.report_unfit(machine_id).await,
        }
    }
}

fn job_id_from(job_path: &Path) -> String {
    job_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}

fn acquire_lock(path: &Path) -> Result<File, StartupError> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive().map_err(|_| StartupError::Locked {
        path: path.to_path_buf(),
    })?;

    // Write the pid now that the lock is held.
    let mut file = file;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

fn setup_logging(
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, StartupError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "bxr.log".to_string());
            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
