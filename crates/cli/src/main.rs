// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! bx - Bench Executor control client
//!
//! Talks to a running `bxr` over its unix control socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bx_runner::protocol::{self, Request, Response, DEFAULT_TIMEOUT};
use clap::{Parser, Subcommand};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "bx", version, about = "Bench Executor - job control client")]
struct Cli {
    /// Control socket of the runner
    #[arg(long)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the job's lifecycle state
    State,
    /// Cancel the job
    Cancel,
    /// Fetch the boot configuration for a network-boot request
    BootConfig {
        #[arg(long)]
        platform: String,
        #[arg(long)]
        buildarch: String,
        #[arg(long)]
        bootloader: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let request = match cli.command {
        Commands::State => Request::State,
        Commands::Cancel => Request::Cancel,
        Commands::BootConfig {
            platform,
            buildarch,
            bootloader,
        } => Request::BootConfig {
            platform,
            buildarch,
            bootloader,
        },
    };

    match exchange(&cli.socket, &request).await? {
        Response::State { state } => println!("{state}"),
        Response::Ok => println!("ok"),
        Response::BootConfig { config } => {
            println!("{}", serde_json::to_string_pretty(&config)?)
        }
        Response::Error { message } => bail!("runner refused the request: {message}"),
    }
    Ok(())
}

/// One request/response exchange against the runner's control socket.
async fn exchange(socket: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("connecting to {}", socket.display()))?;
    let (mut reader, mut writer) = stream.into_split();

    protocol::write_request(&mut writer, request, DEFAULT_TIMEOUT)
        .await
        .context("sending request")?;
    protocol::read_response(&mut reader, DEFAULT_TIMEOUT)
        .await
        .context("reading response")
}
