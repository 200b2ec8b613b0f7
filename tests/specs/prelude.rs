//! Test helpers for behavioral specifications.
//!
//! Thin fluent wrapper around the built `bx` / `bxr` binaries.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;

use assert_cmd::Command;

/// Returns the path to a binary, checking llvm-cov target directory first.
/// This works with both standard builds and llvm-cov coverage runs.
/// Falls back to resolving relative to the test binary itself when
/// CARGO_MANIFEST_DIR is stale (e.g. compiled by a removed worktree
/// into a shared target directory).
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // The test binary lives at target/debug/deps/specs-<hash>, so its
    // grandparent is target/debug/ where bx and bxr are built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

/// CLI builder for the `bx` control client.
pub fn bx() -> CliBuilder {
    CliBuilder::new(binary_path("bx"))
}

/// CLI builder for the `bxr` runner.
pub fn bxr() -> CliBuilder {
    CliBuilder::new(binary_path("bxr"))
}

/// Fluent builder for black-box binary invocations.
pub struct CliBuilder {
    bin: PathBuf,
    args: Vec<String>,
}

impl CliBuilder {
    fn new(bin: PathBuf) -> Self {
        Self {
            bin,
            args: Vec::new(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    fn run(self) -> Output {
        Command::new(&self.bin)
            .args(&self.args)
            .output()
            .unwrap_or_else(|e| panic!("failed to run {}: {e}", self.bin.display()))
    }

    /// Run and assert a zero exit code.
    pub fn passes(self) -> CliResult {
        let output = self.run();
        assert!(
            output.status.success(),
            "expected success, got {:?}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        );
        CliResult { output }
    }

    /// Run and assert a non-zero exit code.
    pub fn fails(self) -> CliResult {
        let output = self.run();
        assert!(
            !output.status.success(),
            "expected failure, got success\nstdout: {}",
            String::from_utf8_lossy(&output.stdout)
        );
        CliResult { output }
    }

    /// Run and assert a specific exit code.
    pub fn exits(self, code: i32) -> CliResult {
        let output = self.run();
        assert_eq!(
            output.status.code(),
            Some(code),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        CliResult { output }
    }
}

/// Assertion helpers over a completed invocation.
pub struct CliResult {
    output: Output,
}

impl CliResult {
    pub fn stdout_has(self, needle: &str) -> Self {
        let stdout = String::from_utf8_lossy(&self.output.stdout);
        assert!(
            stdout.contains(needle),
            "stdout missing {needle:?}:\n{stdout}"
        );
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        let stderr = String::from_utf8_lossy(&self.output.stderr);
        assert!(
            stderr.contains(needle),
            "stderr missing {needle:?}:\n{stderr}"
        );
        self
    }
}

/// Write a minimal valid runner config into `dir`, returning its path.
pub fn write_runner_config(dir: &Path) -> PathBuf {
    let path = dir.join("runner.yaml");
    let cache_dir = dir.join("cache");
    let yaml = format!(
        concat!(
            "machine_id: bench-spec\n",
            "console:\n",
            "  addr: 127.0.0.1:1\n",
            "pdu:\n",
            "  on_cmd: \"true\"\n",
            "  off_cmd: \"true\"\n",
            "cache:\n",
            "  dir: {}\n",
            "  base_url: http://127.0.0.1:8100/cache\n",
        ),
        cache_dir.display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}
