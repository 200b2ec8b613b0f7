// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! The per-job control loop.
//!
//! Phases are strictly sequential: session init, infra setup, the
//! boot-cycle loop, teardown, session end. There is no phase enum; the
//! observable state is the relay's lifecycle plus timeout expiry, and
//! the session-end cleanup runs unconditionally whatever happened
//! before it.
//!
//! All waits are bounded polls (`poll_interval`), so cancellation and
//! expiry are noticed within one interval, and the PDU is only ever
//! touched from this task.

use bx_adapters::{
    ArtifactFetcher, BootImageFlasher, BucketAdapter, BucketHandle, ClientLink, ConsoleConnector,
    Inventory, PduPort, PduState,
};
use bx_core::{BootConfig, Clock, DeploymentState, Job, JobStatus, Timeouts};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use crate::error::ExecuteError;
use crate::relay::{JobConsole, RelayState};

/// Timing knobs for the executor. Production uses the defaults; tests
/// shrink them.
#[derive(Debug, Clone)]
pub struct ExecutorTuning {
    /// Bounded-poll interval for the inner wait loops.
    pub poll_interval: Duration,
    /// Drain delay before teardown so in-flight console bytes land.
    pub console_drain_delay: Duration,
    /// Backoff after an unexpected error, before cleanup.
    pub error_backoff: Duration,
    /// Attempts per artifact download.
    pub download_attempts: u32,
    /// Delay between download attempts.
    pub download_retry_delay: Duration,
}

impl Default for ExecutorTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            console_drain_delay: Duration::from_secs(1),
            error_backoff: Duration::from_secs(2),
            download_attempts: 6,
            download_retry_delay: Duration::from_secs(10),
        }
    }
}

/// Control-surface view of a running executor, shared with the socket
/// listener. Cancellation is a flag observed at every poll; nothing is
/// interrupted mid-call.
pub struct ExecutorHandle<Fl: BootImageFlasher> {
    cancel: AtomicBool,
    relay: Mutex<Option<JobConsole>>,
    cur_deployment: Mutex<DeploymentState>,
    /// Remote artifact URL -> locally-served cache URL.
    artifact_urls: Mutex<HashMap<String, String>>,
    flasher: Fl,
}

impl<Fl: BootImageFlasher> ExecutorHandle<Fl> {
    pub fn new(job: &Job, flasher: Fl) -> Arc<Self> {
        Arc::new(Self {
            cancel: AtomicBool::new(false),
            relay: Mutex::new(None),
            cur_deployment: Mutex::new(job.deployment.start.clone()),
            artifact_urls: Mutex::new(HashMap::new()),
            flasher,
        })
    }

    /// Relay lifecycle state name, `CREATED` until the relay exists.
    pub fn state(&self) -> String {
        match self.relay.lock().as_ref() {
            Some(relay) => relay.state().to_string(),
            None => RelayState::Created.to_string(),
        }
    }

    /// Request cancellation. Observed at the next poll.
    pub fn cancel(&self) {
        info!("job cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Boot configuration for the current deployment, with artifact
    /// URLs rewritten to the local cache so the DUT boots off the lab
    /// network. `fastboot` targets additionally go through the flasher.
    pub async fn boot_config(
        &self,
        platform: &str,
        buildarch: &str,
        bootloader: &str,
    ) -> Result<BootConfig, ExecuteError> {
        let deployment = self.cur_deployment.lock().clone();
        let mut boot = BootConfig::from_deployment(&deployment);
        {
            let urls = self.artifact_urls.lock();
            if let Some(local) = urls.get(&boot.kernel) {
                boot.kernel = local.clone();
            }
            if let Some(local) = urls.get(&boot.initrd) {
                boot.initrd = local.clone();
            }
            if let Some(dtb) = boot.dtb.as_mut() {
                if let Some(local) = urls.get(dtb) {
                    *dtb = local.clone();
                }
            }
        }
        boot.fixup_missing_fields_with_defaults(platform, buildarch);

        if boot.dtb.is_some() && bootloader != "uboot" {
            warn!(bootloader, "a dtb is set but the bootloader will ignore it");
        }
        if bootloader == "fastboot" {
            self.flasher.build_and_boot(&boot).await?;
        }
        Ok(boot)
    }

    fn attach_relay(&self, relay: JobConsole) {
        *self.relay.lock() = Some(relay);
    }

    fn set_deployment(&self, deployment: DeploymentState) {
        *self.cur_deployment.lock() = deployment;
    }

    fn current_deployment(&self) -> DeploymentState {
        self.cur_deployment.lock().clone()
    }

    fn record_artifact(&self, remote: &str, local: String) {
        self.artifact_urls.lock().insert(remote.to_string(), local);
    }
}

/// The per-job executor. Owns the PDU port and the relay for exactly
/// one job, then exits with a [`JobStatus`].
pub struct Executor<P, F, B, I, Fl, C>
where
    P: PduPort,
    F: ArtifactFetcher,
    B: BucketAdapter,
    I: Inventory,
    Fl: BootImageFlasher,
    C: Clock,
{
    job: Job,
    job_id: String,
    machine_id: String,
    pdu: P,
    fetcher: F,
    buckets: B,
    inventory: I,
    clock: C,
    tuning: ExecutorTuning,
    /// Directory artifacts are cached into.
    cache_dir: PathBuf,
    /// Base URL under which `cache_dir` is served to the DUT.
    cache_base_url: String,
    handle: Arc<ExecutorHandle<Fl>>,
    timeouts: Arc<Mutex<Timeouts>>,
}

impl<P, F, B, I, Fl, C> Executor<P, F, B, I, Fl, C>
where
    P: PduPort,
    F: ArtifactFetcher,
    B: BucketAdapter,
    I: Inventory,
    Fl: BootImageFlasher,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job: Job,
        job_id: impl Into<String>,
        machine_id: impl Into<String>,
        pdu: P,
        fetcher: F,
        buckets: B,
        inventory: I,
        flasher: Fl,
        clock: C,
        tuning: ExecutorTuning,
        cache_dir: PathBuf,
        cache_base_url: impl Into<String>,
    ) -> Self {
        let handle = ExecutorHandle::new(&job, flasher);
        let timeouts = Arc::new(Mutex::new(job.timeouts.clone()));
        Self {
            job,
            job_id: job_id.into(),
            machine_id: machine_id.into(),
            pdu,
            fetcher,
            buckets,
            inventory,
            clock,
            tuning,
            cache_dir,
            cache_base_url: cache_base_url.into(),
            handle,
            timeouts,
        }
    }

    /// Control-surface handle for the socket listener.
    pub fn handle(&self) -> Arc<ExecutorHandle<Fl>> {
        Arc::clone(&self.handle)
    }

    /// Run the job to completion. Never panics, never skips cleanup:
    /// whatever `execute_job` returns, the session-end phase powers the
    /// machine off, closes the relay and releases the bucket.
    pub async fn run<Co, L>(self, connector: Co, client: Option<L>) -> JobStatus
    where
        Co: ConsoleConnector,
        L: ClientLink,
    {
        // session_init: relay first, then power off immediately so
        // min_off_time elapses concurrently with infra setup.
        let (relay, relay_task) = JobConsole::spawn(
            connector,
            client,
            self.job.console_state(),
            Arc::clone(&self.timeouts),
        );
        self.handle.attach_relay(relay.clone());

        let mut bucket: Option<BucketHandle> = None;
        let result = match self.pdu.set(PduState::Off).await {
            Ok(()) => self.execute_job(&relay, &mut bucket).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            error!("job execution failed: {e}");
            relay.log(&format!("Job failed with an unexpected error: {e}"));
            tokio::time::sleep(self.tuning.error_backoff).await;
        }

        // session_end: unconditional cleanup, runs exactly once.
        if let Err(e) = self.pdu.set(PduState::Off).await {
            warn!("final power-off failed: {e}");
        }
        relay.close();
        if relay_task.await.is_err() {
            warn!("console relay task failed");
        }
        if let Some(bucket) = bucket.take() {
            if let Err(e) = self.buckets.remove(&bucket).await {
                warn!("bucket removal failed: {e}");
            }
        }

        match result {
            Ok(()) => relay.job_status(),
            Err(_) => JobStatus::Incomplete,
        }
    }

    async fn execute_job(
        &self,
        relay: &JobConsole,
        bucket: &mut Option<BucketHandle>,
    ) -> Result<(), ExecuteError> {
        self.timeouts.lock().overall.start(self.clock.now());

        self.infra_setup(relay, bucket).await?;
        self.boot_cycle_loop(relay).await?;

        if relay.state() == RelayState::DutDone {
            self.teardown(relay).await;
        }
        Ok(())
    }

    async fn infra_setup(
        &self,
        relay: &JobConsole,
        bucket: &mut Option<BucketHandle>,
    ) -> Result<(), ExecuteError> {
        self.timeouts.lock().infra_setup.start(self.clock.now());
        relay.log("Setting up the infrastructure");

        *bucket = self.buckets.create(&self.job_id, &self.machine_id).await?;
        if let Some(bucket) = bucket.as_mut() {
            self.buckets.setup(bucket).await?;
            // Owner credentials ride in the session-end handoff so the
            // client can keep using the bucket after the job.
            bucket.credentials = Some(self.buckets.credentials(bucket, "owner").await?);
            relay.set_bucket(Some(bucket.clone()));
        }

        let deployments = [&self.job.deployment.start, &self.job.deployment.continues];
        for deployment in deployments {
            for url in deployment.artifact_urls() {
                let local = self.download_and_cache(relay, url).await;
                match local {
                    Ok(local) => self.handle.record_artifact(url, local),
                    Err(e) => {
                        // Unrecoverable: force the relay over, no teardown.
                        relay.log(&format!("Failed to prepare the job artifacts: {e}"));
                        relay.close();
                        return Err(e);
                    }
                }
            }
        }

        self.timeouts.lock().infra_setup.stop();
        Ok(())
    }

    /// Download one artifact into the cache, with the fixed per-artifact
    /// retry budget. Returns the URL the cached copy is served under.
    async fn download_and_cache(
        &self,
        relay: &JobConsole,
        url: &str,
    ) -> Result<String, ExecuteError> {
        let file_name = cache_file_name(url);
        let dest = self.cache_dir.join(&file_name);

        for attempt in 1..=self.tuning.download_attempts {
            match self.fetcher.fetch(url, &dest).await {
                Ok(()) => {
                    return Ok(format!(
                        "{}/{}",
                        self.cache_base_url.trim_end_matches('/'),
                        file_name
                    ));
                }
                Err(e) if attempt < self.tuning.download_attempts => {
                    relay.log(&format!(
                        "Download of {url} failed (attempt {attempt}/{}): {e}",
                        self.tuning.download_attempts
                    ));
                    tokio::time::sleep(self.tuning.download_retry_delay).await;
                }
                Err(e) => {
                    warn!("download of {url} exhausted its attempts: {e}");
                }
            }
        }
        Err(ExecuteError::DownloadExhausted {
            url: url.to_string(),
            attempts: self.tuning.download_attempts,
        })
    }

    async fn boot_cycle_loop(&self, relay: &JobConsole) -> Result<(), ExecuteError> {
        while self.may_continue(relay) {
            relay.reset_per_boot_state();
            relay.log(&format!(
                "Powering up the machine, enforcing {:.1}s of down time",
                self.pdu.min_off_time().as_secs_f64()
            ));

            // Full power cycle every attempt, including the first.
            self.pdu.set(PduState::Off).await?;
            self.pdu.set(PduState::On).await?;

            {
                let now = self.clock.now();
                let mut timeouts = self.timeouts.lock();
                timeouts.boot_cycle.start(now);
                timeouts.first_console_activity.start(now);
                timeouts.console_activity.stop();
            }
            relay.cancel_watchdogs();

            self.wait_for_cycle_end(relay).await;

            self.pdu.set(PduState::Off).await?;

            let abort = self.account_for_expiries(relay);
            if abort {
                relay.log("Aborting the job");
                relay.advance_to(RelayState::DutDone);
            } else {
                let mut timeouts = self.timeouts.lock();
                timeouts.first_console_activity.stop();
                timeouts.console_activity.stop();
                timeouts.boot_cycle.stop();
                drop(timeouts);
                // Every cycle after the first boots the continue deployment.
                self.handle.set_deployment(self.job.deployment.continues.clone());
            }
        }
        Ok(())
    }

    fn may_continue(&self, relay: &JobConsole) -> bool {
        !self.handle.is_cancelled()
            && !self.timeouts.lock().overall.has_expired(self.clock.now())
            && !self.deadline_passed()
            && relay.state() < RelayState::DutDone
    }

    /// Inner wait loop: poll until the cycle is decided.
    async fn wait_for_cycle_end(&self, relay: &JobConsole) {
        loop {
            if relay.state() >= RelayState::DutDone
                || relay.needs_reboot()
                || self.handle.is_cancelled()
            {
                return;
            }
            let now = self.clock.now();
            if self.timeouts.lock().has_expired(now) {
                return;
            }
            if let Some(activity) = relay.last_activity_from_machine() {
                let mut timeouts = self.timeouts.lock();
                timeouts.first_console_activity.stop();
                // Extend from the observed activity instant, not from
                // now; bursty polling must not widen the window.
                timeouts.console_activity.reset(activity);
            }
            tokio::time::sleep(self.tuning.poll_interval).await;
        }
    }

    /// Charge every expired timeout (and a DUT-requested reboot) against
    /// its retry budget. Returns true when the job must abort.
    fn account_for_expiries(&self, relay: &JobConsole) -> bool {
        let mut abort = false;
        let now = self.clock.now();

        let expired = self.timeouts.lock().expired_names(now);
        for name in &expired {
            let mut timeouts = self.timeouts.lock();
            let budget_left = timeouts
                .iter_mut()
                .find(|t| t.name() == name.as_str())
                .map(|t| {
                    let left = t.retry();
                    (left, t.retried(), t.retries())
                });
            drop(timeouts);
            if let Some((left, retried, retries)) = budget_left {
                relay.log(&format!(
                    "Hit the {name} timeout ({retried}/{retries} retries used)"
                ));
                if !left {
                    abort = true;
                }
            }
        }

        if relay.needs_reboot() {
            // A requested reboot spends a boot_cycle retry even when the
            // wall clock never expired.
            let (left, retried, retries) = {
                let mut timeouts = self.timeouts.lock();
                let left = timeouts.boot_cycle.retry();
                (left, timeouts.boot_cycle.retried(), timeouts.boot_cycle.retries())
            };
            relay.log(&format!(
                "The machine requested a reboot ({retried}/{retries} boot_cycle retries used)"
            ));
            if !left {
                abort = true;
            }
        }

        abort
    }

    async fn teardown(&self, relay: &JobConsole) {
        if relay.machine_is_unfit_for_service() {
            relay.log("The machine is unfit for service, reporting it");
            // Best effort, never retried.
            if let Err(e) = self.inventory.report_unfit(&self.machine_id).await {
                warn!("unfit-for-service report failed: {e}");
            }
        }

        self.timeouts.lock().infra_teardown.start(self.clock.now());
        // Let in-flight console messages drain before the handoff.
        tokio::time::sleep(self.tuning.console_drain_delay).await;
        relay.advance_to(RelayState::TearDown);

        while relay.state() < RelayState::Over
            && !self.handle.is_cancelled()
            && !self
                .timeouts
                .lock()
                .infra_teardown
                .has_expired(self.clock.now())
        {
            tokio::time::sleep(self.tuning.poll_interval).await;
        }
        self.timeouts.lock().infra_teardown.stop();
    }

    fn deadline_passed(&self) -> bool {
        let Some(deadline) = self.job.deadline else {
            return false;
        };
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|now| now.as_secs() > deadline)
            .unwrap_or(false)
    }
}

/// Stable cache file name for an artifact URL.
fn cache_file_name(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
