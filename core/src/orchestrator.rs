//! Periodic scanning and result classification.
//!
//! One control loop per instance. A timer (first tick immediate) triggers
//! [`NetworkProbe::scan`] on its own task; results are classified as they arrive, and the
//! enrichment / registry work they cause runs in a tracked [`JoinSet`] that is drained on
//! shutdown.
//!
//! ```text
//! Idle ──▶ Scanning ⇄ AwaitingResults ──▶ Stopped
//! ```

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanwatch_common::config::DEFAULT_SCAN_INTERVAL;
use lanwatch_common::models::{Details, Device, DeviceType, DiscoveryResult, SshStatus, Status};
use lanwatch_common::storage::RepoError;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tracing::{Instrument, Span, debug, error, info, trace, warn};

use crate::cancel::{CancelSource, CancelToken};
use crate::detail::DetailProbe;
use crate::lock;
use crate::probe::{NetworkProbe, ProbeError};
use crate::registry::DeviceRegistry;

const RESULT_BUFFER: usize = 1024;
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_DETAIL_TIMEOUT: Duration = Duration::from_secs(60);
/// Shortest accepted scan period; a zero period cannot drive a timer.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrchestratorState {
    Idle,
    Scanning,
    AwaitingResults,
    Stopped,
}

/// Bounded retry for failing scans, with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per scan cycle, including the first.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// What a single result asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// Online server: persist it, gathering details first when SSH answers.
    Upsert { enrich: bool },
    /// Online but unclassified: logged, not tracked.
    Observe,
    MarkOffline,
    Ignore,
}

pub(crate) fn classify(result: &DiscoveryResult) -> Action {
    match (result.status, result.device_type()) {
        (Status::Online, DeviceType::Server) => Action::Upsert {
            enrich: result.ssh_status() == SshStatus::Enabled,
        },
        (Status::Online, DeviceType::Unknown) => Action::Observe,
        (Status::Offline, _) => Action::MarkOffline,
        (Status::Unknown, _) => Action::Ignore,
    }
}

/// Field-wise: fresh facts, else what was stored before, else `"unknown"`.
pub(crate) fn resolve_details(fetched: Option<Details>, prior: Option<Details>) -> Details {
    let fetched = fetched.unwrap_or_default();
    let prior = prior.unwrap_or_default();
    let pick = |fresh: String, old: String| if fresh.trim().is_empty() { old } else { fresh };
    Details {
        hostname: pick(fetched.hostname, prior.hostname),
        os: pick(fetched.os, prior.os),
    }
    .or_unknown()
}

type TaskResult = Result<(), RepoError>;

/// Device ids with a detail probe in flight. Membership ends when the guard drops,
/// including when the task is aborted.
#[derive(Clone, Default)]
struct Enriching(Arc<Mutex<HashSet<String>>>);

struct EnrichGuard {
    ids: Enriching,
    id: String,
}

impl Enriching {
    fn claim(&self, id: &str) -> Option<EnrichGuard> {
        lock(&self.0).insert(id.to_string()).then(|| EnrichGuard {
            ids: self.clone(),
            id: id.to_string(),
        })
    }
}

impl Drop for EnrichGuard {
    fn drop(&mut self) {
        lock(&self.ids.0).remove(&self.id);
    }
}

pub struct Orchestrator {
    probe: Arc<dyn NetworkProbe>,
    details: Arc<dyn DetailProbe>,
    registry: Arc<DeviceRegistry>,
    interval: Duration,
    retry: RetryPolicy,
    drain_grace: Duration,
    detail_timeout: Duration,
    enriching: Enriching,
    errors: Option<mpsc::Sender<String>>,
    state: watch::Sender<OrchestratorState>,
    cancel: CancelSource,
    span: Span,
}

impl Orchestrator {
    pub fn new(
        probe: Arc<dyn NetworkProbe>,
        details: Arc<dyn DetailProbe>,
        registry: Arc<DeviceRegistry>,
        span: Span,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Idle);
        Self {
            probe,
            details,
            registry,
            interval: DEFAULT_SCAN_INTERVAL,
            retry: RetryPolicy::default(),
            drain_grace: DEFAULT_DRAIN_GRACE,
            detail_timeout: DEFAULT_DETAIL_TIMEOUT,
            enriching: Enriching::default(),
            errors: None,
            state,
            cancel: CancelSource::new(),
            span,
        }
    }

    /// Periods below [`MIN_SCAN_INTERVAL`] are raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_SCAN_INTERVAL);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Upper bound on one detail probe; on expiry the device is stored without fresh details.
    pub fn with_detail_timeout(mut self, limit: Duration) -> Self {
        self.detail_timeout = limit;
        self
    }

    /// Non-fatal failures (storage errors from background work) are reported here.
    pub fn with_error_sink(mut self, errors: mpsc::Sender<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    /// Stops the probe and signals the control loop to drain and exit.
    pub fn stop(&self) {
        self.probe.stop();
        self.cancel.cancel();
    }

    /// Runs the control loop until [`stop`](Self::stop) is called or a scan fails for good.
    ///
    /// An instance runs once; a stopped orchestrator returns [`ProbeError::Stopped`].
    pub async fn run(&self) -> Result<(), ProbeError> {
        let claimed = self.state.send_if_modified(|state| {
            let idle = *state == OrchestratorState::Idle;
            if idle {
                *state = OrchestratorState::Scanning;
            }
            idle
        });
        if !claimed {
            return Err(ProbeError::Stopped);
        }
        let outcome = self.control_loop().instrument(self.span.clone()).await;

        self.probe.stop();
        self.cancel.cancel();
        self.state.send_replace(OrchestratorState::Stopped);
        outcome
    }

    async fn control_loop(&self) -> Result<(), ProbeError> {
        let (results_tx, mut results_rx) = mpsc::channel::<DiscoveryResult>(RESULT_BUFFER);
        let (scan_done_tx, mut scan_done_rx) = mpsc::channel::<Result<(), ProbeError>>(1);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut scan_task: Option<tokio::task::JoinHandle<()>> = None;
        let cancel = self.cancel.token();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Ok(()),

                _ = ticker.tick() => {
                    if scan_task.as_ref().is_some_and(|task| !task.is_finished()) {
                        debug!("previous scan still running, skipping tick");
                        continue;
                    }
                    self.state.send_replace(OrchestratorState::Scanning);
                    let probe = self.probe.clone();
                    let (results, done) = (results_tx.clone(), scan_done_tx.clone());
                    let (retry, cancel) = (self.retry, cancel.clone());
                    scan_task = Some(tokio::spawn(
                        async move {
                            let outcome = scan_with_retry(probe.as_ref(), results, retry, &cancel).await;
                            let _ = done.send(outcome).await;
                        }
                        .instrument(self.span.clone()),
                    ));
                }

                Some(outcome) = scan_done_rx.recv() => match outcome {
                    Ok(()) => {
                        self.state.send_replace(OrchestratorState::AwaitingResults);
                    }
                    Err(_) if cancel.is_cancelled() => break Ok(()),
                    Err(e) => {
                        error!(error = %e, "scan failed, orchestrator terminating");
                        break Err(e);
                    }
                },

                Some(result) = results_rx.recv() => self.handle_result(result, &mut tasks),

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => self.report(joined),
            }
        };

        if let Some(task) = scan_task {
            task.abort();
        }
        self.drain(&mut tasks).await;
        outcome
    }

    fn handle_result(&self, result: DiscoveryResult, tasks: &mut JoinSet<TaskResult>) {
        let action = classify(&result);
        trace!(ip = %result.ip, id = %result.id, status = ?result.status, ?action, "result");

        match action {
            Action::Upsert { enrich } => {
                let claim = if enrich {
                    match self.enriching.claim(&result.id) {
                        Some(claim) => Some(claim),
                        None => {
                            debug!(ip = %result.ip, id = %result.id, "detail probe already in flight, skipping");
                            return;
                        }
                    }
                } else {
                    None
                };
                let enrichment = claim.map(|claim| Enrichment {
                    probe: self.details.clone(),
                    limit: self.detail_timeout,
                    cancel: self.cancel.token(),
                    _claim: claim,
                });
                let registry = self.registry.clone();
                tasks.spawn(
                    async move { upsert_server(enrichment, &registry, result).await }.instrument(self.span.clone()),
                );
            }
            Action::Observe => {
                info!(ip = %result.ip, id = %result.id, "unclassified device online");
            }
            Action::MarkOffline => {
                let registry = self.registry.clone();
                let ip = result.ip;
                tasks.spawn(async move { mark_offline(&registry, ip) }.instrument(self.span.clone()));
            }
            Action::Ignore => {
                debug!(ip = %result.ip, status = ?result.status, "no action for status");
            }
        }
    }

    fn report(&self, joined: Result<TaskResult, tokio::task::JoinError>) {
        let message = match joined {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("device registry: {e}"),
            Err(e) if e.is_cancelled() => return,
            Err(e) => format!("background task failed: {e}"),
        };
        error!("{message}");
        if let Some(errors) = &self.errors {
            let _ = errors.try_send(message);
        }
    }

    async fn drain(&self, tasks: &mut JoinSet<TaskResult>) {
        if tasks.is_empty() {
            return;
        }
        debug!(pending = tasks.len(), "draining background work");
        let drained = timeout(self.drain_grace, async {
            while let Some(joined) = tasks.join_next().await {
                self.report(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(pending = tasks.len(), "grace period elapsed, aborting background work");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

async fn scan_with_retry(
    probe: &dyn NetworkProbe,
    results: mpsc::Sender<DiscoveryResult>,
    retry: RetryPolicy,
    cancel: &CancelToken,
) -> Result<(), ProbeError> {
    let mut attempt = 1;
    loop {
        let e = match probe.scan(results.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if matches!(e, ProbeError::Stopped) || cancel.is_cancelled() {
            return Err(e);
        }
        if attempt >= retry.attempts {
            return Err(e);
        }
        let delay = retry.backoff(attempt);
        warn!(attempt, max = retry.attempts, ?delay, error = %e, "scan failed, retrying");
        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancel.cancelled() => return Err(ProbeError::Stopped),
        }
        attempt += 1;
    }
}

/// A claimed detail probe run for one device.
struct Enrichment {
    probe: Arc<dyn DetailProbe>,
    limit: Duration,
    cancel: CancelToken,
    _claim: EnrichGuard,
}

impl Enrichment {
    async fn fetch(self, ip: IpAddr) -> Option<Details> {
        match timeout(self.limit, self.probe.server_details(&self.cancel, ip)).await {
            Ok(Ok(details)) => Some(details),
            Ok(Err(e)) => {
                warn!(ip = %ip, error = %e, "detail probe failed");
                None
            }
            Err(_) => {
                warn!(ip = %ip, limit = ?self.limit, "detail probe timed out");
                None
            }
        }
    }
}

async fn upsert_server(enrichment: Option<Enrichment>, registry: &DeviceRegistry, result: DiscoveryResult) -> TaskResult {
    let fetched = match enrichment {
        Some(enrichment) => enrichment.fetch(result.ip).await,
        None => None,
    };
    let prior = registry.get(&result.id)?.and_then(|device| device.known_details());

    let device = Device::new(result.id.clone(), result.ip)
        .with_details(resolve_details(fetched, prior))
        .with_status(Status::Online, result.ssh_status());
    registry.add_or_update_server(device)?;
    Ok(())
}

fn mark_offline(registry: &DeviceRegistry, ip: IpAddr) -> TaskResult {
    if registry.mark_offline(ip)?.is_none() {
        trace!(ip = %ip, "offline host was not tracked");
    }
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
