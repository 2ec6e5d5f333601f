//! Top-level wiring: configuration, probes, orchestrator and event fan-out.
//!
//! The controller owns one [`EventBus`] and one [`DeviceRegistry`] for its whole life. The
//! probe pair and the [`Orchestrator`] driving them are rebuilt whenever the active
//! configuration changes; listener registrations survive the rebuild.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanwatch_common::config::{ConfigError, DetailKind, ProbeKind, ScanConfig};
use lanwatch_common::storage::{ConfigRepo, DeviceRepo, RepoError};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, trace, warn};

use crate::cancel::{CancelSource, CancelToken};
use crate::detail::DetailProbe;
use crate::detail::command::CommandProbe;
use crate::detail::facts::FactsProbe;
use crate::event::{DEFAULT_LISTENER_CAPACITY, Event, EventBus, EventType};
use crate::lock;
use crate::orchestrator::{DEFAULT_DRAIN_GRACE, Orchestrator, OrchestratorState, RetryPolicy};
use crate::probe::connect::ConnectProbe;
use crate::probe::external::ExternalProbe;
use crate::probe::raw::RawProbe;
use crate::probe::{NetworkProbe, ProbeError};
use crate::process::{CommandRunner, ProcessRunner};
use crate::registry::DeviceRegistry;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] RepoError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("controller already started")]
    AlreadyStarted,
    #[error("controller has been stopped")]
    Stopped,
}

/// Builds the probe pair for a configuration.
pub trait ProbeFactory: Send + Sync {
    fn network_probe(&self, config: &ScanConfig, bus: Arc<EventBus>) -> Result<Arc<dyn NetworkProbe>, ProbeError>;
    fn detail_probe(&self, config: &ScanConfig) -> Arc<dyn DetailProbe>;
}

/// Real probes, selected by [`ProbeKind`] and [`DetailKind`].
pub struct SystemProbes {
    runner: Arc<dyn CommandRunner>,
}

impl Default for SystemProbes {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }
}

impl SystemProbes {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl ProbeFactory for SystemProbes {
    fn network_probe(&self, config: &ScanConfig, bus: Arc<EventBus>) -> Result<Arc<dyn NetworkProbe>, ProbeError> {
        Ok(match config.probe {
            ProbeKind::RawArpSyn => Arc::new(RawProbe::new(config, Some(bus))?),
            ProbeKind::TcpConnect => {
                let targets = config
                    .expand_targets()
                    .map_err(|e| ProbeError::Parse(e.to_string()))?;
                Arc::new(ConnectProbe::new(targets))
            }
            ProbeKind::External => Arc::new(ExternalProbe::new(config.targets.clone(), self.runner.clone())),
        })
    }

    fn detail_probe(&self, config: &ScanConfig) -> Arc<dyn DetailProbe> {
        match config.detail {
            DetailKind::Facts => Arc::new(FactsProbe::new(config.clone(), self.runner.clone())),
            DetailKind::Command => Arc::new(CommandProbe::new(config.clone(), self.runner.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Bus(u64),
    Registry(u64),
}

type Outcome = (u64, Result<(), ProbeError>);

#[derive(Clone)]
struct Channels {
    done: mpsc::Sender<Outcome>,
    errors: mpsc::Sender<String>,
}

struct Running {
    orchestrator: Arc<Orchestrator>,
    task: JoinHandle<()>,
}

impl Running {
    async fn shutdown(self) {
        self.orchestrator.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "orchestrator task did not finish cleanly");
        }
    }
}

#[derive(Default)]
struct Inner {
    config: Option<ScanConfig>,
    channels: Option<Channels>,
    running: Option<Running>,
    control: Option<JoinHandle<()>>,
}

pub struct Controller {
    configs: Arc<dyn ConfigRepo>,
    factory: Arc<dyn ProbeFactory>,
    bus: Arc<EventBus>,
    registry: Arc<DeviceRegistry>,
    retry: RetryPolicy,
    drain_grace: Duration,
    generation: Arc<AtomicU64>,
    registrations: Mutex<Vec<Registration>>,
    inner: AsyncMutex<Inner>,
    cancel: CancelSource,
    span: Span,
}

impl Controller {
    pub fn new(
        configs: Arc<dyn ConfigRepo>,
        devices: Arc<dyn DeviceRepo>,
        factory: Arc<dyn ProbeFactory>,
        span: Span,
    ) -> Self {
        Self {
            configs,
            factory,
            bus: Arc::new(EventBus::new()),
            registry: Arc::new(DeviceRegistry::new(devices)),
            retry: RetryPolicy::default(),
            drain_grace: DEFAULT_DRAIN_GRACE,
            generation: Arc::new(AtomicU64::new(0)),
            registrations: Mutex::new(Vec::new()),
            inner: AsyncMutex::new(Inner::default()),
            cancel: CancelSource::new(),
            span,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.registry.clone()
    }

    /// Loads the active (or last written) configuration and starts scanning it.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        if self.cancel.is_cancelled() {
            return Err(ControllerError::Stopped);
        }
        if inner.channels.is_some() {
            return Err(ControllerError::AlreadyStarted);
        }

        let config = match self.configs.get_active_or_last_loaded() {
            Ok(config) => config,
            Err(RepoError::NotFound) => return Err(ConfigError::NoActive.into()),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;

        let (done, done_rx) = mpsc::channel(4);
        let (errors, errors_rx) = mpsc::channel(DEFAULT_LISTENER_CAPACITY);
        let channels = Channels { done, errors };

        let (events, events_rx) = mpsc::channel(DEFAULT_LISTENER_CAPACITY);
        let internal = [
            Registration::Registry(self.registry.stream_events(events.clone())),
            Registration::Bus(self.bus.register_listener(EventType::ArpUpdate, events.clone())),
            Registration::Bus(self.bus.register_listener(EventType::SynUpdate, events)),
        ];
        let running = match self.launch(&config, &channels) {
            Ok(running) => running,
            Err(e) => {
                internal.into_iter().for_each(|registration| self.release(registration));
                return Err(e.into());
            }
        };
        internal.into_iter().for_each(|registration| self.track(registration));

        let control = ControlLoop {
            bus: self.bus.clone(),
            generation: self.generation.clone(),
            cancel: self.cancel.token(),
            done_rx,
            errors_rx,
            events_rx,
        };
        inner.control = Some(tokio::spawn(control.run().instrument(self.span.clone())));

        info!(parent: &self.span, config = %config.id, probe = ?config.probe, details = ?config.detail, "controller started");
        inner.config = Some(config);
        inner.channels = Some(channels);
        inner.running = Some(running);
        Ok(())
    }

    /// Activates the stored configuration `id` and rebuilds the probes against it.
    pub async fn set_config(&self, id: &str) -> Result<(), ControllerError> {
        let mut config = match self.configs.get(id) {
            Ok(config) => config,
            Err(RepoError::NotFound) => return Err(ConfigError::NotFound(id.to_string()).into()),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        for mut other in self.configs.get_all()? {
            if other.active && other.id != config.id {
                other.active = false;
                self.configs.update(&other)?;
            }
        }
        config.active = true;
        self.configs.update(&config)?;

        let mut inner = self.inner.lock().await;
        self.rebuild(&mut inner, config).await
    }

    /// Persists `config`; when it is the one being scanned, the probes are rebuilt.
    pub async fn update_config(&self, config: ScanConfig) -> Result<(), ControllerError> {
        config.validate()?;
        match self.configs.get(&config.id) {
            Ok(_) => self.configs.update(&config)?,
            Err(RepoError::NotFound) => self.configs.create(&config)?,
            Err(e) => return Err(e.into()),
        }

        let mut inner = self.inner.lock().await;
        if inner.config.as_ref().is_some_and(|current| current.id == config.id) {
            self.rebuild(&mut inner, config).await?;
        }
        Ok(())
    }

    pub async fn config(&self) -> Option<ScanConfig> {
        self.inner.lock().await.config.clone()
    }

    pub async fn state(&self) -> OrchestratorState {
        match &self.inner.lock().await.running {
            Some(running) => running.orchestrator.state(),
            None if self.cancel.is_cancelled() => OrchestratorState::Stopped,
            None => OrchestratorState::Idle,
        }
    }

    /// Registers `tx` on the bus; the registration is removed on [`stop`](Self::stop).
    pub fn register_listener(&self, kind: EventType, tx: mpsc::Sender<Event>) -> u64 {
        let id = self.bus.register_listener(kind, tx);
        self.track(Registration::Bus(id));
        id
    }

    pub fn remove_listener(&self, id: u64) -> u64 {
        lock(&self.registrations).retain(|registration| *registration != Registration::Bus(id));
        self.bus.remove_listener(id)
    }

    /// Stops the orchestrator, ends the control loop and drops every tracked listener.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(running) = inner.running.take() {
            running.shutdown().await;
        }
        self.cancel.cancel();

        let registrations: Vec<Registration> = lock(&self.registrations).drain(..).collect();
        for registration in registrations {
            self.release(registration);
        }

        if let Some(control) = inner.control.take() {
            let _ = control.await;
        }
        inner.channels = None;
        info!(parent: &self.span, "controller stopped");
    }

    fn track(&self, registration: Registration) {
        lock(&self.registrations).push(registration);
    }

    fn release(&self, registration: Registration) {
        match registration {
            Registration::Bus(id) => self.bus.remove_listener(id),
            Registration::Registry(id) => self.registry.stop_stream(id),
        };
    }

    /// Replaces the running orchestrator. When the new probes cannot be built, nothing is
    /// left running, the previous configuration stays current and bus listeners get an
    /// [`Event::Error`].
    async fn rebuild(&self, inner: &mut Inner, config: ScanConfig) -> Result<(), ControllerError> {
        let Some(channels) = inner.channels.clone() else {
            inner.config = Some(config);
            return Ok(());
        };

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(running) = inner.running.take() {
            running.shutdown().await;
        }
        info!(parent: &self.span, config = %config.id, generation, "rebuilding probes");

        match self.launch_generation(&config, &channels, generation) {
            Ok(running) => {
                inner.running = Some(running);
                inner.config = Some(config);
                Ok(())
            }
            Err(e) => {
                error!(parent: &self.span, config = %config.id, generation, error = %e, "rebuild failed, scanning halted");
                self.bus.send_error(format!("rebuilding probes for '{}': {e}", config.id));
                Err(e.into())
            }
        }
    }

    fn launch(&self, config: &ScanConfig, channels: &Channels) -> Result<Running, ProbeError> {
        self.launch_generation(config, channels, self.generation.load(Ordering::Acquire))
    }

    fn launch_generation(
        &self,
        config: &ScanConfig,
        channels: &Channels,
        generation: u64,
    ) -> Result<Running, ProbeError> {
        let probe = self.factory.network_probe(config, self.bus.clone())?;
        let details = self.factory.detail_probe(config);
        let span = info_span!(parent: &self.span, "orchestrator", config = %config.id, generation);

        let orchestrator = Arc::new(
            Orchestrator::new(probe, details, self.registry.clone(), span)
                .with_interval(config.scan_interval)
                .with_retry(self.retry)
                .with_drain_grace(self.drain_grace)
                .with_error_sink(channels.errors.clone()),
        );

        let done = channels.done.clone();
        let task = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                let outcome = match tokio::spawn(async move { orchestrator.run().await }).await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(ProbeError::Aborted(e.to_string())),
                };
                let _ = done.send((generation, outcome)).await;
            }
        });
        Ok(Running { orchestrator, task })
    }
}

struct ControlLoop {
    bus: Arc<EventBus>,
    generation: Arc<AtomicU64>,
    cancel: CancelToken,
    done_rx: mpsc::Receiver<Outcome>,
    errors_rx: mpsc::Receiver<String>,
    events_rx: mpsc::Receiver<Event>,
}

impl ControlLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some((generation, outcome)) = self.done_rx.recv() => {
                    let current = generation == self.generation.load(Ordering::Acquire);
                    match outcome {
                        Err(e) if current => {
                            error!(generation, error = %e, "orchestrator terminated");
                            self.bus.send_fatal(e);
                        }
                        Err(e) => debug!(generation, error = %e, "replaced orchestrator exited with error"),
                        Ok(()) => debug!(generation, "orchestrator exited"),
                    }
                }

                Some(message) = self.errors_rx.recv() => {
                    warn!(error = %message, "background failure");
                    self.bus.send_error(message);
                }

                Some(event) = self.events_rx.recv() => self.on_event(event),

                else => break,
            }
        }
        debug!("control loop finished");
    }

    fn on_event(&self, event: Event) {
        match &event {
            Event::ServerUpdate(device) => {
                info!(
                    id = %device.id,
                    ip = %device.ip,
                    hostname = %device.hostname,
                    os = %device.os,
                    status = ?device.status,
                    ssh = ?device.ssh_status,
                    "server update"
                );
                self.bus.send(event);
            }
            Event::ArpUpdate(result) => debug!(ip = %result.ip, id = %result.id, "arp reply"),
            Event::SynUpdate(result) => debug!(ip = %result.ip, id = %result.id, ports = ?result.ports, "syn reply"),
            other => trace!(kind = ?other.kind(), "event ignored"),
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::DetailError;
    use crate::storage::{MemoryConfigRepo, MemoryDeviceRepo};
    use async_trait::async_trait;
    use lanwatch_common::models::{Details, DiscoveryResult, Port, PortStatus, SSH_PORT, Status};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicBool;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn config(id: &str, active: bool) -> ScanConfig {
        ScanConfig {
            id: id.into(),
            name: id.into(),
            targets: vec!["10.0.0.9".into()],
            scan_interval: Duration::from_secs(3600),
            active,
            ..Default::default()
        }
    }

    struct OneShot {
        batch: Vec<DiscoveryResult>,
        fail: bool,
        panic_on_stop: AtomicBool,
    }

    #[async_trait]
    impl NetworkProbe for OneShot {
        async fn scan(&self, results: mpsc::Sender<DiscoveryResult>) -> Result<(), ProbeError> {
            if self.fail {
                return Err(ProbeError::Capture("link down".into()));
            }
            for result in &self.batch {
                let _ = results.send(result.clone()).await;
            }
            Ok(())
        }

        fn stop(&self) {
            if self.panic_on_stop.swap(false, Ordering::SeqCst) {
                panic!("capture handle already released");
            }
        }
    }

    struct FixedDetails;

    #[async_trait]
    impl DetailProbe for FixedDetails {
        async fn server_details(&self, _: &CancelToken, _: IpAddr) -> Result<Details, DetailError> {
            Ok(Details::new("db01", "Debian"))
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        fail: bool,
        panic_on_stop: bool,
        /// Builds allowed before every further one is refused.
        budget: Option<usize>,
        built: Mutex<Vec<String>>,
    }

    impl ProbeFactory for RecordingFactory {
        fn network_probe(&self, config: &ScanConfig, _: Arc<EventBus>) -> Result<Arc<dyn NetworkProbe>, ProbeError> {
            let mut built = self.built.lock().unwrap();
            if self.budget.is_some_and(|budget| built.len() >= budget) {
                return Err(ProbeError::Privilege);
            }
            built.push(config.id.clone());
            Ok(Arc::new(OneShot {
                batch: vec![DiscoveryResult::new(ip(9), Status::Online).with_port(Port::new(SSH_PORT, PortStatus::Open))],
                fail: self.fail,
                panic_on_stop: AtomicBool::new(self.panic_on_stop),
            }))
        }

        fn detail_probe(&self, _: &ScanConfig) -> Arc<dyn DetailProbe> {
            Arc::new(FixedDetails)
        }
    }

    fn controller(configs: MemoryConfigRepo, factory: Arc<RecordingFactory>) -> Controller {
        Controller::new(Arc::new(configs), Arc::new(MemoryDeviceRepo::new()), factory, Span::none()).with_retry(
            RetryPolicy {
                attempts: 2,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn start_without_any_config_fails() {
        let controller = controller(MemoryConfigRepo::new(), Arc::default());
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, ControllerError::Config(ConfigError::NoActive)));
    }

    #[tokio::test]
    async fn server_updates_reach_bus_listeners() {
        let controller = controller(MemoryConfigRepo::with_config(config("home", true)), Arc::default());
        let (tx, mut rx) = mpsc::channel(8);
        controller.register_listener(EventType::ServerUpdate, tx);

        controller.start().await.unwrap();
        match timeout(WAIT, rx.recv()).await.unwrap() {
            Some(Event::ServerUpdate(device)) => {
                assert_eq!(device.ip, ip(9));
                assert_eq!(device.hostname, "db01");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(controller.start().await, Err(ControllerError::AlreadyStarted)));
        controller.stop().await;
    }

    #[tokio::test]
    async fn terminal_scan_failure_is_rebroadcast_as_fatal() {
        let factory = Arc::new(RecordingFactory {
            fail: true,
            ..Default::default()
        });
        let controller = controller(MemoryConfigRepo::with_config(config("home", true)), factory);
        let (tx, mut rx) = mpsc::channel(8);
        controller.register_listener(EventType::FatalError, tx);

        controller.start().await.unwrap();
        match timeout(WAIT, rx.recv()).await.unwrap() {
            Some(Event::FatalError(message)) => assert!(message.contains("link down")),
            other => panic!("unexpected {other:?}"),
        }
        controller.stop().await;
    }

    #[tokio::test]
    async fn updating_the_active_config_rebuilds_probes() {
        let repo = MemoryConfigRepo::with_config(config("home", true));
        let factory = Arc::new(RecordingFactory::default());
        let controller = controller(repo, factory.clone());
        controller.start().await.unwrap();

        let mut changed = config("home", true);
        changed.targets = vec!["10.0.0.0/30".into()];
        controller.update_config(changed.clone()).await.unwrap();
        controller.update_config(config("lab", false)).await.unwrap();

        assert_eq!(*factory.built.lock().unwrap(), vec!["home", "home"]);
        assert_eq!(controller.config().await, Some(changed));
        controller.stop().await;
    }

    #[tokio::test]
    async fn set_config_switches_the_active_config() {
        let repo = Arc::new(MemoryConfigRepo::with_config(config("home", true)));
        repo.create(&config("lab", false)).unwrap();
        let factory = Arc::new(RecordingFactory::default());
        let controller =
            Controller::new(repo.clone(), Arc::new(MemoryDeviceRepo::new()), factory.clone(), Span::none());
        controller.start().await.unwrap();

        controller.set_config("lab").await.unwrap();
        assert_eq!(controller.config().await.map(|c| c.id), Some("lab".to_string()));
        assert!(!repo.get("home").unwrap().active);
        assert!(repo.get("lab").unwrap().active);
        assert_eq!(*factory.built.lock().unwrap(), vec!["home", "lab"]);

        let err = controller.set_config("missing").await.unwrap_err();
        assert!(matches!(err, ControllerError::Config(ConfigError::NotFound(id)) if id == "missing"));
        controller.stop().await;
    }

    #[tokio::test]
    async fn stop_removes_every_tracked_listener() {
        let controller = controller(MemoryConfigRepo::with_config(config("home", true)), Arc::default());
        let (tx, mut rx) = mpsc::channel(8);
        controller.register_listener(EventType::Error, tx);
        controller.start().await.unwrap();
        assert_eq!(controller.bus().listener_count(), 3);

        controller.stop().await;
        assert_eq!(controller.bus().listener_count(), 0);
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
        assert_eq!(controller.state().await, OrchestratorState::Stopped);
        assert!(matches!(controller.start().await, Err(ControllerError::Stopped)));
    }

    #[tokio::test]
    async fn zero_interval_config_is_rejected() {
        let mut stalled = config("home", true);
        stalled.scan_interval = Duration::ZERO;
        let factory = Arc::new(RecordingFactory::default());
        let controller = controller(MemoryConfigRepo::with_config(stalled.clone()), factory.clone());

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, ControllerError::Config(ConfigError::InvalidInterval(id)) if id == "home"));
        assert!(factory.built.lock().unwrap().is_empty());

        let err = controller.update_config(stalled).await.unwrap_err();
        assert!(matches!(err, ControllerError::Config(ConfigError::InvalidInterval(_))));
    }

    #[tokio::test]
    async fn crashed_orchestrator_is_rebroadcast_as_fatal() {
        let factory = Arc::new(RecordingFactory {
            fail: true,
            panic_on_stop: true,
            ..Default::default()
        });
        let controller = controller(MemoryConfigRepo::with_config(config("home", true)), factory);
        let (tx, mut rx) = mpsc::channel(8);
        controller.register_listener(EventType::FatalError, tx);

        controller.start().await.unwrap();
        match timeout(WAIT, rx.recv()).await.unwrap() {
            Some(Event::FatalError(message)) => assert!(message.contains("aborted"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
        controller.stop().await;
    }

    #[tokio::test]
    async fn failed_rebuild_reports_error_and_keeps_previous_config() {
        let factory = Arc::new(RecordingFactory {
            budget: Some(1),
            ..Default::default()
        });
        let controller = controller(MemoryConfigRepo::with_config(config("home", true)), factory.clone());
        let (tx, mut rx) = mpsc::channel(8);
        controller.register_listener(EventType::Error, tx);
        controller.start().await.unwrap();

        let mut changed = config("home", true);
        changed.targets = vec!["10.0.0.0/30".into()];
        let err = controller.update_config(changed).await.unwrap_err();
        assert!(matches!(err, ControllerError::Probe(ProbeError::Privilege)));

        match timeout(WAIT, rx.recv()).await.unwrap() {
            Some(Event::Error(message)) => assert!(message.contains("home"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(controller.config().await, Some(config("home", true)));
        assert_eq!(controller.state().await, OrchestratorState::Idle);
        assert_eq!(*factory.built.lock().unwrap(), vec!["home"]);
        controller.stop().await;
    }
}
