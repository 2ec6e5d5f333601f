use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lanwatch_common::config::ScanConfig;
use lanwatch_common::models::{Details, DiscoveryResult};
use lanwatch_core::cancel::CancelToken;
use lanwatch_core::controller::ProbeFactory;
use lanwatch_core::detail::{DetailError, DetailProbe};
use lanwatch_core::event::{Event, EventBus};
use lanwatch_core::probe::{NetworkProbe, ProbeError};
use lanwatch_core::process::{CommandOutput, CommandRunner, CommandSpec};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(3);

pub fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

pub fn config(probe_interval: Duration) -> ScanConfig {
    ScanConfig {
        id: "lab".into(),
        name: "lab".into(),
        targets: vec!["10.0.0.0/29".into()],
        ssh_user: "admin".into(),
        ssh_identity: "/keys/lab".into(),
        scan_interval: probe_interval,
        active: true,
        ..Default::default()
    }
}

pub async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    match timeout(WAIT, rx.recv()).await {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed"),
        Err(_) => panic!("no event within {WAIT:?}"),
    }
}

/// Answers commands by program name and records every invocation.
#[derive(Default)]
pub struct FakeHosts {
    answers: Vec<(String, String, CommandOutput)>,
    pub seen: Mutex<Vec<CommandSpec>>,
}

impl FakeHosts {
    /// `program` answers with `stdout` when its last argument contains `needle`.
    pub fn answer(mut self, program: &str, needle: &str, stdout: &str) -> Self {
        self.answers.push((
            program.into(),
            needle.into(),
            CommandOutput {
                success: true,
                code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn fail(mut self, program: &str, stderr: &str) -> Self {
        self.answers.push((
            program.into(),
            String::new(),
            CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.into(),
            },
        ));
        self
    }

    pub fn invocations(&self, program: &str) -> Vec<CommandSpec> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.program == program)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeHosts {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        self.seen.lock().unwrap().push(spec.clone());
        let last = spec.args.last().cloned().unwrap_or_default();
        let answer = self
            .answers
            .iter()
            .find(|(program, needle, _)| *program == spec.program && last.contains(needle.as_str()));
        match answer {
            Some((_, _, output)) => Ok(output.clone()),
            None => Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        }
    }
}

/// Hands out one scripted batch per scan, then empty scans.
pub struct ScriptedScans {
    batches: Mutex<VecDeque<Vec<DiscoveryResult>>>,
}

impl ScriptedScans {
    pub fn new(batches: Vec<Vec<DiscoveryResult>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }
}

#[async_trait]
impl NetworkProbe for ScriptedScans {
    async fn scan(&self, results: mpsc::Sender<DiscoveryResult>) -> Result<(), ProbeError> {
        let batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        for result in batch {
            results.send(result).await.map_err(|_| ProbeError::Stopped)?;
        }
        Ok(())
    }

    fn stop(&self) {}
}

/// Counts calls and answers with fixed details.
#[derive(Default)]
pub struct CountingDetails {
    pub calls: Mutex<Vec<IpAddr>>,
}

#[async_trait]
impl DetailProbe for CountingDetails {
    async fn server_details(&self, _: &CancelToken, ip: IpAddr) -> Result<Details, DetailError> {
        self.calls.lock().unwrap().push(ip);
        Ok(Details::new("web01", "Debian GNU/Linux 12 (bookworm)"))
    }
}

/// Serves the same probe pair for every configuration.
pub struct FixedProbes {
    pub network: Arc<ScriptedScans>,
    pub details: Arc<CountingDetails>,
}

impl ProbeFactory for FixedProbes {
    fn network_probe(&self, _: &ScanConfig, _: Arc<EventBus>) -> Result<Arc<dyn NetworkProbe>, ProbeError> {
        Ok(self.network.clone())
    }

    fn detail_probe(&self, _: &ScanConfig) -> Arc<dyn DetailProbe> {
        self.details.clone()
    }
}
