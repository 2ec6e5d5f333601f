//! Link-layer prober.
//!
//! `scan` only broadcasts one ARP request per target and returns. A dedicated reader thread,
//! alive for the whole life of the probe, answers every ARP reply from a target with a crafted
//! SYN to port 22 and turns the SYN replies into results. Hosts that never answer ARP produce
//! nothing.
//!
//! Requires **root privileges** to open the capture handle.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use lanwatch_common::config::ScanConfig;
use lanwatch_common::models::{DiscoveryResult, Port, PortStatus, SSH_PORT, Status};
use lanwatch_common::network::interface::{NetworkInterfaceExtension, select_interface};
use lanwatch_protocols::tcp::{PROBE_SRC_PORT, SynProbe};
use lanwatch_protocols::{arp, ethernet, tcp};
use pnet::datalink::{DataLinkReceiver, DataLinkSender};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::util::MacAddr;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::{NetworkProbe, ProbeError};
use crate::capture::{self, EthernetHandle};
use crate::event::{Event, EventBus};
use crate::lock;

type SharedSender = Arc<Mutex<Option<Box<dyn DataLinkSender>>>>;
type SharedSink = Arc<Mutex<Option<mpsc::Sender<DiscoveryResult>>>>;

/// What a captured frame told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Observation {
    /// A target answered ARP; `syn` is the follow-up probe to transmit.
    Arp { result: DiscoveryResult, syn: Vec<u8> },
    /// A target answered our SYN.
    Syn(DiscoveryResult),
}

/// Frame classification state, owned by the reader thread.
pub(crate) struct RawSession {
    src_mac: MacAddr,
    src_addr: Ipv4Addr,
    targets: Vec<Ipv4Addr>,
    target_set: HashSet<Ipv4Addr>,
    macs: HashMap<Ipv4Addr, MacAddr>,
}

impl RawSession {
    pub(crate) fn new(src_mac: MacAddr, src_addr: Ipv4Addr, targets: Vec<Ipv4Addr>) -> Self {
        Self {
            src_mac,
            src_addr,
            target_set: targets.iter().copied().collect(),
            targets,
            macs: HashMap::new(),
        }
    }

    pub(crate) fn arp_requests(&self) -> anyhow::Result<Vec<Vec<u8>>> {
        self.targets
            .iter()
            .map(|&dst_addr| arp::create_request(self.src_mac, self.src_addr, dst_addr))
            .collect()
    }

    pub(crate) fn handle_frame(&mut self, frame: &[u8]) -> anyhow::Result<Option<Observation>> {
        let eth = ethernet::get_packet_from_u8(frame)?;
        match eth.get_ethertype() {
            EtherTypes::Arp => self.on_arp(&eth),
            EtherTypes::Ipv4 => self.on_tcp(&eth),
            _ => Ok(None),
        }
    }

    fn on_arp(&mut self, eth: &EthernetPacket) -> anyhow::Result<Option<Observation>> {
        let Some(reply) = arp::parse_reply(eth)? else {
            return Ok(None);
        };
        if reply.sender_mac == self.src_mac || !self.target_set.contains(&reply.sender_addr) {
            return Ok(None);
        }

        self.macs.insert(reply.sender_addr, reply.sender_mac);
        let syn = tcp::create_syn(&SynProbe {
            src_mac: self.src_mac,
            dst_mac: reply.sender_mac,
            src_addr: self.src_addr,
            dst_addr: reply.sender_addr,
            src_port: PROBE_SRC_PORT,
            dst_port: SSH_PORT,
        })?;
        let result = DiscoveryResult::from_mac(IpAddr::V4(reply.sender_addr), reply.sender_mac, Status::Online);
        Ok(Some(Observation::Arp { result, syn }))
    }

    fn on_tcp(&self, eth: &EthernetPacket) -> anyhow::Result<Option<Observation>> {
        let Some(reply) = tcp::parse_reply(eth)? else {
            return Ok(None);
        };
        if !reply.answers(PROBE_SRC_PORT, SSH_PORT) {
            return Ok(None);
        }

        let status = if reply.is_syn_ack() {
            PortStatus::Open
        } else {
            PortStatus::Closed
        };
        let ip = IpAddr::V4(reply.src_addr);
        let result = match self.macs.get(&reply.src_addr) {
            Some(&mac) => DiscoveryResult::from_mac(ip, mac, Status::Online),
            None => DiscoveryResult::new(ip, Status::Online),
        };
        Ok(Some(Observation::Syn(result.with_port(Port::new(SSH_PORT, status)))))
    }
}

pub struct RawProbe {
    session_frames: Vec<Vec<u8>>,
    tx: SharedSender,
    sink: SharedSink,
    stopped: Arc<AtomicBool>,
}

impl RawProbe {
    /// Binds to the configured interface (or the best LAN interface) and starts the reader.
    pub fn new(config: &ScanConfig, bus: Option<Arc<EventBus>>) -> Result<Self, ProbeError> {
        if !is_root::is_root() {
            return Err(ProbeError::Privilege);
        }
        let interface =
            select_interface(config.interface.as_deref()).map_err(|e| ProbeError::Capture(e.to_string()))?;
        let src_mac = interface
            .mac
            .ok_or_else(|| ProbeError::Capture(format!("{} has no MAC address", interface.name)))?;
        let src_net = interface
            .get_ipv4_net()
            .ok_or_else(|| ProbeError::Capture(format!("{} has no IPv4 address", interface.name)))?;

        let targets: Vec<Ipv4Addr> = config
            .expand_targets()
            .map_err(|e| ProbeError::Parse(e.to_string()))?
            .into_iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();

        let handle = capture::start_capture(&interface).map_err(|e| ProbeError::Capture(format!("{e:#}")))?;
        info!(interface = %interface.name, src = %src_net.ip(), targets = targets.len(), "raw probe bound");
        Self::with_handle(RawSession::new(src_mac, src_net.ip(), targets), handle, bus)
    }

    pub(crate) fn with_handle(
        session: RawSession,
        handle: EthernetHandle,
        bus: Option<Arc<EventBus>>,
    ) -> Result<Self, ProbeError> {
        let session_frames = session
            .arp_requests()
            .map_err(|e| ProbeError::Capture(format!("{e:#}")))?;
        let tx: SharedSender = Arc::new(Mutex::new(Some(handle.tx)));
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));

        let reader = Reader {
            rx: handle.rx,
            session,
            tx: tx.clone(),
            sink: sink.clone(),
            stopped: stopped.clone(),
            bus,
        };
        thread::Builder::new()
            .name("lanwatch-reader".into())
            .spawn(move || reader.run())?;

        Ok(Self {
            session_frames,
            tx,
            sink,
            stopped,
        })
    }

    fn broadcast_arp(&self) -> Result<(), ProbeError> {
        let mut guard = lock(&self.tx);
        let tx = guard.as_mut().ok_or(ProbeError::Stopped)?;
        for frame in &self.session_frames {
            match tx.send_to(frame, None) {
                Some(Ok(())) => {}
                Some(Err(e)) => return Err(ProbeError::Io(e)),
                None => return Err(ProbeError::Capture("send buffer unavailable".into())),
            }
        }
        debug!(requests = self.session_frames.len(), "ARP sweep sent");
        Ok(())
    }
}

#[async_trait]
impl NetworkProbe for RawProbe {
    async fn scan(&self, results: mpsc::Sender<DiscoveryResult>) -> Result<(), ProbeError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ProbeError::Stopped);
        }
        *lock(&self.sink) = Some(results);
        self.broadcast_arp()
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        lock(&self.tx).take();
        lock(&self.sink).take();
        debug!("raw probe stopped");
    }
}

struct Reader {
    rx: Box<dyn DataLinkReceiver>,
    session: RawSession,
    tx: SharedSender,
    sink: SharedSink,
    stopped: Arc<AtomicBool>,
    bus: Option<Arc<EventBus>>,
}

impl Reader {
    fn run(mut self) {
        while !self.stopped.load(Ordering::Acquire) {
            let observation = match self.rx.next() {
                Ok(frame) => self.session.handle_frame(frame),
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    if !self.stopped.load(Ordering::Acquire) {
                        error!(error = %e, "capture read failed, reader exiting");
                    }
                    break;
                }
            };
            match observation {
                Ok(Some(observation)) => self.dispatch(observation),
                Ok(None) => {}
                Err(e) => trace!("skipping frame: {e:#}"),
            }
        }
        trace!("reader thread finished");
    }

    fn dispatch(&self, observation: Observation) {
        match observation {
            Observation::Arp { result, syn } => {
                trace!(ip = %result.ip, mac = %result.id, "ARP reply, sending SYN");
                self.publish(Event::ArpUpdate(result));
                if let Some(tx) = lock(&self.tx).as_mut() {
                    if let Some(Err(e)) = tx.send_to(&syn, None) {
                        warn!(error = %e, "failed to send SYN probe");
                    }
                }
            }
            Observation::Syn(result) => {
                self.publish(Event::SynUpdate(result.clone()));
                let sink = lock(&self.sink).clone();
                if let Some(sink) = sink {
                    if sink.blocking_send(result).is_err() {
                        trace!("result sink closed");
                    }
                }
            }
        }
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.send(event);
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
