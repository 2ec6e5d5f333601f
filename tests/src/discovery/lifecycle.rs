use std::sync::Arc;
use std::time::Duration;

use lanwatch_common::models::{DiscoveryResult, Port, PortStatus, SSH_PORT, SshStatus, Status, UNKNOWN};
use lanwatch_core::controller::Controller;
use lanwatch_core::event::{Event, EventType};
use lanwatch_core::storage::{MemoryConfigRepo, MemoryDeviceRepo};
use tokio::sync::mpsc;
use tracing::Span;

use super::fakes::{CountingDetails, FixedProbes, ScriptedScans, config, ip, next_event};

fn server(last: u8, port: PortStatus) -> DiscoveryResult {
    DiscoveryResult::new(ip(last), Status::Online).with_port(Port::new(SSH_PORT, port))
}

fn controller(batches: Vec<Vec<DiscoveryResult>>) -> (Controller, Arc<CountingDetails>) {
    let details = Arc::new(CountingDetails::default());
    let probes = FixedProbes {
        network: Arc::new(ScriptedScans::new(batches)),
        details: details.clone(),
    };
    let controller = Controller::new(
        Arc::new(MemoryConfigRepo::with_config(config(Duration::from_millis(50)))),
        Arc::new(MemoryDeviceRepo::new()),
        Arc::new(probes),
        Span::none(),
    );
    (controller, details)
}

#[tokio::test]
async fn server_goes_online_then_offline() {
    let (controller, details) = controller(vec![
        vec![server(7, PortStatus::Open)],
        vec![DiscoveryResult::new(ip(7), Status::Offline)],
    ]);
    let (tx, mut rx) = mpsc::channel(16);
    controller.register_listener(EventType::ServerUpdate, tx);
    controller.start().await.unwrap();

    let Event::ServerUpdate(online) = next_event(&mut rx).await else { panic!("expected update") };
    assert_eq!(online.status, Status::Online);
    assert_eq!(online.ssh_status, SshStatus::Enabled);
    assert_eq!(online.hostname, "web01");

    let Event::ServerUpdate(offline) = next_event(&mut rx).await else { panic!("expected update") };
    assert_eq!(offline.id, online.id);
    assert_eq!(offline.status, Status::Offline);
    assert_eq!(offline.ssh_status, SshStatus::Disabled);
    assert_eq!(offline.hostname, "web01");

    assert_eq!(*details.calls.lock().unwrap(), vec![ip(7)]);
    assert_eq!(controller.registry().all().unwrap().len(), 1);
    controller.stop().await;
}

#[tokio::test]
async fn ssh_disabled_server_is_stored_without_enrichment() {
    let (controller, details) = controller(vec![vec![server(8, PortStatus::Closed)]]);
    let (tx, mut rx) = mpsc::channel(16);
    controller.register_listener(EventType::ServerUpdate, tx);
    controller.start().await.unwrap();

    let Event::ServerUpdate(device) = next_event(&mut rx).await else { panic!("expected update") };
    assert_eq!(device.ip, ip(8));
    assert_eq!(device.hostname, UNKNOWN);
    assert_eq!(device.os, UNKNOWN);
    assert_eq!(device.status, Status::Online);
    assert_eq!(device.ssh_status, SshStatus::Disabled);
    assert!(details.calls.lock().unwrap().is_empty());
    controller.stop().await;
}

#[tokio::test]
async fn unclassified_and_untracked_hosts_leave_no_record() {
    let (controller, details) = controller(vec![vec![
        DiscoveryResult::new(ip(3), Status::Online),
        DiscoveryResult::new(ip(4), Status::Offline),
        DiscoveryResult::new(ip(5), Status::Unknown),
        server(6, PortStatus::Closed),
    ]]);
    let (tx, mut rx) = mpsc::channel(16);
    controller.register_listener(EventType::ServerUpdate, tx);
    controller.start().await.unwrap();

    let Event::ServerUpdate(device) = next_event(&mut rx).await else { panic!("expected update") };
    assert_eq!(device.ip, ip(6));
    let stored = controller.registry().all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].ip, ip(6));
    assert!(details.calls.lock().unwrap().is_empty());
    controller.stop().await;
}

#[tokio::test]
async fn listeners_are_released_on_stop() -> anyhow::Result<()> {
    let (controller, _) = controller(vec![]);
    let (tx, mut rx) = mpsc::channel(4);
    let id = controller.register_listener(EventType::FatalError, tx);
    controller.start().await?;

    controller.stop().await;
    assert_eq!(controller.bus().listener_count(), 0);
    assert!(rx.recv().await.is_none());
    assert_eq!(controller.remove_listener(id), id);
    Ok(())
}
