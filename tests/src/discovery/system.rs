//! The real probe variants wired through the controller, with every external program faked.

use std::sync::Arc;
use std::time::Duration;

use lanwatch_common::config::{DetailKind, ProbeKind, ScanConfig};
use lanwatch_common::models::{SshStatus, Status, UNKNOWN};
use lanwatch_core::controller::{Controller, SystemProbes};
use lanwatch_core::event::{Event, EventType};
use lanwatch_core::orchestrator::RetryPolicy;
use lanwatch_core::storage::{MemoryConfigRepo, MemoryDeviceRepo};
use tokio::sync::mpsc;
use tracing::Span;

use super::fakes::{FakeHosts, config, ip, next_event};

const NMAP_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap">
<host><status state="up" reason="syn-ack"/>
<address addr="10.0.0.7" addrtype="ipv4"/>
<address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
<ports><port protocol="tcp" portid="22"><state state="open" reason="syn-ack"/></port></ports>
</host>
<host><status state="up" reason="reset"/>
<address addr="10.0.0.8" addrtype="ipv4"/>
<ports><port protocol="tcp" portid="22"><state state="closed" reason="reset"/></port></ports>
</host>
<host><status state="down" reason="no-response"/>
<address addr="10.0.0.9" addrtype="ipv4"/>
</host>
</nmaprun>"#;

const FACTS: &str = r#"{"plays":[{"tasks":[{"hosts":{"10.0.0.7":{
    "ansible_facts":{"ansible_hostname":"web01","ansible_distribution":"Debian"}}}}]}]}"#;

const OS_RELEASE: &str = "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nNAME=\"Debian GNU/Linux\"\nID=debian\n";

fn external(detail: DetailKind) -> ScanConfig {
    ScanConfig {
        probe: ProbeKind::External,
        detail,
        ..config(Duration::from_secs(3600))
    }
}

fn controller(config: ScanConfig, hosts: Arc<FakeHosts>) -> Controller {
    Controller::new(
        Arc::new(MemoryConfigRepo::with_config(config)),
        Arc::new(MemoryDeviceRepo::new()),
        Arc::new(SystemProbes::new(hosts)),
        Span::none(),
    )
    .with_retry(RetryPolicy {
        attempts: 2,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(5),
    })
}

async fn collect_updates(rx: &mut mpsc::Receiver<Event>, count: usize) -> Vec<lanwatch_common::models::Device> {
    let mut devices = Vec::new();
    while devices.len() < count {
        if let Event::ServerUpdate(device) = next_event(rx).await {
            devices.push(device);
        }
    }
    devices.sort_by_key(|device| device.ip);
    devices
}

#[tokio::test]
async fn external_scan_with_facts_fills_the_registry() {
    let hosts = Arc::new(
        FakeHosts::default()
            .answer("nmap", "10.0.0.0/29", NMAP_REPORT)
            .answer("ansible", "/keys/lab", FACTS),
    );
    let controller = controller(external(DetailKind::Facts), hosts.clone());
    let (tx, mut rx) = mpsc::channel(16);
    controller.register_listener(EventType::ServerUpdate, tx);
    controller.start().await.unwrap();

    let devices = collect_updates(&mut rx, 2).await;
    assert_eq!(devices[0].id, "aa:bb:cc:dd:ee:ff");
    assert_eq!(devices[0].hostname, "web01");
    assert_eq!(devices[0].os, "Debian");
    assert_eq!(devices[0].ssh_status, SshStatus::Enabled);

    assert_eq!(devices[1].ip, ip(8));
    assert_eq!(devices[1].hostname, UNKNOWN);
    assert_eq!(devices[1].ssh_status, SshStatus::Disabled);
    assert_eq!(devices[1].status, Status::Online);

    let facts = hosts.invocations("ansible");
    assert_eq!(facts.len(), 1);
    assert!(facts[0].args.contains(&"10.0.0.7,".to_string()));

    let nmap = hosts.invocations("nmap");
    assert_eq!(nmap[0].args[..4], ["-PA22", "-p", "22", "-T5"]);
    controller.stop().await;
}

#[tokio::test]
async fn command_details_read_uname_and_os_release() {
    let hosts = Arc::new(
        FakeHosts::default()
            .answer("nmap", "10.0.0.0/29", NMAP_REPORT)
            .answer("ssh", "uname -a", "Linux web01 6.1.0-18-amd64 #1 SMP Debian x86_64 GNU/Linux\n")
            .answer("ssh", "/etc/os-release", OS_RELEASE),
    );
    let controller = controller(external(DetailKind::Command), hosts.clone());
    let (tx, mut rx) = mpsc::channel(16);
    controller.register_listener(EventType::ServerUpdate, tx);
    controller.start().await.unwrap();

    let devices = collect_updates(&mut rx, 2).await;
    assert_eq!(devices[0].hostname, "web01");
    assert_eq!(devices[0].os, "Debian GNU/Linux 12 (bookworm)");

    let ssh = hosts.invocations("ssh");
    assert_eq!(ssh.len(), 2);
    assert!(ssh.iter().all(|spec| spec.args.contains(&"admin@10.0.0.7".to_string())));
    controller.stop().await;
}

#[tokio::test]
async fn failing_scanner_is_reported_as_fatal() {
    let hosts = Arc::new(FakeHosts::default().fail("nmap", "You requested a scan type which requires root"));
    let controller = controller(external(DetailKind::Facts), hosts.clone());
    let (tx, mut rx) = mpsc::channel(16);
    controller.register_listener(EventType::FatalError, tx);
    controller.start().await.unwrap();

    match next_event(&mut rx).await {
        Event::FatalError(message) => assert!(message.contains("requires root")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(hosts.invocations("nmap").len(), 2);
    assert!(controller.registry().all().unwrap().is_empty());
    controller.stop().await;
}
