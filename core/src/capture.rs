//! Layer 2 capture handle for the raw prober.

use std::time::Duration;

use anyhow::{Context, bail};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use tracing::debug;

/// Upper bound on a blocking read, so the reader thread can notice a stop request.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct EthernetHandle {
    pub tx: Box<dyn DataLinkSender>,
    pub rx: Box<dyn DataLinkReceiver>,
}

/// Opens a live Ethernet channel on `intf`.
pub fn start_capture(intf: &NetworkInterface) -> anyhow::Result<EthernetHandle> {
    open_eth_channel(intf, &capture_config(), datalink::channel)
}

pub fn open_eth_channel<F>(intf: &NetworkInterface, cfg: &Config, channel_opener: F) -> anyhow::Result<EthernetHandle>
where
    F: FnOnce(&NetworkInterface, Config) -> std::io::Result<Channel>,
{
    let ch = channel_opener(intf, *cfg).with_context(|| format!("opening on {}", intf.name))?;
    match ch {
        Channel::Ethernet(tx, rx) => {
            debug!(interface = %intf.name, "capture handle open");
            Ok(EthernetHandle { tx, rx })
        }
        _ => bail!("non-ethernet channel for {}", intf.name),
    }
}

fn capture_config() -> Config {
    Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
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
