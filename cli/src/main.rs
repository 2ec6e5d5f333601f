mod args;
mod terminal;

use std::sync::Arc;

use anyhow::{Context, bail};
use args::CommandLine;
use lanwatch_core::controller::{Controller, SystemProbes};
use lanwatch_core::event::{DEFAULT_LISTENER_CAPACITY, Event, EventType};
use lanwatch_core::storage::{MemoryConfigRepo, MemoryDeviceRepo};
use terminal::{logging, print};
use tokio::sync::mpsc;
use tracing::{error, info, info_span};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();
    logging::init();

    let config = commands.into_config();
    config.parsed_targets().context("checking targets")?;
    print::header("lanwatch");

    let controller = Controller::new(
        Arc::new(MemoryConfigRepo::with_config(config)),
        Arc::new(MemoryDeviceRepo::new()),
        Arc::new(SystemProbes::default()),
        info_span!("lanwatch"),
    );

    let (tx, mut rx) = mpsc::channel(DEFAULT_LISTENER_CAPACITY);
    controller.register_listener(EventType::ServerUpdate, tx.clone());
    controller.register_listener(EventType::FatalError, tx);
    controller.start().await.context("starting controller")?;

    let fatal = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Event::ServerUpdate(device)) => print::device(&device),
                Some(Event::FatalError(message)) => break Some(message),
                Some(_) => {}
                None => break None,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                info!("interrupted, shutting down");
                break None;
            }
        }
    };

    controller.stop().await;
    if let Some(message) = fatal {
        error!(error = %message, "scanning stopped");
        bail!("fatal: {message}");
    }
    Ok(())
}
