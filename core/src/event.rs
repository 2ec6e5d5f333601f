//! Typed publish-subscribe fabric.
//!
//! Listeners register a bounded [`mpsc::Sender`] for one [`EventType`] and receive a clone of
//! every matching event, in registration order. Publishing never awaits: a full listener
//! loses the new event and has its dropped counter bumped, a closed listener is pruned.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lanwatch_common::models::{Device, DiscoveryResult};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use crate::lock;

/// Capacity callers are expected to give listener channels unless they know better.
pub const DEFAULT_LISTENER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ServerUpdate,
    FatalError,
    Error,
    ArpUpdate,
    SynUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// A tracked device was inserted or changed.
    ServerUpdate(Device),
    /// The engine cannot continue.
    FatalError(String),
    /// A recoverable failure worth surfacing.
    Error(String),
    /// The raw prober learned a MAC for a target.
    ArpUpdate(DiscoveryResult),
    /// The raw prober got an answer to its SYN.
    SynUpdate(DiscoveryResult),
}

impl Event {
    pub fn kind(&self) -> EventType {
        match self {
            Event::ServerUpdate(_) => EventType::ServerUpdate,
            Event::FatalError(_) => EventType::FatalError,
            Event::Error(_) => EventType::Error,
            Event::ArpUpdate(_) => EventType::ArpUpdate,
            Event::SynUpdate(_) => EventType::SynUpdate,
        }
    }
}

struct Listener<K> {
    id: u64,
    key: K,
    tx: mpsc::Sender<Event>,
    dropped: u64,
}

/// Listener list shared by [`EventBus`] and the device registry.
///
/// IDs come from a per-instance counter, start at 1 and only grow.
pub(crate) struct Fanout<K> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener<K>>>,
}

impl<K: PartialEq> Fanout<K> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, key: K, tx: mpsc::Sender<Event>) -> u64 {
        let mut listeners = lock(&self.listeners);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        listeners.push(Listener {
            id,
            key,
            tx,
            dropped: 0,
        });
        id
    }

    /// Removing the entry drops its sender, which closes the receiver's channel. Unknown ids are ignored.
    pub(crate) fn remove(&self, id: u64) -> u64 {
        let mut listeners = lock(&self.listeners);
        if let Some(index) = listeners.iter().position(|listener| listener.id == id) {
            listeners.remove(index);
        }
        id
    }

    pub(crate) fn publish(&self, key: &K, event: &Event) {
        let mut listeners = lock(&self.listeners);
        listeners.retain_mut(|listener| {
            if listener.key != *key {
                return true;
            }
            match listener.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    listener.dropped += 1;
                    warn!(listener = listener.id, dropped = listener.dropped, "listener full, event dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(listener = listener.id, "listener closed, pruning");
                    false
                }
            }
        });
    }

    pub(crate) fn dropped(&self, id: u64) -> Option<u64> {
        lock(&self.listeners)
            .iter()
            .find(|listener| listener.id == id)
            .map(|listener| listener.dropped)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }
}

pub struct EventBus {
    fanout: Fanout<EventType>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { fanout: Fanout::new() }
    }

    pub fn register_listener(&self, kind: EventType, tx: mpsc::Sender<Event>) -> u64 {
        self.fanout.register(kind, tx)
    }

    /// Idempotent; returns `id` either way.
    pub fn remove_listener(&self, id: u64) -> u64 {
        self.fanout.remove(id)
    }

    pub fn send(&self, event: Event) {
        self.fanout.publish(&event.kind(), &event);
    }

    pub fn send_fatal(&self, error: impl ToString) {
        self.send(Event::FatalError(error.to_string()));
    }

    pub fn send_error(&self, error: impl ToString) {
        self.send(Event::Error(error.to_string()));
    }

    /// Events lost to a full channel so far, `None` once the listener is gone.
    pub fn dropped(&self, id: u64) -> Option<u64> {
        self.fanout.dropped(id)
    }

    pub fn listener_count(&self) -> usize {
        self.fanout.len()
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
