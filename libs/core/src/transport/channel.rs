use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::message::Message;
use crate::state::{ConnectionStatus, SessionStatus, TypingState};
use crate::transport::error::TransportError;
use crate::transport::latency::{Operation, SharedLatency};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Typing,
    Connection,
    Status,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    Message(Message),
    Typing(TypingState),
    Connection(ConnectionStatus),
    Status(SessionStatus),
}

impl PushEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PushEvent::Message(_) => EventKind::Message,
            PushEvent::Typing(_) => EventKind::Typing,
            PushEvent::Connection(_) => EventKind::Connection,
            PushEvent::Status(_) => EventKind::Status,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Resolves once the channel reports `Connected`.
    async fn connect(&self) -> Result<(), TransportError>;
    /// Tears the connection down and fires a `Disconnected` event.
    fn disconnect(&self);
    fn status(&self) -> ConnectionStatus;
    fn on(&self, kind: EventKind, handler: EventHandler) -> Subscription;
}

pub type SharedRealtimeChannel = Arc<dyn RealtimeChannel>;

/// Handler table keyed by event kind. A handler registered twice for the same
/// kind is stored once.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<EventKind, Vec<(u64, EventHandler)>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<(u64, EventHandler)>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(self: &Arc<Self>, kind: EventKind, handler: EventHandler) -> Subscription {
        let mut handlers = self.lock();
        let entries = handlers.entry(kind).or_default();
        let existing = entries
            .iter()
            .find(|(_, h)| Arc::ptr_eq(h, &handler))
            .map(|(id, _)| *id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                entries.push((id, handler));
                id
            }
        };
        Subscription {
            registry: Arc::downgrade(self),
            kind,
            id,
        }
    }

    fn remove(&self, kind: EventKind, id: u64) {
        if let Some(entries) = self.lock().get_mut(&kind) {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Invokes every handler for the event's kind. Handlers run on a copy of
    /// the table, so they may unsubscribe (or subscribe) while dispatching.
    pub fn dispatch(&self, event: &PushEvent) {
        let handlers: Vec<EventHandler> = self
            .lock()
            .get(&event.kind())
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(event);
        }
    }
}

/// Handle returned by [`RealtimeChannel::on`].
#[derive(Clone, Debug)]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Removes the handler. Safe to call more than once, and from inside the
    /// handler itself.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

/// In-process stand-in for a server push connection.
pub struct SimulatedChannel {
    registry: Arc<HandlerRegistry>,
    status: Mutex<ConnectionStatus>,
    latency: SharedLatency,
}

impl SimulatedChannel {
    pub fn new(latency: SharedLatency) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            status: Mutex::new(ConnectionStatus::Disconnected),
            latency,
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self.registry.dispatch(&PushEvent::Connection(status));
    }

    /// Delivers a server-side event to subscribers. Events emitted while
    /// disconnected are dropped, as a closed socket would.
    pub fn emit(&self, event: PushEvent) {
        if self.status() != ConnectionStatus::Connected {
            debug!(
                target: "chat.channel",
                kind = ?event.kind(),
                "dropping push event while disconnected"
            );
            return;
        }
        self.registry.dispatch(&event);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry.handler_count(kind)
    }
}

#[async_trait]
impl RealtimeChannel for SimulatedChannel {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.status() == ConnectionStatus::Connected {
            return Ok(());
        }
        self.set_status(ConnectionStatus::Connecting);
        tokio::time::sleep(self.latency.delay(Operation::Connect)).await;
        self.set_status(ConnectionStatus::Connected);
        info!(target: "chat.channel", "push channel connected");
        Ok(())
    }

    fn disconnect(&self) {
        self.set_status(ConnectionStatus::Disconnected);
        info!(target: "chat.channel", "push channel disconnected");
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on(&self, kind: EventKind, handler: EventHandler) -> Subscription {
        self.registry.register(kind, handler)
    }
}
