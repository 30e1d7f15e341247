//! Provider lifecycle events.

use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers lag rather than block the provider.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Kinds of event a provider may emit.
///
/// This provider only emits `Ready` and `Error`; the others exist so hosts can
/// match on the full OpenFeature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEventKind {
    Ready,
    Error,
    Stale,
    ConfigurationChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub kind: ProviderEventKind,
    pub message: Option<String>,
}

impl ProviderEvent {
    pub fn ready() -> Self {
        Self {
            kind: ProviderEventKind::Ready,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderEventKind::Error,
            message: Some(message.into()),
        }
    }
}

/// Fan-out of provider events to any number of subscribers.
#[derive(Debug)]
pub struct EventEmitter {
    sender: broadcast::Sender<ProviderEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ProviderEvent) {
        tracing::debug!(kind = ?event.kind, message = ?event.message, "Emitting provider event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
