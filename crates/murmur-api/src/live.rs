use tokio::sync::broadcast;

use murmur_types::events::LiveEvent;

/// In-process publish/subscribe hub for live staff events.
///
/// Only reaches subscribers connected to this process; each instance of a
/// horizontally scaled deployment has its own broker.
#[derive(Clone)]
pub struct Broker {
    tx: broadcast::Sender<LiveEvent>,
}

impl Broker {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    /// Send to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: LiveEvent) -> usize {
        // Err only means nobody is listening right now.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(256)
    }
}
