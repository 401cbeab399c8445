use log::trace;
use tokio::sync::broadcast;

/// A small wrapper around a Tokio broadcast channel, used as the
/// fire-and-forget sink for rendered payloads.
#[derive(Clone)]
pub struct Context {
    pub tx: broadcast::Sender<String>,
}

impl Context {
    /// Create a new Context with a channel of the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Hand `payload` to every current subscriber. Never blocks.
    pub fn publish(&self, payload: String) {
        if self.tx.send(payload).is_err() {
            trace!("no subscribers for published payload");
        }
    }
}
