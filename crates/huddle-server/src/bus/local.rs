//! In-process bus over a tokio broadcast channel.

use bytes::Bytes;
use tokio::{sync::broadcast, task::JoinHandle};

use super::MessageBus;

/// One published message as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Channel the message was published on
    pub channel: String,
    /// Published bytes
    pub payload: Bytes,
}

/// In-process [`MessageBus`] backed by [`tokio::sync::broadcast`].
///
/// Subscribers that fall more than `capacity` messages behind lose the
/// oldest ones (they observe `RecvError::Lagged`). Publishing with no
/// subscriber attached drops the message.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    /// Create a bus that buffers up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach a new subscriber. It sees messages published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Spawn a subscriber that logs every published message at `info`.
    ///
    /// The task ends once every clone of the bus has been dropped.
    pub fn spawn_audit_log(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        tracing::info!(
                            channel = %message.channel,
                            payload = %String::from_utf8_lossy(&message.payload),
                            "message published"
                        );
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "audit log fell behind");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, channel: &str, payload: Bytes) {
        let message = BusMessage { channel: channel.to_string(), payload };

        if let Err(e) = self.sender.send(message) {
            tracing::debug!(channel, bytes = e.0.payload.len(), "bus publish had no subscribers");
        }
    }
}
