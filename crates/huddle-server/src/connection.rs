//! Connection handles and the per-connection outbound queue.
//!
//! Every live connection owns a bounded queue drained by its writer task.
//! Anything addressed to the connection (own replies, private messages,
//! broadcast fan-out) goes through [`ConnectionHandle::deliver`], which never
//! waits: a peer that stops reading can only fill its own queue.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

/// Opaque identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A line could not be queued for a connection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The connection's outbound queue is at capacity
    #[error("outbound queue full")]
    QueueFull,

    /// The connection's writer has gone away
    #[error("connection closed")]
    Closed,
}

/// Cloneable sending side of a connection.
///
/// Held by the session registry for routing and by the connection's own
/// session for replies. Dropping every handle lets the writer task finish.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// Create a handle with a queue of `capacity` lines.
    ///
    /// Returns the receiver the writer task drains.
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (Self { id, outbound }, rx)
    }

    /// Connection this handle addresses.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue `line` plus a trailing newline without waiting.
    ///
    /// # Errors
    ///
    /// - `QueueFull` if the writer is behind by the full queue capacity
    /// - `Closed` if the writer task has exited
    pub fn deliver(&self, line: &str) -> Result<(), DeliveryFailure> {
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');

        self.outbound.try_send(framed).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
