//! Message bus: fire-and-forget publication of outbound chat text.
//!
//! Every broadcast, system notice, and group message is published once to a
//! named channel before it is fanned out to connections. Nothing in the chat
//! path ever reads the bus back; subscribers are audit or replication sinks.

mod local;
mod memory;

use bytes::Bytes;
pub use local::{BusMessage, LocalBus};
pub use memory::MemoryBus;

/// Publish side of the message bus.
///
/// Must be Clone (shared by the messaging engine and group coordinator),
/// Send + Sync, and non-blocking. Publishing never fails from the caller's
/// point of view: implementations log their own failures.
pub trait MessageBus: Clone + Send + Sync + 'static {
    /// Publish `payload` on `channel`.
    fn publish(&self, channel: &str, payload: Bytes);
}
