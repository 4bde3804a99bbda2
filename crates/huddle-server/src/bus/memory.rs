#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::MessageBus;

/// Recording bus for tests.
///
/// Keeps every publish in order. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    published: Arc<Mutex<Vec<(String, Bytes)>>>,
}

impl MemoryBus {
    /// Create an empty recording bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every (channel, payload) published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().expect("Mutex poisoned").clone()
    }

    /// Payloads published on one channel, decoded as UTF-8.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn payloads_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .expect("Mutex poisoned")
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }
}

impl MessageBus for MemoryBus {
    #[allow(clippy::expect_used)]
    fn publish(&self, channel: &str, payload: Bytes) {
        self.published.lock().expect("Mutex poisoned").push((channel.to_string(), payload));
    }
}
