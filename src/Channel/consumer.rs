use super::MappedRing;
use crossbeam_utils::Backoff;
use std::time::{Duration, Instant};

/// Receives messages from a shared-memory channel.
///
/// There is exactly one consumer per channel; every receive takes `&mut self`.
pub struct Consumer {
    mapped: MappedRing,
    name: String,
}

impl Consumer {
    pub(crate) fn new(mapped: MappedRing, name: String) -> Self {
        Self { mapped, name }
    }

    /// Hands up to `max` messages to `handler` as `(type id, payload)`, in
    /// place. `false` from the handler stops after that message.
    pub fn receive_into<F>(&mut self, handler: F, max: usize) -> usize
    where
        F: FnMut(i32, &[u8]) -> bool,
    {
        // SAFETY: building a `Consumer` requires the single-consumer contract,
        // and `&mut self` keeps reads on this value sequential.
        unsafe { self.mapped.ring.read(handler, max) }
    }

    /// Receives a copy of the next message if one is available.
    pub fn receive(&mut self) -> Option<(i32, Vec<u8>)> {
        let consumer_position = self.mapped.ring.load_consumer_position();
        let received = self.receive_one();
        if received.is_none() && self.mapped.ring.load_consumer_position() != consumer_position {
            // Only the padding before the end of the buffer was consumed.
            return self.receive_one();
        }
        received
    }

    fn receive_one(&mut self) -> Option<(i32, Vec<u8>)> {
        let mut received = None;
        self.receive_into(
            |msg_type_id, payload| {
                received = Some((msg_type_id, payload.to_vec()));
                false
            },
            1,
        );
        received
    }

    /// Receives the next message, spinning for up to `timeout`.
    ///
    /// # Returns
    /// * `Some((type_id, payload))` if a message was received
    /// * `None` if the timeout was reached
    pub fn receive_timeout(&mut self, timeout: Duration) -> Option<(i32, Vec<u8>)> {
        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            if let Some(message) = self.receive() {
                return Some(message);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            backoff.snooze();
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes claimed and not yet consumed.
    pub fn pending(&self) -> usize {
        self.mapped.ring.size()
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("ring", &self.mapped.ring)
            .finish()
    }
}
