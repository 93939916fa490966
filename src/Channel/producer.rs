use super::MappedRing;
use crate::Core::record::MsgTypeId;
use crossbeam_utils::Backoff;
use std::time::{Duration, Instant};

/// Sends copies of messages into a shared-memory channel.
///
/// Claims are multi-producer safe, so a producer can be shared between
/// threads and any number of producers can attach to the same channel.
pub struct Producer {
    mapped: MappedRing,
    name: String,
}

impl Producer {
    pub(crate) fn new(mapped: MappedRing, name: String) -> Self {
        Self { mapped, name }
    }

    /// Sends a message through the channel.
    ///
    /// # Returns
    /// * `Ok(())` once the message is visible to the consumer
    /// * `Err(WouldBlock)` if the channel has no room right now
    /// * `Err(InvalidInput)` if the message is too large or the type id is not positive
    pub fn send<T: AsRef<[u8]>>(&self, msg_type_id: i32, message: T) -> std::io::Result<()> {
        let message = message.as_ref();
        let msg_type_id = MsgTypeId::new(msg_type_id)?;
        let ring = &self.mapped.ring;
        if message.len() > ring.max_msg_length() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Message too large ({} > {})",
                    message.len(),
                    ring.max_msg_length()
                ),
            ));
        }

        match ring.try_mp_claim(message.len()) {
            Some(mut claim) => {
                claim.content_mut().copy_from_slice(message);
                claim.commit(msg_type_id);
                Ok(())
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "Failed to claim space - channel full",
            )),
        }
    }

    /// Sends a message, spinning while the channel is full for up to `timeout`.
    pub fn send_timeout<T: AsRef<[u8]>>(
        &self,
        msg_type_id: i32,
        message: T,
        timeout: Duration,
    ) -> std::io::Result<()> {
        let message = message.as_ref();
        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            match self.send(msg_type_id, message) {
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "channel stayed full until the timeout",
                        ));
                    }
                    backoff.snooze();
                }
                other => return other,
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum message size that can be sent
    pub fn max_message_size(&self) -> usize {
        self.mapped.ring.max_msg_length()
    }

    /// Bytes claimed and not yet consumed.
    pub fn pending(&self) -> usize {
        self.mapped.ring.size()
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.name)
            .field("ring", &self.mapped.ring)
            .field("shm", &self.mapped.shm)
            .finish()
    }
}
