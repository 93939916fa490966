use super::{Consumer, MappedRing, Producer};
use crate::Core::{attach_shared_memory, create_shared_memory};
use crate::RingBuffer::VsRingBuffer;
use tracing::info;

pub struct ChannelBuilder {
    capacity: usize,
    name: String,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024, // 1MB data region
            name: "franz_flow".to_string(),
        }
    }
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data region size in bytes, rounded up to a power of two.
    ///
    /// When attaching, this is only a lower bound on the existing region.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Name of the region under `/dev/shm`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn buffer_len(&self) -> usize {
        VsRingBuffer::required_buffer_len(self.capacity)
    }

    /// Creates (or resets) the named region and returns its first producer.
    pub fn build_producer(self) -> std::io::Result<Producer> {
        let shm = create_shared_memory(self.buffer_len(), &self.name)?;
        let mapped = MappedRing::new(shm)?;
        info!(name = %self.name, capacity = mapped.ring.capacity(), "channel created");
        Ok(Producer::new(mapped, self.name))
    }

    /// Attaches another producer to an existing region.
    pub fn attach_producer(self) -> std::io::Result<Producer> {
        let shm = attach_shared_memory(&self.name, self.buffer_len())?;
        Ok(Producer::new(MappedRing::new(shm)?, self.name))
    }

    /// Attaches the consumer to an existing region.
    ///
    /// # Safety
    /// At most one consumer may exist per region, across all processes.
    pub unsafe fn build_consumer(self) -> std::io::Result<Consumer> {
        let shm = attach_shared_memory(&self.name, self.buffer_len())?;
        Ok(Consumer::new(MappedRing::new(shm)?, self.name))
    }
}
