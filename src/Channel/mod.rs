mod builder;
mod consumer;
mod producer;

pub use builder::ChannelBuilder;
pub use consumer::Consumer;
pub use producer::Producer;

use crate::Core::region::Region;
use crate::Core::SharedMemoryBackend;
use crate::RingBuffer::VsRingBuffer;
use std::ptr::NonNull;

/// Shared mapping plus the ring laid over it.
///
/// `ring` borrows the mapping owned by `shm`: it is declared first so it is
/// dropped first.
pub(crate) struct MappedRing {
    pub(crate) ring: VsRingBuffer<'static>,
    pub(crate) shm: Box<dyn SharedMemoryBackend>,
}

impl MappedRing {
    pub(crate) fn new(shm: Box<dyn SharedMemoryBackend>) -> std::io::Result<Self> {
        let ptr = NonNull::new(shm.as_ptr()).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "shared memory is not mapped")
        })?;
        // SAFETY: the boxed backend keeps the mapping alive at a stable address
        // for as long as this value, and is dropped after `ring`.
        let region = unsafe { Region::from_raw_parts(ptr, shm.size()) };
        let ring = VsRingBuffer::new(region)?;
        Ok(Self { ring, shm })
    }
}
