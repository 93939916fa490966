use std::fmt;

use crate::Core::alloc::AlignedBuffer;
use crate::Core::slot::SlotClaim;
use crate::RingBuffer::{FixedRingBuffer, VsClaim, VsRingBuffer};
use crate::Stream::FsStream;

/// Debug function for VsRingBuffer
///
/// Shows the descriptor and a snapshot of the live positions.
pub fn debug_vs_ring_buffer(rb: &VsRingBuffer<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("VsRingBuffer")
        .field("capacity", &rb.capacity)
        .field("max_msg_length", &rb.max_msg_length)
        .field("producer_position", &rb.load_producer_position())
        .field("consumer_position", &rb.load_consumer_position())
        .finish_non_exhaustive()
}

/// Debug function for FixedRingBuffer
pub fn debug_fixed_ring_buffer(rb: &FixedRingBuffer<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FixedRingBuffer")
        .field("capacity", &rb.capacity)
        .field("message_size", &rb.message_size)
        .field("aligned_message_size", &rb.slots.aligned_message_size)
        .field("producer_position", &rb.load_producer_position())
        .field("consumer_position", &rb.load_consumer_position())
        .finish_non_exhaustive()
}

/// Debug function for FsStream
///
/// The producer position is the clamped one, so it never runs past the
/// active cycle.
pub fn debug_fs_stream(stream: &FsStream<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FsStream")
        .field("cycle_length", &stream.cycle_length)
        .field("cycles", &stream.cycles)
        .field("max_gain", &stream.max_gain)
        .field("aligned_message_size", &stream.slots.aligned_message_size)
        .field("active_cycle_index", &stream.active_cycle_index())
        .field("producer_position", &stream.load_producer_position())
        .field("consumer_position", &stream.load_consumer_position())
        .finish_non_exhaustive()
}

impl fmt::Debug for VsRingBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_vs_ring_buffer(self, f)
    }
}

impl fmt::Debug for FixedRingBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_fixed_ring_buffer(self, f)
    }
}

impl fmt::Debug for FsStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_fs_stream(self, f)
    }
}

impl fmt::Debug for VsClaim<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VsClaim")
            .field("position", &self.position())
            .field("index", &self.index())
            .field("content_len", &self.content_len())
            .finish()
    }
}

impl fmt::Debug for SlotClaim<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotClaim")
            .field("position", &self.position())
            .field("payload_offset", &self.payload_offset())
            .finish()
    }
}

impl fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
