// FREE/BUSY slot protocol shared by the fixed-size ring buffer and the stream.
//
// A slot is a 4-byte atomic state word followed by the fixed-size payload.
// Producers move a slot FREE -> BUSY (commit); the single consumer moves it
// BUSY -> FREE and then advances the consumer position.

use super::bytes::align;
use super::region::Region;
use std::sync::atomic::{fence, AtomicU64, Ordering};

pub const MESSAGE_STATE_SIZE: usize = 4;
pub const MESSAGE_STATE_FREE: u32 = 0;
pub const MESSAGE_STATE_BUSY: u32 = 1;

/// Slot stride for a payload of `message_size` bytes: state word + payload, 4-byte aligned.
#[inline]
pub const fn aligned_message_size(message_size: usize) -> usize {
    align(message_size + MESSAGE_STATE_SIZE, MESSAGE_STATE_SIZE)
}

/// A claimed, not yet published slot.
///
/// The payload is exclusively owned until [`SlotClaim::commit`]. Dropping a
/// claim without committing it stalls the consumer at this slot.
#[must_use = "an uncommitted claim blocks the consumer"]
pub struct SlotClaim<'a> {
    region: Region<'a>,
    state_offset: usize,
    payload_len: usize,
    position: u64,
}

impl<'a> SlotClaim<'a> {
    pub(crate) fn new(region: Region<'a>, state_offset: usize, payload_len: usize, position: u64) -> Self {
        Self {
            region,
            state_offset,
            payload_len,
            position,
        }
    }

    /// Absolute sequence of the claimed slot.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Byte offset of the payload within the buffer.
    #[inline]
    pub fn payload_offset(&self) -> usize {
        self.state_offset + MESSAGE_STATE_SIZE
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // SAFETY: the claim protocol grants this producer the slot until commit.
        unsafe { self.region.slice_mut(self.payload_offset(), self.payload_len) }
    }

    /// Publishes the slot: release-stores BUSY into its state word.
    #[inline]
    pub fn commit(self) {
        self.region
            .atomic_u32(self.state_offset)
            .store(MESSAGE_STATE_BUSY, Ordering::Release);
    }
}

/// A published slot handed to the consumer by a pull-style read.
///
/// Dropping it without [`ReadSlot::commit`] leaves the slot readable.
pub struct ReadSlot<'a> {
    region: Region<'a>,
    consumer_position: &'a AtomicU64,
    state_offset: usize,
    payload_len: usize,
    position: u64,
}

impl<'a> ReadSlot<'a> {
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        // SAFETY: BUSY slots belong to the single consumer until freed.
        unsafe { self.region.slice(self.state_offset + MESSAGE_STATE_SIZE, self.payload_len) }
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above.
        unsafe {
            self.region
                .slice_mut(self.state_offset + MESSAGE_STATE_SIZE, self.payload_len)
        }
    }

    /// Frees the slot and advances the consumer past it.
    #[inline]
    pub fn commit(self) {
        self.region
            .atomic_u32(self.state_offset)
            .store(MESSAGE_STATE_FREE, Ordering::Release);
        self.consumer_position
            .store(self.position + 1, Ordering::Release);
    }
}

/// Geometry of a slot array inside a region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotArray<'a> {
    pub(crate) region: Region<'a>,
    pub(crate) mask: u64,
    pub(crate) aligned_message_size: usize,
}

impl<'a> SlotArray<'a> {
    #[inline]
    pub(crate) fn state_offset(&self, position: u64) -> usize {
        (position & self.mask) as usize * self.aligned_message_size
    }

    #[inline]
    pub(crate) fn payload_len(&self) -> usize {
        self.aligned_message_size - MESSAGE_STATE_SIZE
    }

    #[inline]
    pub(crate) fn claim(&self, position: u64) -> SlotClaim<'a> {
        SlotClaim::new(self.region, self.state_offset(position), self.payload_len(), position)
    }

    /// Pull-style read of the slot at the consumer position.
    ///
    /// # Safety
    /// Single consumer only.
    pub(crate) unsafe fn try_read(&self, consumer_position: &'a AtomicU64) -> Option<ReadSlot<'a>> {
        let position = consumer_position.load(Ordering::Relaxed);
        let state_offset = self.state_offset(position);
        let state = self.region.atomic_u32(state_offset).load(Ordering::Relaxed);
        if state == MESSAGE_STATE_FREE {
            return None;
        }
        debug_assert_eq!(state, MESSAGE_STATE_BUSY, "corrupted slot state at {position}");
        fence(Ordering::Acquire);
        Some(ReadSlot {
            region: self.region,
            consumer_position,
            state_offset,
            payload_len: self.payload_len(),
            position,
        })
    }

    /// Hands up to `count` published slots to `consumer`, freeing each and
    /// release-storing the consumer position after every message.
    ///
    /// `free_ordering` is the ordering of the FREE store: producers that probe
    /// slot states need `Release`, producers that only watch the consumer
    /// position can use `Relaxed`.
    ///
    /// # Safety
    /// Single consumer only.
    pub(crate) unsafe fn drain<F>(
        &self,
        consumer_position: &AtomicU64,
        free_ordering: Ordering,
        mut consumer: F,
        count: usize,
    ) -> usize
    where
        F: FnMut(&mut [u8]) -> bool,
    {
        let start = consumer_position.load(Ordering::Relaxed);
        let payload_len = self.payload_len();
        let mut msg_read = 0;
        while msg_read < count {
            let message_position = start + msg_read as u64;
            let state_offset = self.state_offset(message_position);
            let state = self.region.atomic_u32(state_offset);
            let state_value = state.load(Ordering::Relaxed);
            if state_value == MESSAGE_STATE_FREE {
                return msg_read;
            }
            debug_assert_eq!(state_value, MESSAGE_STATE_BUSY, "corrupted slot state at {message_position}");
            fence(Ordering::Acquire);
            let payload = self
                .region
                .slice_mut(state_offset + MESSAGE_STATE_SIZE, payload_len);
            let stop = !consumer(payload);
            state.store(MESSAGE_STATE_FREE, free_ordering);
            consumer_position.store(message_position + 1, Ordering::Release);
            msg_read += 1;
            if stop {
                return msg_read;
            }
        }
        count
    }
}
