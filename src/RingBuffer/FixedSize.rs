// Fixed-size ring buffer: every message occupies one slot of the same size.
//
// Slots carry their own FREE/BUSY state, so the consumer never needs the
// producer position and a single producer can find free room by probing slot
// states ahead of itself instead of reading the consumer position.

use std::sync::atomic::{fence, AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::trace_macro::rb_trace;
use crate::Core::bytes::next_pow2;
use crate::Core::error::InitError;
use crate::Core::layout::{TrailerKind, TrailerLayout, TRAILER_LENGTH};
use crate::Core::region::Region;
use crate::Core::slot::{aligned_message_size, ReadSlot, SlotArray, SlotClaim, MESSAGE_STATE_FREE};

const POSITION_ALIGNMENT: usize = std::mem::size_of::<u64>();

/// Fixed-size ring buffer view over a caller-provided region.
pub struct FixedRingBuffer<'a> {
    pub(crate) slots: SlotArray<'a>,
    pub(crate) capacity: usize,
    pub(crate) message_size: usize,
    pub(crate) trailer: TrailerLayout,
}

impl<'a> FixedRingBuffer<'a> {
    /// Slots allocated for `requested`: the next power of two, at least two so
    /// the trailer always lands 8-byte aligned.
    #[inline]
    pub const fn slot_count(requested: usize) -> usize {
        let slots = next_pow2(requested);
        if slots < 2 {
            2
        } else {
            slots
        }
    }

    /// Buffer length (slots + trailer) for `requested` messages of `message_size` bytes.
    pub const fn required_buffer_len(requested: usize, message_size: usize) -> usize {
        Self::slot_count(requested) * aligned_message_size(message_size) + TRAILER_LENGTH
    }

    /// Lays the engine over `region`, which must span at least
    /// [`required_buffer_len`](Self::required_buffer_len) bytes. Never writes to it.
    pub fn new(region: Region<'a>, requested: usize, message_size: usize) -> Result<Self, InitError> {
        Self::descriptor(region, requested, message_size).map_err(|e| {
            warn!(requested, message_size, error = %e, "fixed ring buffer init failed");
            e
        })
    }

    fn descriptor(region: Region<'a>, requested: usize, message_size: usize) -> Result<Self, InitError> {
        if requested == 0 || message_size == 0 {
            return Err(InitError::ZeroCapacity);
        }
        if !region.is_aligned_to(POSITION_ALIGNMENT) {
            return Err(InitError::Misaligned(POSITION_ALIGNMENT));
        }
        let capacity = requested
            .checked_next_power_of_two()
            .ok_or(InitError::Overflow)?
            .max(2);
        if message_size > u32::MAX as usize {
            return Err(InitError::Overflow);
        }
        let slot_size = aligned_message_size(message_size);
        let data_length = capacity.checked_mul(slot_size).ok_or(InitError::Overflow)?;
        let required = data_length
            .checked_add(TRAILER_LENGTH)
            .ok_or(InitError::Overflow)?;
        if region.len() < required {
            return Err(InitError::BufferTooSmall {
                required,
                actual: region.len(),
            });
        }
        let rb = Self {
            slots: SlotArray {
                region,
                mask: (capacity - 1) as u64,
                aligned_message_size: slot_size,
            },
            capacity,
            message_size,
            trailer: TrailerLayout::new(data_length, TrailerKind::Ring),
        };
        debug!(capacity, message_size, slot_size, "fixed ring buffer initialized");
        Ok(rb)
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Usable payload bytes per slot (at least the requested message size).
    #[inline]
    pub fn message_size(&self) -> usize {
        self.slots.payload_len()
    }

    #[inline]
    pub fn aligned_message_size(&self) -> usize {
        self.slots.aligned_message_size
    }

    #[inline]
    fn producer_position(&self) -> &'a AtomicU64 {
        self.slots.region.atomic_u64(self.trailer.producer_position)
    }

    #[inline]
    fn consumer_cache_position(&self) -> &'a AtomicU64 {
        self.slots.region.atomic_u64(self.trailer.consumer_cache_position)
    }

    #[inline]
    fn consumer_position(&self) -> &'a AtomicU64 {
        self.slots.region.atomic_u64(self.trailer.consumer_position)
    }

    #[inline]
    fn is_free(&self, position: u64) -> bool {
        self.slots
            .region
            .atomic_u32(self.slots.state_offset(position))
            .load(Ordering::Relaxed)
            == MESSAGE_STATE_FREE
    }

    /// Claims the next slot, probing up to `max_look_ahead_step` slots ahead
    /// so that most claims touch no shared state besides the claimed slot.
    ///
    /// The step is clamped to `capacity - 1`.
    ///
    /// # Safety
    /// Single producer only, never concurrently with [`try_mp_claim`](Self::try_mp_claim).
    pub unsafe fn try_sp_claim(&self, max_look_ahead_step: usize) -> Option<SlotClaim<'a>> {
        let producer_position = self.producer_position().load(Ordering::Relaxed);
        let claim_limit = self.consumer_cache_position().load(Ordering::Relaxed);
        if producer_position >= claim_limit && !self.look_ahead(producer_position, max_look_ahead_step) {
            return None;
        }
        self.producer_position()
            .store(producer_position + 1, Ordering::Relaxed);
        Some(self.slots.claim(producer_position))
    }

    fn look_ahead(&self, producer_position: u64, max_look_ahead_step: usize) -> bool {
        let step = max_look_ahead_step.min(self.capacity - 1) as u64;
        let look_ahead_position = producer_position + step;
        if step != 0 && self.is_free(look_ahead_position) {
            fence(Ordering::Acquire);
            self.consumer_cache_position()
                .store(look_ahead_position, Ordering::Relaxed);
            rb_trace!(look_ahead_position, "fixed: claim limit moved ahead");
            return true;
        }
        if !self.is_free(producer_position) {
            return false;
        }
        fence(Ordering::Acquire);
        true
    }

    /// Claims the next slot by checking only its own state.
    ///
    /// # Safety
    /// Single producer only, never concurrently with [`try_mp_claim`](Self::try_mp_claim).
    pub unsafe fn try_sp_claim_no_lookahead(&self) -> Option<SlotClaim<'a>> {
        let producer_position = self.producer_position().load(Ordering::Relaxed);
        if !self.is_free(producer_position) {
            return None;
        }
        fence(Ordering::Acquire);
        self.producer_position()
            .store(producer_position + 1, Ordering::Relaxed);
        Some(self.slots.claim(producer_position))
    }

    /// Claims the next slot, safe to race with other producers.
    pub fn try_mp_claim(&self) -> Option<SlotClaim<'a>> {
        let mut producer_position = self.producer_position().load(Ordering::Acquire);
        let mut consumer_position = self.consumer_cache_position().load(Ordering::Relaxed);
        loop {
            let wrap_point = producer_position as i64 - self.capacity as i64;
            if consumer_position as i64 <= wrap_point {
                consumer_position = self.refresh_consumer_cache(wrap_point)?;
            }
            match self.producer_position().compare_exchange_weak(
                producer_position,
                producer_position + 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(self.slots.claim(producer_position)),
                Err(current) => producer_position = current,
            }
        }
    }

    fn refresh_consumer_cache(&self, wrap_point: i64) -> Option<u64> {
        let consumer_position = self.consumer_position().load(Ordering::Relaxed);
        if consumer_position as i64 <= wrap_point {
            return None;
        }
        fence(Ordering::Acquire);
        self.consumer_cache_position()
            .store(consumer_position, Ordering::Relaxed);
        rb_trace!(consumer_position, "fixed: consumer cache refreshed");
        Some(consumer_position)
    }

    /// Hands up to `count` committed payloads to `consumer`, freeing each slot
    /// as soon as the callback returns. `false` stops after that message.
    ///
    /// # Safety
    /// Single consumer only.
    pub unsafe fn batch_read<F>(&self, consumer: F, count: usize) -> usize
    where
        F: FnMut(&mut [u8]) -> bool,
    {
        self.slots
            .drain(self.consumer_position(), Ordering::Release, consumer, count)
    }

    /// Borrows the next committed slot without consuming it.
    ///
    /// # Safety
    /// Single consumer only.
    pub unsafe fn try_read(&self) -> Option<ReadSlot<'a>> {
        self.slots.try_read(self.consumer_position())
    }

    /// Claimed and not yet consumed slots; approximate while producers run.
    pub fn size(&self) -> usize {
        let consumer_position = self.consumer_position().load(Ordering::Relaxed);
        let producer_position = self.producer_position().load(Ordering::Relaxed);
        producer_position.saturating_sub(consumer_position) as usize
    }

    #[inline]
    pub fn load_producer_position(&self) -> u64 {
        self.producer_position().load(Ordering::Acquire)
    }

    #[inline]
    pub fn load_consumer_position(&self) -> u64 {
        self.consumer_position().load(Ordering::Acquire)
    }
}
