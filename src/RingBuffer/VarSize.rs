// Variable-size ring buffer: framed records of arbitrary length, single or
// multiple producers, one consumer.
//
// A claim reserves `required_record_capacity(len)` bytes by advancing the
// producer position; the record becomes visible when its header is
// release-stored with a positive length. A claim that would straddle the end
// of the buffer first fills the tail with a padding record and starts over at
// offset 0.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::trace_macro::rb_trace;
use crate::Core::bytes::{align, is_pow2, next_pow2};
use crate::Core::error::{InitError, RecordError};
use crate::Core::layout::{TrailerKind, TrailerLayout, TRAILER_LENGTH};
use crate::Core::record::{
    check_msg_type_id, encoded_msg_offset, make_header, message_type_id, record_length,
    required_record_capacity, MsgTypeId, PADDING_MSG_TYPE_ID, RECORD_ALIGNMENT,
    RECORD_HEADER_LENGTH,
};
use crate::Core::region::Region;

/// Variable-size ring buffer view over a caller-provided region.
///
/// The value caches the immutable descriptor (capacity, mask, trailer
/// offsets); all shared state lives in the region, so several views (even in
/// several processes) can be built over the same bytes.
pub struct VsRingBuffer<'a> {
    pub(crate) region: Region<'a>,
    pub(crate) capacity: usize,
    pub(crate) mask: usize,
    pub(crate) max_msg_length: usize,
    pub(crate) trailer: TrailerLayout,
}

/// Bytes reserved by a successful claim, not yet visible to the consumer.
#[must_use = "an uncommitted claim blocks the consumer"]
pub struct VsClaim<'a> {
    region: Region<'a>,
    position: u64,
    index: usize,
    content_len: usize,
}

impl<'a> VsClaim<'a> {
    /// Position of the record (past any padding written by this claim).
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Byte offset of the record header in the buffer.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn content_offset(&self) -> usize {
        encoded_msg_offset(self.index)
    }

    #[inline]
    pub fn content_len(&self) -> usize {
        self.content_len
    }

    #[inline]
    pub fn content_mut(&mut self) -> &mut [u8] {
        // SAFETY: the claimed bytes belong to this producer until commit.
        unsafe { self.region.slice_mut(self.content_offset(), self.content_len) }
    }

    /// Publishes the record.
    #[inline]
    pub fn commit(self, msg_type_id: MsgTypeId) {
        store_header(self.region, self.index, msg_type_id.get(), self.content_len);
    }
}

#[inline]
fn store_header(region: Region<'_>, index: usize, msg_type_id: i32, content_len: usize) {
    let header = make_header(msg_type_id, (content_len + RECORD_HEADER_LENGTH) as u32);
    region.atomic_u64(index).store(header, Ordering::Release);
}

impl<'a> VsRingBuffer<'a> {
    /// Buffer length (data + trailer) to allocate for at least `requested` data bytes.
    pub const fn required_buffer_len(requested: usize) -> usize {
        next_pow2(requested) + TRAILER_LENGTH
    }

    /// Lays the engine over `region`. Never writes to it: a new buffer must
    /// arrive zeroed, an existing one is reused as-is.
    pub fn new(region: Region<'a>) -> Result<Self, InitError> {
        Self::descriptor(region).map_err(|e| {
            warn!(len = region.len(), error = %e, "vs ring buffer init failed");
            e
        })
    }

    fn descriptor(region: Region<'a>) -> Result<Self, InitError> {
        if !region.is_aligned_to(RECORD_ALIGNMENT) {
            return Err(InitError::Misaligned(RECORD_ALIGNMENT));
        }
        let capacity = region
            .len()
            .checked_sub(TRAILER_LENGTH)
            .ok_or(InitError::BufferTooSmall {
                required: Self::required_buffer_len(RECORD_HEADER_LENGTH),
                actual: region.len(),
            })?;
        if capacity == 0 {
            return Err(InitError::ZeroCapacity);
        }
        if !is_pow2(capacity) {
            return Err(InitError::NotPowerOfTwo(capacity));
        }
        if capacity < RECORD_HEADER_LENGTH {
            return Err(InitError::CapacityTooSmall(capacity));
        }
        // Record lengths travel in the low 32 bits of the header as a signed value.
        if capacity > i32::MAX as usize {
            return Err(InitError::Overflow);
        }
        let rb = Self {
            region,
            capacity,
            mask: capacity - 1,
            max_msg_length: capacity - RECORD_HEADER_LENGTH,
            trailer: TrailerLayout::new(capacity, TrailerKind::Ring),
        };
        debug!(
            capacity,
            max_msg_length = rb.max_msg_length,
            "vs ring buffer initialized"
        );
        Ok(rb)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn max_msg_length(&self) -> usize {
        self.max_msg_length
    }

    #[inline]
    pub fn region(&self) -> Region<'a> {
        self.region
    }

    #[inline]
    fn producer_position(&self) -> &'a AtomicU64 {
        self.region.atomic_u64(self.trailer.producer_position)
    }

    #[inline]
    fn consumer_cache_position(&self) -> &'a AtomicU64 {
        self.region.atomic_u64(self.trailer.consumer_cache_position)
    }

    #[inline]
    fn consumer_position(&self) -> &'a AtomicU64 {
        self.region.atomic_u64(self.trailer.consumer_position)
    }

    #[inline]
    fn available(&self, producer_position: u64, consumer_position: u64) -> i64 {
        self.capacity as i64 - producer_position.wrapping_sub(consumer_position) as i64
    }

    /// Claims room for `content_len` bytes.
    ///
    /// Returns `None` when the content is longer than [`max_msg_length`] or
    /// the buffer has no room right now.
    ///
    /// # Safety
    /// At most one thread (across every process mapping the buffer) may claim
    /// with this method, and never concurrently with [`try_mp_claim`].
    ///
    /// [`max_msg_length`]: Self::max_msg_length
    /// [`try_mp_claim`]: Self::try_mp_claim
    pub unsafe fn try_sp_claim(&self, content_len: usize) -> Option<VsClaim<'a>> {
        if content_len > self.max_msg_length {
            return None;
        }
        let consumer_position = self.consumer_cache_position().load(Ordering::Relaxed);
        let producer_position = self.producer_position().load(Ordering::Relaxed);
        let required = required_record_capacity(content_len);
        let consumer_position = if required as i64 > self.available(producer_position, consumer_position) {
            self.try_claim_when_full(producer_position, required)?
        } else {
            consumer_position
        };
        let (padding, _) = self.padding_for(producer_position, required, consumer_position)?;
        self.producer_position()
            .store(producer_position + (required + padding) as u64, Ordering::Release);
        Some(self.claimed(producer_position, padding, content_len))
    }

    /// Claims room for `content_len` bytes, safe to race with other producers.
    pub fn try_mp_claim(&self, content_len: usize) -> Option<VsClaim<'a>> {
        if content_len > self.max_msg_length {
            return None;
        }
        let mut consumer_position = self.consumer_cache_position().load(Ordering::Relaxed);
        let required = required_record_capacity(content_len);
        let mut producer_position = self.producer_position().load(Ordering::Acquire);
        loop {
            if required as i64 > self.available(producer_position, consumer_position) {
                consumer_position = self.try_claim_when_full(producer_position, required)?;
            }
            let (padding, refreshed) = self.padding_for(producer_position, required, consumer_position)?;
            consumer_position = refreshed;
            match self.producer_position().compare_exchange(
                producer_position,
                producer_position + (required + padding) as u64,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(self.claimed(producer_position, padding, content_len)),
                Err(current) => producer_position = current,
            }
        }
    }

    /// Refreshes the consumer view when the cached one says "full".
    fn try_claim_when_full(&self, producer_position: u64, required: usize) -> Option<u64> {
        let consumer_position = self.consumer_position().load(Ordering::Acquire);
        if required as i64 > self.available(producer_position, consumer_position) {
            return None;
        }
        self.consumer_cache_position()
            .store(consumer_position, Ordering::Relaxed);
        rb_trace!(consumer_position, "vs: consumer cache refreshed");
        Some(consumer_position)
    }

    /// Padding needed before a record of `required` bytes at `producer_position`
    /// and the consumer position it was checked against, or `None` when the
    /// start of the buffer is not free yet.
    fn padding_for(&self, producer_position: u64, required: usize, consumer_position: u64) -> Option<(usize, u64)> {
        let producer_index = producer_position as usize & self.mask;
        let bytes_until_end = self.capacity - producer_index;
        if required <= bytes_until_end {
            return Some((0, consumer_position));
        }
        let consumer_index = consumer_position as usize & self.mask;
        let consumer_position = if required > consumer_index {
            self.try_acquire_from_start_of_buffer(required)?
        } else {
            consumer_position
        };
        Some((bytes_until_end, consumer_position))
    }

    fn try_acquire_from_start_of_buffer(&self, required: usize) -> Option<u64> {
        let consumer_position = self.consumer_position().load(Ordering::Acquire);
        let consumer_index = consumer_position as usize & self.mask;
        if required > consumer_index {
            return None;
        }
        self.consumer_cache_position()
            .store(consumer_position, Ordering::Relaxed);
        Some(consumer_position)
    }

    fn claimed(&self, producer_position: u64, padding: usize, content_len: usize) -> VsClaim<'a> {
        if padding != 0 {
            let padding_index = producer_position as usize & self.mask;
            self.region
                .atomic_u64(padding_index)
                .store(make_header(PADDING_MSG_TYPE_ID, padding as u32), Ordering::Release);
            rb_trace!(padding_index, padding, "vs: padding record written");
        }
        let position = producer_position + padding as u64;
        VsClaim {
            region: self.region,
            position,
            index: position as usize & self.mask,
            content_len,
        }
    }

    /// Publishes the record at `index` with `content_len` bytes of content.
    ///
    /// Index-only form of [`VsClaim::commit`], for producers that keep the
    /// claimed index rather than the claim value.
    ///
    /// # Safety
    /// `index` and `content_len` must come from a claim on this buffer that has
    /// not been committed yet.
    pub unsafe fn commit(&self, index: usize, msg_type_id: i32, content_len: usize) -> Result<(), RecordError> {
        if !check_msg_type_id(msg_type_id) {
            return Err(RecordError::ReservedTypeId(msg_type_id));
        }
        if content_len > self.max_msg_length {
            return Err(RecordError::TooLong {
                len: content_len,
                max: self.max_msg_length,
            });
        }
        store_header(self.region, index, msg_type_id, content_len);
        Ok(())
    }

    /// Hands up to `count` committed records to `consumer` as `(type id, content)`.
    ///
    /// Reads only up to the end of the buffer: a batch that reaches the end
    /// stops there and the next call continues from offset 0. The callback
    /// returning `false` stops the batch after that record. Consumed bytes
    /// are zeroed and the consumer position is published once per batch.
    ///
    /// # Safety
    /// Single consumer only (across every process mapping the buffer).
    pub unsafe fn read<F>(&self, mut consumer: F, count: usize) -> usize
    where
        F: FnMut(i32, &[u8]) -> bool,
    {
        let consumer_position = self.consumer_position().load(Ordering::Relaxed);
        let consumer_index = consumer_position as usize & self.mask;
        let remaining = self.capacity - consumer_index;
        let mut bytes_consumed = 0;
        let mut msg_read = 0;
        while bytes_consumed < remaining && msg_read < count {
            let record_index = consumer_index + bytes_consumed;
            let header = self.region.atomic_u64(record_index).load(Ordering::Acquire);
            let length = record_length(header);
            if length <= 0 {
                debug_assert!(length == 0, "corrupted record length {length} at {record_index}");
                break;
            }
            let length = length as usize;
            debug_assert!(length <= remaining - bytes_consumed);
            bytes_consumed += align(length, RECORD_ALIGNMENT);
            let msg_type_id = message_type_id(header);
            if msg_type_id == PADDING_MSG_TYPE_ID {
                continue;
            }
            msg_read += 1;
            let content = self
                .region
                .slice(encoded_msg_offset(record_index), length - RECORD_HEADER_LENGTH);
            if !consumer(msg_type_id, content) {
                break;
            }
        }
        if bytes_consumed != 0 {
            self.region.fill_zero(consumer_index, bytes_consumed);
            self.consumer_position()
                .store(consumer_position + bytes_consumed as u64, Ordering::Release);
        }
        msg_read
    }

    /// Bytes claimed and not yet consumed, from a consistent pair of positions.
    pub fn size(&self) -> usize {
        let mut before = self.consumer_position().load(Ordering::Acquire);
        loop {
            let producer_position = self.producer_position().load(Ordering::Acquire);
            let after = self.consumer_position().load(Ordering::Acquire);
            if before == after {
                return producer_position.wrapping_sub(before) as usize;
            }
            before = after;
        }
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
