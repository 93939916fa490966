// Fixed-size cyclic stream: the slot array is split into `cycles` cycles of
// `cycle_length` slots. Producers claim with a single fetch_add on the active
// cycle's packed {cycle id:32 | offset:32} counter; the producer whose
// fetch_add lands exactly on the cycle end rotates to the next cycle.
//
// Producers never probe slot states: they are held back only by the consumer
// position, at most `max_gain = cycle_length * (cycles - 1)` slots ahead of it.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::trace_macro::rb_trace;
use crate::Core::bytes::next_pow2;
use crate::Core::error::InitError;
use crate::Core::layout::{TrailerKind, TrailerLayout};
use crate::Core::region::Region;
use crate::Core::slot::{aligned_message_size, SlotArray, SlotClaim};

const CYCLE_OFFSET_MASK: u64 = 0xFFFF_FFFF;
const POSITION_ALIGNMENT: usize = std::mem::size_of::<u64>();

/// Why a stream claim did not return a slot. Every variant means "retry later".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClaimError {
    /// The producers are `max_gain` slots ahead of the consumer.
    #[error("stream is back-pressured by the consumer")]
    Backpressured,

    /// This call hit the end of the active cycle and rotated to the next one.
    #[error("active cycle exhausted, rotated to the next cycle")]
    Rotated,

    /// Another producer already hit the end of the active cycle.
    #[error("claim offset {offset} past the end of the active cycle")]
    Overrun { offset: u32 },
}

/// Cyclic stream view over a caller-provided region.
pub struct FsStream<'a> {
    pub(crate) slots: SlotArray<'a>,
    pub(crate) capacity: u64,
    pub(crate) cycle_length: u64,
    pub(crate) cycles: u32,
    pub(crate) mask_cycles: u32,
    pub(crate) max_gain: u64,
    pub(crate) position_mask: u64,
    pub(crate) trailer: TrailerLayout,
}

struct Geometry {
    cycle_length: usize,
    cycles: usize,
    slot_size: usize,
    data_length: usize,
    trailer: TrailerLayout,
}

fn geometry(requested: usize, message_size: usize, cycles: u32) -> Result<Geometry, InitError> {
    if cycles < 2 {
        return Err(InitError::TooFewCycles(cycles));
    }
    if requested == 0 || message_size == 0 {
        return Err(InitError::ZeroCapacity);
    }
    // Cycle offsets and ids share one 64-bit counter.
    if requested > 1 << 30 || cycles > 1 << 30 || message_size > u32::MAX as usize {
        return Err(InitError::Overflow);
    }
    let cycle_length = next_pow2(requested);
    let cycles = next_pow2(cycles as usize);
    let slot_size = aligned_message_size(message_size);
    let data_length = cycle_length
        .checked_mul(cycles)
        .and_then(|slots| slots.checked_mul(slot_size))
        .ok_or(InitError::Overflow)?;
    let trailer = TrailerLayout::new(data_length, TrailerKind::Stream { cycles });
    Ok(Geometry {
        cycle_length,
        cycles,
        slot_size,
        data_length,
        trailer,
    })
}

impl<'a> FsStream<'a> {
    /// Buffer length (slots + trailer) for cycles of `requested` messages.
    ///
    /// Both `requested` and `cycles` are rounded up to powers of two.
    pub fn required_buffer_len(requested: usize, message_size: usize, cycles: u32) -> Result<usize, InitError> {
        let geometry = geometry(requested, message_size, cycles)?;
        Ok(geometry.trailer.buffer_length())
    }

    /// Lays the stream over `region`. Never writes to it.
    pub fn new(region: Region<'a>, requested: usize, message_size: usize, cycles: u32) -> Result<Self, InitError> {
        Self::descriptor(region, requested, message_size, cycles).map_err(|e| {
            warn!(requested, message_size, cycles, error = %e, "fs stream init failed");
            e
        })
    }

    fn descriptor(region: Region<'a>, requested: usize, message_size: usize, cycles: u32) -> Result<Self, InitError> {
        if !region.is_aligned_to(POSITION_ALIGNMENT) {
            return Err(InitError::Misaligned(POSITION_ALIGNMENT));
        }
        let Geometry {
            cycle_length,
            cycles,
            slot_size,
            data_length,
            trailer,
        } = geometry(requested, message_size, cycles)?;
        if region.len() < trailer.buffer_length() {
            return Err(InitError::BufferTooSmall {
                required: trailer.buffer_length(),
                actual: region.len(),
            });
        }
        let capacity = (cycle_length * cycles) as u64;
        let stream = Self {
            slots: SlotArray {
                region,
                mask: capacity - 1,
                aligned_message_size: slot_size,
            },
            capacity,
            cycle_length: cycle_length as u64,
            cycles: cycles as u32,
            mask_cycles: (cycles - 1) as u32,
            max_gain: (cycle_length * (cycles - 1)) as u64,
            position_mask: ((cycle_length as u64) << 32) - 1,
            trailer,
        };
        debug!(
            cycle_length,
            cycles,
            slot_size,
            data_length,
            max_gain = stream.max_gain,
            "fs stream initialized"
        );
        Ok(stream)
    }

    /// Total slots across all cycles.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn cycle_length(&self) -> u64 {
        self.cycle_length
    }

    #[inline]
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    #[inline]
    pub fn max_gain(&self) -> u64 {
        self.max_gain
    }

    #[inline]
    pub fn message_size(&self) -> usize {
        self.slots.payload_len()
    }

    #[inline]
    fn active_cycle(&self) -> &'a AtomicU32 {
        self.slots.region.atomic_u32(self.trailer.producer_position)
    }

    #[inline]
    fn cycle_claim(&self, cycle_index: u32) -> &'a AtomicU64 {
        self.slots
            .region
            .atomic_u64(self.trailer.cycle_claim(cycle_index as usize))
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
    pub fn active_cycle_index(&self) -> u32 {
        self.active_cycle().load(Ordering::Acquire)
    }

    /// Absolute position of a packed claim, taken at or after `reference`.
    ///
    /// Cycle ids are 32 bits wide, so a packed claim only names a position
    /// modulo `2^32 * cycle_length`. Claims never trail the consumer, so any
    /// consumer position seen before the claim picks the right lap.
    #[inline]
    fn position_of(&self, cycle_claim: u64, cycle_offset: u64, reference: u64) -> u64 {
        let wrapped = (cycle_claim >> 32) * self.cycle_length + cycle_offset;
        reference + (wrapped.wrapping_sub(reference) & self.position_mask)
    }

    /// Claims a slot, safe to race with any number of producers.
    pub fn try_claim(&self) -> Result<SlotClaim<'a>, StreamClaimError> {
        let active_cycle_index = self.active_cycle().load(Ordering::Acquire);
        let cycle_claim = self.cycle_claim(active_cycle_index);
        let producer_claim = cycle_claim.load(Ordering::Relaxed);
        let consumer_cache_position = self.consumer_cache_position().load(Ordering::Relaxed);
        let producer_position = self.position_of(
            producer_claim,
            producer_claim & CYCLE_OFFSET_MASK,
            consumer_cache_position,
        );
        let claim_limit = consumer_cache_position + self.max_gain;
        if producer_position >= claim_limit && self.is_backpressured(producer_position) {
            return Err(StreamClaimError::Backpressured);
        }
        let producer_cycle_claim = cycle_claim.fetch_add(1, Ordering::Relaxed);
        let cycle_offset = producer_cycle_claim & CYCLE_OFFSET_MASK;
        if cycle_offset < self.cycle_length {
            let position = self.position_of(producer_cycle_claim, cycle_offset, consumer_cache_position);
            Ok(self.slots.claim(position))
        } else if cycle_offset == self.cycle_length {
            self.rotate_cycle(active_cycle_index, producer_cycle_claim);
            Err(StreamClaimError::Rotated)
        } else {
            Err(StreamClaimError::Overrun {
                offset: cycle_offset as u32,
            })
        }
    }

    fn rotate_cycle(&self, active_cycle_index: u32, producer_cycle_claim: u64) {
        let next_cycle_index = (active_cycle_index + 1) & self.mask_cycles;
        let next_cycle_id = ((producer_cycle_claim >> 32) + 1) & CYCLE_OFFSET_MASK;
        self.cycle_claim(next_cycle_index)
            .store(next_cycle_id << 32, Ordering::Relaxed);
        self.active_cycle()
            .store(next_cycle_index, Ordering::Release);
        rb_trace!(next_cycle_index, next_cycle_id, "stream: cycle rotated");
    }

    fn is_backpressured(&self, producer_position: u64) -> bool {
        let consumer_position = self.consumer_position().load(Ordering::Relaxed);
        if producer_position >= consumer_position + self.max_gain {
            rb_trace!(producer_position, consumer_position, "stream: back-pressured");
            return true;
        }
        fence(Ordering::Acquire);
        self.consumer_cache_position()
            .store(consumer_position, Ordering::Relaxed);
        false
    }

    /// Hands up to `count` committed payloads to `consumer`, freeing each slot
    /// as soon as the callback returns. `false` stops after that message.
    ///
    /// # Safety
    /// Single consumer only.
    pub unsafe fn read<F>(&self, consumer: F, count: usize) -> usize
    where
        F: FnMut(&mut [u8]) -> bool,
    {
        // Producers watch the consumer position only, never the slot state.
        self.slots
            .drain(self.consumer_position(), Ordering::Relaxed, consumer, count)
    }

    /// Next position a producer would claim, clamped to the end of the active cycle.
    pub fn load_producer_position(&self) -> u64 {
        self.producer_position_after(self.consumer_position().load(Ordering::Acquire))
    }

    fn producer_position_after(&self, consumer_position: u64) -> u64 {
        let active_cycle_index = self.active_cycle().load(Ordering::Acquire);
        let producer_claim = self
            .cycle_claim(active_cycle_index)
            .load(Ordering::Relaxed);
        let cycle_offset = (producer_claim & CYCLE_OFFSET_MASK).min(self.cycle_length);
        self.position_of(producer_claim, cycle_offset, consumer_position)
    }

    #[inline]
    pub fn load_consumer_position(&self) -> u64 {
        self.consumer_position().load(Ordering::Relaxed)
    }

    /// Claimed and not yet consumed slots; approximate while producers run.
    pub fn size(&self) -> usize {
        let consumer_position = self.consumer_position().load(Ordering::Acquire);
        let producer_position = self.producer_position_after(consumer_position);
        (producer_position - consumer_position) as usize
    }
}
