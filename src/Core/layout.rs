use super::bytes::{align, CACHE_LINE_LENGTH};

/// Offset within the trailer of the producer position (the active cycle index for streams).
pub const PRODUCER_POSITION_OFFSET: usize = CACHE_LINE_LENGTH * 2;
/// Offset within the trailer of the consumer position cached by producers.
pub const CONSUMER_CACHE_POSITION_OFFSET: usize = CACHE_LINE_LENGTH * 4;
/// Offset within the trailer of the consumer position.
pub const CONSUMER_POSITION_OFFSET: usize = CACHE_LINE_LENGTH * 6;
/// Offset within the trailer of the first per-cycle claim counter (streams only).
pub const CYCLE_CLAIMS_OFFSET: usize = CACHE_LINE_LENGTH * 8;
/// Trailer length of the ring buffers; the fixed head of the stream trailer.
pub const TRAILER_LENGTH: usize = CACHE_LINE_LENGTH * 8;

const CYCLE_CLAIM_STRIDE: usize = std::mem::size_of::<u64>();

/// Which engine the trailer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailerKind {
    Ring,
    Stream { cycles: usize },
}

/// Absolute byte offsets of every trailer field for one buffer.
///
/// Both ring buffers and the stream share the same head; the stream appends
/// one packed 64-bit claim counter per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerLayout {
    pub data_length: usize,
    pub producer_position: usize,
    pub consumer_cache_position: usize,
    pub consumer_position: usize,
    pub cycle_claims: usize,
    pub cycles: usize,
    pub trailer_length: usize,
}

impl TrailerLayout {
    pub const fn trailer_length(kind: TrailerKind) -> usize {
        match kind {
            TrailerKind::Ring => TRAILER_LENGTH,
            TrailerKind::Stream { cycles } => {
                CYCLE_CLAIMS_OFFSET + align(CYCLE_CLAIM_STRIDE * cycles, CACHE_LINE_LENGTH * 2)
            }
        }
    }

    pub const fn new(data_length: usize, kind: TrailerKind) -> Self {
        let cycles = match kind {
            TrailerKind::Ring => 0,
            TrailerKind::Stream { cycles } => cycles,
        };
        Self {
            data_length,
            producer_position: data_length + PRODUCER_POSITION_OFFSET,
            consumer_cache_position: data_length + CONSUMER_CACHE_POSITION_OFFSET,
            consumer_position: data_length + CONSUMER_POSITION_OFFSET,
            cycle_claims: data_length + CYCLE_CLAIMS_OFFSET,
            cycles,
            trailer_length: Self::trailer_length(kind),
        }
    }

    /// Bytes the whole buffer (data + trailer) must span.
    #[inline]
    pub const fn buffer_length(&self) -> usize {
        self.data_length + self.trailer_length
    }

    #[inline]
    pub fn cycle_claim(&self, cycle_index: usize) -> usize {
        debug_assert!(cycle_index < self.cycles);
        self.cycle_claims + cycle_index * CYCLE_CLAIM_STRIDE
    }
}
