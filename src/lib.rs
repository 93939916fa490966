//! Lock-free ring buffers and a cyclic stream over caller-provided memory.
//!
//! Every engine is a view laid over a flat byte region (heap, stack or a
//! shared mapping): the data area followed by a trailer of cache-line padded
//! positions. Producers claim, write in place and commit; a single consumer
//! reads in batches.

mod trace_macro;

// Module naming follows project convention
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod RingBuffer;
#[allow(non_snake_case)]
pub mod Stream;
#[allow(non_snake_case)]
pub mod Channel;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use Channel::{ChannelBuilder, Consumer, Producer};
pub use Core::record::MsgTypeId;
pub use Core::{AlignedBuffer, InitError, ReadSlot, RecordError, Region, SlotClaim};
pub use RingBuffer::{FixedRingBuffer, VsClaim, VsRingBuffer};
pub use Stream::{FsStream, StreamClaimError};
