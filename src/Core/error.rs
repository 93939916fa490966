use std::io;
use thiserror::Error;

/// Misconfiguration detected while building an engine descriptor.
///
/// An engine that fails to initialize never touches the buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("data region of {0} bytes is not a power of two")]
    NotPowerOfTwo(usize),

    #[error("buffer of {actual} bytes is smaller than the {required} bytes required")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("buffer must be aligned to {0} bytes")]
    Misaligned(usize),

    #[error("capacity of {0} bytes cannot hold a single record")]
    CapacityTooSmall(usize),

    #[error("requested capacity must be greater than zero")]
    ZeroCapacity,

    #[error("stream requires at least two cycles, got {0}")]
    TooFewCycles(u32),

    #[error("requested layout does not fit the addressable range")]
    Overflow,
}

/// A record header that cannot be written.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("message type id {0} is reserved (must be > 0)")]
    ReservedTypeId(i32),

    #[error("record content of {len} bytes exceeds the {max} bytes maximum")]
    TooLong { len: usize, max: usize },
}

impl From<InitError> for io::Error {
    fn from(e: InitError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, e)
    }
}

impl From<RecordError> for io::Error {
    fn from(e: RecordError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, e)
    }
}
