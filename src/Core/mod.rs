pub mod SharedMemory;
pub mod alloc;
pub mod bytes;
pub mod error;
pub mod layout;
pub mod record;
pub mod region;
pub mod slot;

pub use self::alloc::AlignedBuffer;
pub use self::error::{InitError, RecordError};
pub use self::region::Region;
pub use self::slot::{ReadSlot, SlotClaim};
pub use self::SharedMemory::{
    attach_shared_memory, create_shared_memory, remove_shared_memory, RawHandle,
    SharedMemoryBackend,
};
