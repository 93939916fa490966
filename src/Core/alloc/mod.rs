use crate::Core::bytes::CACHE_LINE_LENGTH;
use crate::Core::region::Region;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::io;
use std::ptr::NonNull;

/// Alignment of heap buffers: two cache lines, like the trailer field spacing.
pub const BUFFER_ALIGNMENT: usize = CACHE_LINE_LENGTH * 2;

/// Zeroed heap buffer aligned for every engine's atomics.
///
/// For callers that do not bring their own stack, heap or mapped memory.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    pub fn new(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "AlignedBuffer::new(): length must be greater than zero",
            ));
        }
        let layout = Layout::from_size_align(len, BUFFER_ALIGNMENT)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("failed to allocate {len} aligned bytes"),
            )
        })?;
        Ok(Self { ptr, layout })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// View handed to an engine constructor; the engine borrows the buffer.
    pub fn region(&mut self) -> Region<'_> {
        // SAFETY: the allocation is live and uniquely borrowed for the region's lifetime.
        unsafe { Region::from_raw_parts(self.ptr, self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: the buffer exclusively owns its allocation.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}
