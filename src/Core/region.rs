// A borrowed view over the raw bytes of a buffer (data area + trailer).
//
// The region never owns or frees memory: it is either borrowed from a
// `&mut [u8]` (heap/stack) or built over a mapping that outlives it.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Shared view over a buffer's bytes.
///
/// All concurrent access goes through the atomic accessors; plain slices are
/// only handed out for bytes the claim/read protocols give exclusive access to.
#[derive(Clone, Copy)]
pub struct Region<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _marker: PhantomData<&'a UnsafeCell<[u8]>>,
}

// SAFETY: the region is a plain address range; every engine coordinates
// accesses to it through atomics with explicit ordering.
unsafe impl Send for Region<'_> {}
unsafe impl Sync for Region<'_> {}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<'a> Region<'a> {
    /// Wraps a buffer as-is. A freshly initialized buffer must be all zeroes.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let len = bytes.len();
        Self {
            ptr: NonNull::from(bytes).cast(),
            len,
            _marker: PhantomData,
        }
    }

    /// Zero-fills `bytes` and wraps them.
    pub fn zeroed(bytes: &'a mut [u8]) -> Self {
        bytes.fill(0);
        Self::new(bytes)
    }

    /// Builds a region over memory the caller keeps alive (e.g. an mmap).
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for `'a`, and
    /// must not be accessed through references that assume exclusivity.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_aligned_to(&self, alignment: usize) -> bool {
        (self.ptr.as_ptr() as usize) % alignment == 0
    }

    #[inline]
    pub(crate) fn atomic_u64(&self, offset: usize) -> &'a AtomicU64 {
        debug_assert!(offset + 8 <= self.len, "u64 at {offset} out of {} bytes", self.len);
        debug_assert!((self.ptr.as_ptr() as usize + offset) % 8 == 0);
        // SAFETY: in bounds and aligned (checked at engine init, asserted in debug).
        unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicU64) }
    }

    #[inline]
    pub(crate) fn atomic_u32(&self, offset: usize) -> &'a AtomicU32 {
        debug_assert!(offset + 4 <= self.len, "u32 at {offset} out of {} bytes", self.len);
        debug_assert!((self.ptr.as_ptr() as usize + offset) % 4 == 0);
        // SAFETY: as above.
        unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicU32) }
    }

    /// # Safety
    /// No other thread may write `offset..offset + len` while the slice lives.
    #[inline]
    pub(crate) unsafe fn slice(&self, offset: usize, len: usize) -> &'a [u8] {
        debug_assert!(offset + len <= self.len);
        std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len)
    }

    /// # Safety
    /// The caller must hold exclusive access to `offset..offset + len`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, offset: usize, len: usize) -> &'a mut [u8] {
        debug_assert!(offset + len <= self.len);
        std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len)
    }

    /// # Safety
    /// The caller must hold exclusive access to `offset..offset + len`.
    #[inline]
    pub(crate) unsafe fn fill_zero(&self, offset: usize, len: usize) {
        debug_assert!(offset + len <= self.len);
        std::ptr::write_bytes(self.ptr.as_ptr().add(offset), 0, len);
    }
}
