// Named shared memory on Linux: a file under /dev/shm mapped MAP_SHARED.
//
// Any process that maps the same name sees the same bytes, so every engine can
// be laid over it and used across processes.

use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

use crate::Core::region::Region;

/// Memory mapping that an engine can be laid over.
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Start of the mapped region.
    fn as_ptr(&self) -> *mut u8;

    /// Size of the mapped region in bytes.
    fn size(&self) -> usize;

    fn raw_handle(&self) -> RawHandle;

    /// View over the whole mapping, valid while the backend is alive.
    fn region(&self) -> Region<'_> {
        match NonNull::new(self.as_ptr()) {
            // SAFETY: the mapping is readable and writable for `size()` bytes
            // until the backend is dropped.
            Some(ptr) => unsafe { Region::from_raw_parts(ptr, self.size()) },
            None => Region::new(&mut []),
        }
    }
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy)]
pub enum RawHandle {
    /// Unix file descriptor (Linux)
    Fd(i32),
}

#[cfg(target_os = "linux")]
fn shm_path(name: &str) -> io::Result<String> {
    if name.is_empty() || name.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid shared memory name {name:?}"),
        ));
    }
    Ok(format!("/dev/shm/{name}"))
}

/// Creates (or truncates) the named region with `size` zeroed bytes.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(size, name)?))
}

/// Maps an existing named region that spans at least `min_size` bytes.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach(name, min_size)?))
}

/// Unlinks the named region. Live mappings stay valid until dropped.
#[cfg(target_os = "linux")]
pub fn remove_shared_memory(name: &str) -> io::Result<()> {
    std::fs::remove_file(shm_path(name)?)
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn remove_shared_memory(_name: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
pub use linux::LinuxSharedMemory;

#[cfg(target_os = "linux")]
mod linux {
    use super::{shm_path, RawHandle, SharedMemoryBackend};
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::{AsRawFd, IntoRawFd};
    use std::os::unix::fs::OpenOptionsExt;
    use std::ptr::{self, NonNull};
    use tracing::debug;

    #[derive(Debug)]
    pub struct LinuxSharedMemory {
        ptr: NonNull<u8>,
        size: usize,
        fd: i32,
    }

    // SAFETY: the mapping is process-wide; concurrent access is coordinated by
    // the engines laid over it.
    unsafe impl Send for LinuxSharedMemory {}
    unsafe impl Sync for LinuxSharedMemory {}

    impl LinuxSharedMemory {
        pub fn create(size: usize, name: &str) -> io::Result<Self> {
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "shared memory size must be greater than zero",
                ));
            }
            let path = shm_path(name)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)
                .map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("Failed to create shared memory file at {path}: {e}"),
                    )
                })?;

            // Truncating to the new length zero-fills every byte.
            file.set_len(size as u64)?;
            debug!(%path, size, "created shared memory");
            Self::map(file, size)
        }

        pub fn attach(name: &str, min_size: usize) -> io::Result<Self> {
            let path = shm_path(name)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("Failed to open shared memory at {path}: {e}"),
                    )
                })?;

            let file_size = file.metadata()?.len() as usize;
            if file_size == 0 || file_size < min_size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Shared memory size too small: expected at least {min_size} bytes, got {file_size}"
                    ),
                ));
            }
            debug!(%path, size = file_size, "attached shared memory");
            Self::map(file, file_size)
        }

        fn map(file: File, size: usize) -> io::Result<Self> {
            // SAFETY: mapping a regular file we hold open; the result is checked.
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let ptr = NonNull::new(ptr as *mut u8)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
            // Mappings are page aligned, which covers every engine's alignment.
            Ok(Self {
                ptr,
                size,
                fd: file.into_raw_fd(),
            })
        }
    }

    impl Drop for LinuxSharedMemory {
        fn drop(&mut self) {
            // SAFETY: unmapping exactly what `map` mapped, then closing our fd.
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
                libc::close(self.fd);
            }
        }
    }

    impl SharedMemoryBackend for LinuxSharedMemory {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn raw_handle(&self) -> RawHandle {
            RawHandle::Fd(self.fd)
        }
    }
}
