//! Named POSIX shared memory regions

use std::os::fd::{AsRawFd, OwnedFd};

use memmap2::{MmapMut, MmapOptions};
use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::mman::{shm_open, shm_unlink},
    sys::stat::{fstat, Mode},
    unistd::ftruncate,
};

use crate::error::{AttuneError, Result};

/// An OS-backed shared memory segment identified by a global name.
///
/// The segment is mapped read-write into this process. Deletion of the
/// OS-global name is opt-in: it happens only in [`close`](Self::close) and
/// only when [`mark_cleanup`](Self::mark_cleanup) was called first. Dropping
/// an unclosed region releases the mapping and descriptor but never unlinks
/// the name.
#[derive(Debug)]
pub struct NamedSharedRegion {
    name: String,
    size: usize,
    mmap: Option<MmapMut>,
    fd: Option<OwnedFd>,
    created: bool,
    cleanup_on_close: bool,
    closed: bool,
}

impl NamedSharedRegion {
    const CREATE_MODE: Mode = Mode::S_IRUSR.union(Mode::S_IWUSR);

    /// Create a new segment, failing if the name already exists
    pub fn create_new(name: &str, size: usize) -> Result<Self> {
        Self::validate(name, size)?;

        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Self::CREATE_MODE,
        )
        .map_err(|e| Self::os_error(e, name, "failed to create shared region"))?;

        Self::from_fd(name, size, fd, true, true)
    }

    /// Open a segment some other process already created
    pub fn open_existing(name: &str) -> Result<Self> {
        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|e| Self::os_error(e, name, "failed to open shared region"))?;

        let stat = fstat(fd.as_raw_fd())
            .map_err(|e| Self::os_error(e, name, "failed to stat shared region"))?;
        let size = stat.st_size as usize;
        if size == 0 {
            // The creator has not run ftruncate yet; surface the race as an
            // open failure.
            return Err(AttuneError::resource(format!(
                "shared region {} exists but is not yet sized",
                name
            )));
        }

        Self::from_fd(name, size, fd, false, false)
    }

    /// Create the segment, or open it if another process got there first.
    ///
    /// Returns which path was taken so the caller can decide whether to run
    /// first-writer initialization. Opening an existing segment whose size
    /// differs from `size` is an error.
    pub fn create_or_open(name: &str, size: usize) -> Result<(Self, bool)> {
        Self::validate(name, size)?;

        match shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Self::CREATE_MODE,
        ) {
            Ok(fd) => Ok((Self::from_fd(name, size, fd, true, true)?, true)),
            Err(Errno::EEXIST) => {
                let region = Self::open_existing(name)?;
                if region.size() != size {
                    return Err(AttuneError::resource(format!(
                        "size mismatch for shared region {}: existing {}, requested {}",
                        name,
                        region.size(),
                        size
                    )));
                }
                Ok((region, false))
            }
            Err(e) => Err(Self::os_error(e, name, "failed to create shared region")),
        }
    }

    fn from_fd(
        name: &str,
        size: usize,
        fd: OwnedFd,
        created: bool,
        truncate: bool,
    ) -> Result<Self> {
        match Self::size_and_map(name, size, &fd, truncate) {
            Ok(mmap) => Ok(Self {
                name: name.to_string(),
                size,
                mmap: Some(mmap),
                fd: Some(fd),
                created,
                cleanup_on_close: false,
                closed: false,
            }),
            Err(err) => {
                // A name we created but could not size or map is useless to
                // every process; remove it with the failure.
                if created {
                    let _ = shm_unlink(name);
                }
                Err(err)
            }
        }
    }

    fn size_and_map(name: &str, size: usize, fd: &OwnedFd, truncate: bool) -> Result<MmapMut> {
        if truncate {
            ftruncate(fd, size as i64)
                .map_err(|e| Self::os_error(e, name, "failed to size shared region"))?;
        }

        unsafe {
            MmapOptions::new()
                .len(size)
                .map_mut(fd.as_raw_fd())
                .map_err(|e| AttuneError::from_io(e, "failed to map shared region"))
        }
    }

    fn validate(name: &str, size: usize) -> Result<()> {
        if !name.starts_with('/') || name.len() < 2 {
            return Err(AttuneError::invalid_parameter(
                "name",
                "shared region name must be of the form /name",
            ));
        }
        if size == 0 {
            return Err(AttuneError::invalid_parameter(
                "size",
                "shared region size must be greater than 0",
            ));
        }
        Ok(())
    }

    fn os_error(errno: Errno, name: &str, context: &str) -> AttuneError {
        AttuneError::from_errno(errno, &format!("{} {}", context, name))
    }

    /// Get the OS-global name of the region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of the region in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this instance created the segment (vs. opened an existing one)
    pub fn created(&self) -> bool {
        self.created
    }

    /// Whether closing will also delete the OS-global name
    pub fn cleanup_on_close(&self) -> bool {
        self.cleanup_on_close
    }

    /// Request deletion of the OS-global name when this region is closed
    pub fn mark_cleanup(&mut self) {
        self.cleanup_on_close = true;
    }

    /// Get the raw memory slice (read-only). Panics if the region was closed.
    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().expect("shared region is closed")
    }

    /// Get the raw memory slice (mutable). Panics if the region was closed.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.mmap.as_deref_mut().expect("shared region is closed")
    }

    /// Get a typed pointer to the start of the region
    pub fn as_ptr<T>(&self) -> *const T {
        self.as_slice().as_ptr() as *const T
    }

    /// Get a mutable typed pointer to the start of the region
    ///
    /// # Safety
    /// Caller must ensure the aliasing rules for the shared bytes hold; the
    /// region is mapped read-write by every attached process.
    pub unsafe fn as_mut_ptr_unchecked<T>(&self) -> *mut T {
        self.as_slice().as_ptr() as *mut T
    }

    /// Release the mapping and descriptor; delete the OS-global name if this
    /// region was marked for cleanup.
    ///
    /// Idempotent. `ENOENT` from the unlink is ignored: another process may
    /// have deleted the name already, and delete-by-name races resolve as
    /// open failures in the racing process, never as corruption.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.mmap = None;
        self.fd = None;

        if self.cleanup_on_close {
            match shm_unlink(self.name.as_str()) {
                Ok(()) | Err(Errno::ENOENT) => {}
                Err(e) => {
                    tracing::warn!(name = %self.name, errno = %e, "failed to unlink shared region");
                }
            }
        }
    }
}

// The mapping is shared between processes by design; all cross-process
// mutation goes through atomics or the append-only directory discipline.
unsafe impl Send for NamedSharedRegion {}
