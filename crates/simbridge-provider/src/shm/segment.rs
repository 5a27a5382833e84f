//! Named POSIX shared-memory segments.
//!
//! Names follow POSIX rules: one leading `/`, no other `/`. Bare names such
//! as `Blackboard` are normalised to `/Blackboard`.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;

use tracing::debug;

use crate::error::ShmError;

type Result<T> = std::result::Result<T, ShmError>;

/// A mapped shared-memory segment.
///
/// Unmapped on drop. Never unlinked implicitly: the segment outlives every
/// process that maps it until [`ShmSegment::unlink`] is called.
pub struct ShmSegment {
    ptr: *mut u8,
    size: usize,
    name: String,
    created: bool,
}

// SAFETY: the mapping stays valid until drop and is only accessed through raw
// pointers; callers serialise access with the mutex stored in the segment.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Open the segment called `name`, creating it when it does not exist.
    ///
    /// The segment is resized to exactly `size`; a new one is zero-filled.
    /// Shrinking a segment another process still maps past `size` makes its
    /// accesses beyond the new end fault.
    pub fn open_or_create(name: &str, size: usize) -> Result<Self> {
        let name = normalize_name(name)?;
        let c_name = CString::new(name.as_str()).map_err(|_| ShmError::InvalidName(name.clone()))?;

        let (fd, created) = open_fd(&c_name)?;
        let current = segment_len(&fd)?;
        if current != size {
            // SAFETY: fd is an open shm object; ftruncate only resizes it.
            let ret = unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) };
            if ret < 0 {
                return Err(ShmError::Truncate(io::Error::last_os_error()));
            }
        }

        // SAFETY: null hint lets the kernel pick the address; fd covers at
        // least `size` bytes after the resize above. MAP_FAILED is checked.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ShmError::Mmap(io::Error::last_os_error()));
        }
        drop(fd);

        debug!(name = %name, size, created, "mapped shared memory segment");
        Ok(Self {
            ptr: ptr.cast(),
            size,
            name,
            created,
        })
    }

    /// Remove `name` from the shared-memory namespace. A missing segment is
    /// not an error.
    pub fn unlink(name: &str) -> Result<()> {
        let name = normalize_name(name)?;
        let c_name = CString::new(name.as_str()).map_err(|_| ShmError::InvalidName(name.clone()))?;

        // SAFETY: c_name is a valid C string; shm_unlink touches no memory.
        let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(ShmError::SegmentOpen(err));
            }
        }
        Ok(())
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Normalised name, with its leading `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when this handle created the segment.
    pub fn created(&self) -> bool {
        self.created
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: ptr and size come from the successful mmap in
        // open_or_create and are unmapped exactly once.
        unsafe {
            libc::munmap(self.ptr.cast(), self.size);
        }
    }
}

impl std::fmt::Debug for ShmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmSegment")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("created", &self.created)
            .finish()
    }
}

/// Prefix `/` when missing and check POSIX naming rules.
pub(crate) fn normalize_name(name: &str) -> Result<String> {
    let name = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if name.len() == 1 {
        return Err(ShmError::InvalidName("segment name is empty".to_string()));
    }
    if name[1..].contains('/') {
        return Err(ShmError::InvalidName(format!(
            "segment name cannot contain '/' after prefix: {name}"
        )));
    }
    if name.len() > 255 {
        return Err(ShmError::InvalidName(format!(
            "segment name too long (max 255): {name}"
        )));
    }
    Ok(name)
}

fn open_fd(c_name: &CString) -> Result<(OwnedFd, bool)> {
    // SAFETY: c_name is a valid C string; the result is checked below.
    let fd = unsafe {
        libc::shm_open(
            c_name.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        )
    };
    if fd >= 0 {
        // SAFETY: fd was just returned by shm_open and is owned by nobody else.
        return Ok((unsafe { OwnedFd::from_raw_fd(fd) }, true));
    }

    let err = io::Error::last_os_error();
    if err.kind() != io::ErrorKind::AlreadyExists {
        return Err(ShmError::SegmentOpen(err));
    }

    // SAFETY: as above, without O_CREAT the mode is ignored.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
    if fd < 0 {
        return Err(ShmError::SegmentOpen(io::Error::last_os_error()));
    }
    // SAFETY: fd was just returned by shm_open and is owned by nobody else.
    Ok((unsafe { OwnedFd::from_raw_fd(fd) }, false))
}

fn segment_len(fd: &OwnedFd) -> Result<usize> {
    // SAFETY: zeroed is a valid bit pattern for the plain-data stat struct.
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fd is open and stat points to writable memory of the right type.
    let ret = unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) };
    if ret < 0 {
        return Err(ShmError::SegmentOpen(io::Error::last_os_error()));
    }
    Ok(usize::try_from(stat.st_size).unwrap_or(0))
}
