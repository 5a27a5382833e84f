//! Blackboard record shared between the physics engine and hardware models.

use std::io;
use std::marker::PhantomData;
use std::mem;

use serde::Serialize;

use super::segment::ShmSegment;
use crate::error::ShmError;

/// Spacecraft state published on the blackboard.
///
/// Field order and types are the shared-memory wire format: they must match
/// the writer byte for byte. Validity flags are C `int`s.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BlackboardState {
    pub qn: [f64; 4],
    pub wn: [f64; 3],
    pub svb: [f64; 3],
    pub bvb: [f64; 3],
    pub hvb: [f64; 3],
    pub whl_h: [f64; 3],
    pub gyro_rate: [f64; 3],
    pub mag_field: [f64; 3],
    pub css_valid: [i32; 6],
    pub css_illum: [f64; 6],
    pub fss_valid: i32,
    pub fss_sun_ang: [f64; 2],
    pub st_valid: i32,
    pub st_qn: [f64; 4],
    pub gps_valid: i32,
    pub gps_rollover: i32,
    pub gps_week: i32,
    pub gps_sec: f64,
    pub gps_pos_n: [f64; 3],
    pub gps_vel_n: [f64; 3],
    pub gps_pos_w: [f64; 3],
    pub gps_vel_w: [f64; 3],
    pub gps_lng: f64,
    pub gps_lat: f64,
    pub gps_alt: f64,
    pub accel_acc: [f64; 3],
}

/// Segment layout: the process-shared mutex, then the state it guards.
#[repr(C)]
struct Layout {
    mutex: libc::pthread_mutex_t,
    state: BlackboardState,
}

/// Size in bytes a blackboard segment is mapped with.
pub const BLACKBOARD_SIZE: usize = mem::size_of::<Layout>();

/// Mapped blackboard segment with its embedded mutex.
#[derive(Debug)]
pub(crate) struct Blackboard {
    segment: ShmSegment,
}

impl Blackboard {
    /// Open or create the blackboard called `name`.
    ///
    /// The handle that creates the segment also initialises the mutex, so
    /// the writer is expected to start before any reader.
    pub(crate) fn open(name: &str) -> Result<Self, ShmError> {
        let segment = ShmSegment::open_or_create(name, BLACKBOARD_SIZE)?;
        let board = Self { segment };
        if board.segment.created() {
            // SAFETY: the segment was just created by this handle, so no
            // other process uses the zero-filled mutex yet.
            unsafe { init_shared_mutex(board.mutex()) }.map_err(ShmError::MutexInit)?;
        }
        Ok(board)
    }

    pub(crate) fn name(&self) -> &str {
        self.segment.name()
    }

    pub(crate) fn created(&self) -> bool {
        self.segment.created()
    }

    /// Run `f` on the state while holding the segment mutex.
    pub(crate) fn with_locked<R>(
        &self,
        f: impl FnOnce(&mut BlackboardState) -> R,
    ) -> Result<R, ShmError> {
        let _guard = LockGuard::acquire(self)?;
        // SAFETY: the mapping is at least BLACKBOARD_SIZE bytes, page
        // aligned, and the mutex serialises every access to `state`.
        let state = unsafe { &mut (*self.layout()).state };
        Ok(f(state))
    }

    /// Copy of the whole state, taken under the mutex.
    pub(crate) fn read(&self) -> Result<BlackboardState, ShmError> {
        self.with_locked(|state| *state)
    }

    fn layout(&self) -> *mut Layout {
        self.segment.as_ptr().cast()
    }

    fn mutex(&self) -> *mut libc::pthread_mutex_t {
        // SAFETY: layout points into the live mapping; no reference is made.
        unsafe { std::ptr::addr_of_mut!((*self.layout()).mutex) }
    }
}

struct LockGuard<'a> {
    mutex: *mut libc::pthread_mutex_t,
    _board: PhantomData<&'a Blackboard>,
}

impl<'a> LockGuard<'a> {
    fn acquire(board: &'a Blackboard) -> Result<Self, ShmError> {
        let mutex = board.mutex();
        // SAFETY: mutex lives in the mapping owned by `board`, which outlives
        // the guard, and was initialised by the segment creator.
        let rc = unsafe { libc::pthread_mutex_lock(mutex) };
        if rc != 0 {
            return Err(ShmError::Lock(io::Error::from_raw_os_error(rc)));
        }
        Ok(Self {
            mutex,
            _board: PhantomData,
        })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard locked the mutex in acquire.
        unsafe {
            libc::pthread_mutex_unlock(self.mutex);
        }
    }
}

/// Initialise `mutex` as a process-shared mutex.
///
/// # Safety
///
/// `mutex` must point to writable memory not in use by any other thread or
/// process.
unsafe fn init_shared_mutex(mutex: *mut libc::pthread_mutex_t) -> io::Result<()> {
    let mut attr: libc::pthread_mutexattr_t = mem::zeroed();
    let rc = libc::pthread_mutexattr_init(&mut attr);
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    let mut rc = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    if rc == 0 {
        rc = libc::pthread_mutex_init(mutex, &attr);
    }
    libc::pthread_mutexattr_destroy(&mut attr);

    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}
