//! Segment lock
//!
//! One exclusive lock per attached segment, shared by the header
//! bookkeeping and by callers protecting their user data. It combines:
//!
//! - a `flock` on the segment file, which excludes every other open
//!   descriptor of the segment in this or any other process, and
//! - a re-entrant in-process mutex, which serializes threads sharing one
//!   descriptor and lets the owning thread nest acquisitions.
//!
//! The `flock` is taken on the outermost acquisition and released when the
//! outermost guard goes away.

use crate::error::{ShmError, ShmResult};
use crate::platform::{lock_file, unlock_file};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::fs::File;

/// Exclusive lock bound to one open segment file.
pub struct SegmentLock {
    name: String,
    file: File,
    depth: ReentrantMutex<Cell<u32>>,
}

impl SegmentLock {
    /// Wrap an open segment file.
    pub fn new(name: impl Into<String>, file: File) -> Self {
        Self {
            name: name.into(),
            file,
            depth: ReentrantMutex::new(Cell::new(0)),
        }
    }

    /// The locked file.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Block until the lock is held by the calling thread.
    ///
    /// Re-entrant: a thread already holding the lock gets a nested guard
    /// immediately.
    pub fn lock(&self) -> ShmResult<SegmentLockGuard<'_>> {
        let depth = self.depth.lock();
        if depth.get() == 0 {
            lock_file(&self.file).map_err(|source| ShmError::Lock {
                name: self.name.clone(),
                source,
            })?;
        }
        depth.set(depth.get() + 1);

        Ok(SegmentLockGuard {
            lock: self,
            depth,
            released: false,
        })
    }

    /// Whether the calling thread currently holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.depth.is_owned_by_current_thread()
    }
}

/// RAII guard for [`SegmentLock`].
///
/// Dropping the guard releases the lock and logs a release failure;
/// [`SegmentLockGuard::unlock`] reports it instead.
pub struct SegmentLockGuard<'a> {
    lock: &'a SegmentLock,
    depth: ReentrantMutexGuard<'a, Cell<u32>>,
    released: bool,
}

impl SegmentLockGuard<'_> {
    /// Release the lock, reporting a failed `flock` release.
    pub fn unlock(mut self) -> ShmResult<()> {
        self.released = true;
        self.release()
    }

    fn release(&self) -> ShmResult<()> {
        let remaining = self.depth.get() - 1;
        self.depth.set(remaining);
        if remaining == 0 {
            unlock_file(&self.lock.file).map_err(|source| ShmError::Lock {
                name: self.lock.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl Drop for SegmentLockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release() {
                tracing::warn!("Failed to release segment lock: {}", e);
            }
        }
    }
}
