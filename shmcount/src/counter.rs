//! Cross-process instance counter

use crate::clock::now_days;
use crate::error::ShmResult;
use crate::layout::CounterHeader;
use crate::name::rectify;
use crate::platform::get_current_pid;
use crate::segment::{SegmentGuard, SharedSegment};
use common::config::CounterConfig;
use common::consts::NO_CREATOR_PID;
use std::path::Path;

/// One live attachment to a named counter segment.
///
/// Creating a `SharedCounter` increments the segment's instance count;
/// dropping (or [`close`](Self::close)-ing) it decrements the count once.
/// All header reads and writes happen under the segment lock, which is
/// also handed to callers through [`lock`](Self::lock) to protect the
/// user-data region.
///
/// # Example
///
/// ```rust,no_run
/// use shmcount::SharedCounter;
///
/// # fn main() -> Result<(), shmcount::ShmError> {
/// let counter = SharedCounter::create("my-app")?;
/// if counter.initial_count() > 0 {
///     println!("{} other instance(s) already running", counter.initial_count());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SharedCounter {
    segment: SharedSegment,
    initial_count: u32,
    remove_on_last_detach: bool,
    detached: bool,
}

impl SharedCounter {
    /// Attach to `identifier` in the default shm directory with the default
    /// user-data size.
    pub fn create(identifier: &str) -> ShmResult<Self> {
        Self::create_with(identifier, &CounterConfig::default())
    }

    /// Attach to `identifier` using `config`.
    ///
    /// Atomically under the segment lock: creates or opens the segment,
    /// records the pre-attach count, increments it, stamps the access time
    /// and, on the 0 → 1 transition, records this process as creator with
    /// the same creation time.
    pub fn create_with(identifier: &str, config: &CounterConfig) -> ShmResult<Self> {
        let name = rectify(identifier)?;
        let pid = get_current_pid();

        let (segment, initial_count) = SharedSegment::create_or_open(&name, config, |guard| {
            let mut header = guard.read_header();
            let initial_count = header.instance_count;

            header.instance_count = initial_count.wrapping_add(1);
            header.last_access_time = now_days();
            if header.instance_count == 1 {
                header.creator_pid = pid;
                header.creation_time = header.last_access_time;
            }
            guard.write_header(&header);

            Ok(initial_count)
        })?;

        tracing::debug!(
            "Attached to {} (pid {}, initial count {})",
            name,
            pid,
            initial_count
        );

        Ok(Self {
            segment,
            initial_count,
            remove_on_last_detach: config.remove_on_last_detach,
            detached: false,
        })
    }

    /// Detach now, reporting lock or removal failures.
    ///
    /// Dropping the counter performs the same detach but can only log
    /// failures.
    pub fn close(mut self) -> ShmResult<()> {
        self.detach()
    }

    fn detach(&mut self) -> ShmResult<()> {
        if self.detached {
            return Ok(());
        }
        self.detached = true;

        let pid = get_current_pid();
        let guard = self.segment.lock()?;
        let mut header = guard.read_header();
        header.instance_count = header.instance_count.wrapping_sub(1);
        if header.creator_pid == pid {
            header.creator_pid = NO_CREATOR_PID;
            tracing::debug!("Creator {} left {}", pid, self.segment.name());
        }
        guard.write_header(&header);

        if header.instance_count == 0 && self.remove_on_last_detach {
            self.segment.unlink(&guard)?;
        }
        guard.unlock()?;

        tracing::debug!(
            "Detached from {} (pid {}, remaining {})",
            self.segment.name(),
            pid,
            header.instance_count
        );
        Ok(())
    }

    /// Acquire the segment lock for caller-defined work on the user data.
    ///
    /// While the guard lives, every attach, detach and locked accessor on
    /// this identifier blocks, in this process and all others. Accessors of
    /// this same `SharedCounter` may still be called from the holding
    /// thread; accessors of a *different* `SharedCounter` for the same
    /// identifier deadlock.
    pub fn lock(&self) -> ShmResult<SegmentGuard<'_>> {
        self.segment.lock()
    }

    /// Increment the count without attaching. Returns the previous value.
    ///
    /// Unchecked: the count wraps at `u32::MAX`.
    pub fn increment_count(&self) -> ShmResult<u32> {
        self.adjust_count(u32::wrapping_add)
    }

    /// Decrement the count without detaching. Returns the previous value.
    ///
    /// Unchecked: decrementing zero wraps to `u32::MAX`.
    pub fn decrement_count(&self) -> ShmResult<u32> {
        self.adjust_count(u32::wrapping_sub)
    }

    fn adjust_count(&self, op: fn(u32, u32) -> u32) -> ShmResult<u32> {
        let guard = self.segment.lock()?;
        let mut header = guard.read_header();
        let previous = header.instance_count;
        header.instance_count = op(previous, 1);
        guard.write_header(&header);
        guard.unlock()?;
        Ok(previous)
    }

    /// Locked snapshot of the whole header.
    pub fn header(&self) -> ShmResult<CounterHeader> {
        self.read_locked(|guard| guard.read_header())
    }

    /// Locked snapshot of the live instance count.
    pub fn instance_count(&self) -> ShmResult<u32> {
        self.read_locked(|guard| guard.instance_count())
    }

    /// Locked snapshot of the creator pid (`NO_CREATOR_PID` if none).
    pub fn creator_pid(&self) -> ShmResult<u32> {
        self.read_locked(|guard| guard.creator_pid())
    }

    /// Locked snapshot of the creation time (days since Unix epoch).
    pub fn creation_time(&self) -> ShmResult<f64> {
        self.read_locked(|guard| guard.creation_time())
    }

    /// Locked snapshot of the last attach time (days since Unix epoch).
    pub fn last_access_time(&self) -> ShmResult<f64> {
        self.read_locked(|guard| guard.last_access_time())
    }

    /// Pointer to this process's view of the user-data region.
    ///
    /// Writing through it is only sound while holding [`lock`](Self::lock)
    /// and staying within [`shared_user_data_size`](Self::shared_user_data_size)
    /// bytes.
    pub fn shared_user_data_ptr(&self) -> ShmResult<*mut u8> {
        self.read_locked(|guard| guard.user_data_ptr())
    }

    /// Size of the user-data region. Fixed for the segment's lifetime.
    pub fn shared_user_data_size(&self) -> usize {
        self.segment.user_data_size()
    }

    /// Rectified identifier naming the segment.
    pub fn identifier(&self) -> &str {
        self.segment.name()
    }

    /// Backing file of the segment.
    pub fn path(&self) -> &Path {
        self.segment.path()
    }

    /// Instance count observed just before this attach.
    pub fn initial_count(&self) -> u32 {
        self.initial_count
    }

    /// Whether this process is the recorded creator.
    pub fn is_creator(&self) -> ShmResult<bool> {
        Ok(self.creator_pid()? == get_current_pid())
    }

    fn read_locked<T>(&self, read: impl FnOnce(&SegmentGuard<'_>) -> T) -> ShmResult<T> {
        let guard = self.segment.lock()?;
        let value = read(&guard);
        guard.unlock()?;
        Ok(value)
    }
}

impl Drop for SharedCounter {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            tracing::warn!("Failed to detach from {}: {}", self.segment.name(), e);
        }
    }
}

impl std::fmt::Debug for SharedCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCounter")
            .field("identifier", &self.segment.name())
            .field("initial_count", &self.initial_count)
            .finish_non_exhaustive()
    }
}
