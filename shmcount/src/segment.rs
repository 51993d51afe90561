//! Shared memory segment: allocation, mapping and locked access

use crate::error::{ShmError, ShmResult};
use crate::layout::{CounterHeader, HEADER_SIZE, OFFSET_USER_DATA};
use crate::lock::{SegmentLock, SegmentLockGuard};
use crate::platform::{
    create_or_open_segment_file, init_segment_file, is_linked, map_segment, open_segment_file,
};
use common::config::CounterConfig;
use common::consts::{SEGMENT_MAX_SIZE, SEGMENT_PREFIX};
use memmap2::MmapRaw;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Path of the segment file for a rectified name.
pub fn segment_path(shm_dir: &Path, name: &str) -> PathBuf {
    shm_dir.join(format!("{SEGMENT_PREFIX}{name}"))
}

/// A mapped view of one named segment together with its lock.
///
/// Each value maps the segment independently; two values for the same
/// name, in one process or in several, share the bytes but not the view.
pub struct SharedSegment {
    /// Rectified segment name
    name: String,
    /// Backing file path
    path: PathBuf,
    /// Total mapped size (including header)
    size: usize,
    lock: SegmentLock,
    map: MmapRaw,
}

impl SharedSegment {
    /// Create or open the segment `name` and run `init` under its lock.
    ///
    /// The file is sized on first creation; an existing segment with a
    /// different size is rejected untouched. `init` runs in the same
    /// critical section that confirmed the mapping is the live segment, so
    /// a concurrent last detach unlinking the file cannot split attachers
    /// across two segments.
    pub fn create_or_open<T>(
        name: &str,
        config: &CounterConfig,
        init: impl FnOnce(&SegmentGuard<'_>) -> ShmResult<T>,
    ) -> ShmResult<(Self, T)> {
        config.validate()?;
        let path = segment_path(&config.shm_dir, name);
        let size = config.segment_size();

        loop {
            let Some(segment) = Self::map_sized(name, &path, size, config.permissions)? else {
                tracing::debug!("Segment {} was unlinked while attaching, retrying", name);
                continue;
            };

            let guard = segment.lock()?;
            if !segment.is_linked()? {
                continue;
            }
            let value = init(&guard)?;
            guard.unlock()?;

            return Ok((segment, value));
        }
    }

    /// Open an existing segment without creating or resizing it.
    pub fn open_existing(name: &str, shm_dir: &Path) -> ShmResult<Self> {
        let path = segment_path(shm_dir, name);
        let file = open_segment_file(&path).map_err(|e| ShmError::from_io(name, e))?;
        let lock = SegmentLock::new(name, file);

        let size = {
            let _guard = lock.lock()?;
            let len = lock.file().metadata()?.len();
            segment_len(len).ok_or(ShmError::InvalidSize {
                size: len as usize,
            })?
        };
        let map = map_segment(lock.file(), size).map_err(|e| ShmError::from_io(name, e))?;

        Ok(Self {
            name: name.to_string(),
            path,
            size,
            lock,
            map,
        })
    }

    /// Open the file at `path`, size it if new, and map it.
    ///
    /// Returns `None` if the opened file was unlinked before the lock was
    /// obtained.
    fn map_sized(name: &str, path: &Path, size: usize, mode: u32) -> ShmResult<Option<Self>> {
        let file = create_or_open_segment_file(path, mode).map_err(|e| ShmError::from_io(name, e))?;
        let lock = SegmentLock::new(name, file);

        {
            let _guard = lock.lock()?;
            if !is_linked(lock.file(), path)? {
                return Ok(None);
            }

            let len = lock.file().metadata()?.len();
            if len == 0 {
                init_segment_file(lock.file(), size as u64, mode)
                    .and_then(|()| lock.file().write_all_at(&CounterHeader::default().encode(), 0))
                    .map_err(|e| ShmError::from_io(name, e))?;
                tracing::debug!("Created segment {} ({} bytes, mode {:#o})", name, size, mode);
            } else if len != size as u64 {
                return Err(ShmError::SizeMismatch {
                    name: name.to_string(),
                    expected: size,
                    actual: len,
                });
            }
        }

        let map = map_segment(lock.file(), size).map_err(|e| ShmError::from_io(name, e))?;
        Ok(Some(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            size,
            lock,
            map,
        }))
    }

    /// Acquire the segment lock.
    pub fn lock(&self) -> ShmResult<SegmentGuard<'_>> {
        Ok(SegmentGuard {
            segment: self,
            guard: self.lock.lock()?,
        })
    }

    /// Whether this mapping is still the segment linked at its path.
    pub fn is_linked(&self) -> ShmResult<bool> {
        Ok(is_linked(self.lock.file(), &self.path)?)
    }

    /// Remove the segment file if it still refers to this segment.
    ///
    /// Must be called with the lock held so no attacher can race the check.
    pub(crate) fn unlink(&self, _guard: &SegmentGuard<'_>) -> ShmResult<()> {
        if self.is_linked()? {
            std::fs::remove_file(&self.path)?;
            tracing::debug!("Removed segment {}", self.name);
        }
        Ok(())
    }

    /// Rectified segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total segment size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// User-data size in bytes
    pub fn user_data_size(&self) -> usize {
        self.size - HEADER_SIZE
    }

    /// Pointer to the first user-data byte of this process's mapping
    pub fn user_data_ptr(&self) -> *mut u8 {
        unsafe { self.map.as_mut_ptr().add(OFFSET_USER_DATA) }
    }
}

fn segment_len(len: u64) -> Option<usize> {
    let len = usize::try_from(len).ok()?;
    (HEADER_SIZE..=SEGMENT_MAX_SIZE).contains(&len).then_some(len)
}

/// Locked access to a segment's header and user data.
///
/// Holding a guard blocks every other attach, detach, accessor and lock of
/// the same segment in every process. Nested guards on the same thread and
/// the same mapping are allowed.
pub struct SegmentGuard<'a> {
    segment: &'a SharedSegment,
    guard: SegmentLockGuard<'a>,
}

impl SegmentGuard<'_> {
    /// Copy the header out of the segment.
    pub fn read_header(&self) -> CounterHeader {
        let mut bytes = [0u8; HEADER_SIZE];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.segment.map.as_ptr(),
                bytes.as_mut_ptr(),
                HEADER_SIZE,
            );
        }
        CounterHeader::decode(&bytes)
    }

    /// Write the header into the segment.
    pub(crate) fn write_header(&self, header: &CounterHeader) {
        let bytes = header.encode();
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.segment.map.as_mut_ptr(), HEADER_SIZE);
        }
    }

    /// Live instance count.
    pub fn instance_count(&self) -> u32 {
        self.read_header().instance_count
    }

    /// Creator process id, or `NO_CREATOR_PID`.
    pub fn creator_pid(&self) -> u32 {
        self.read_header().creator_pid
    }

    /// Creation time in days since the Unix epoch.
    pub fn creation_time(&self) -> f64 {
        self.read_header().creation_time
    }

    /// Last attach time in days since the Unix epoch.
    pub fn last_access_time(&self) -> f64 {
        self.read_header().last_access_time
    }

    /// User-data size in bytes.
    pub fn user_data_size(&self) -> usize {
        self.segment.user_data_size()
    }

    /// Pointer to the first user-data byte.
    pub fn user_data_ptr(&self) -> *mut u8 {
        self.segment.user_data_ptr()
    }

    /// Copy `buf.len()` user-data bytes starting at `offset` into `buf`.
    pub fn read_user_data(&self, offset: usize, buf: &mut [u8]) -> ShmResult<()> {
        self.check_range(offset, buf.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.segment.user_data_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Copy `data` into the user-data region starting at `offset`.
    pub fn write_user_data(&self, offset: usize, data: &[u8]) -> ShmResult<()> {
        self.check_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.segment.user_data_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Release the lock, reporting a failed release.
    pub fn unlock(self) -> ShmResult<()> {
        self.guard.unlock()
    }

    fn check_range(&self, offset: usize, len: usize) -> ShmResult<()> {
        let size = self.user_data_size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(ShmError::InvalidRange { offset, len, size }),
        }
    }
}
