//! Linux-specific shared memory operations
//!
//! Segments are files on a tmpfs (normally `/dev/shm`) mapped `MAP_SHARED`.
//! The segment lock is a `flock(2)` exclusive lock on the segment file; the
//! kernel drops it when the holding process dies.

use memmap2::{MmapOptions, MmapRaw};
use nix::errno::Errno;
use nix::unistd::getpid;
use std::fs::{File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Open the segment file, creating it empty if it does not exist.
pub fn create_or_open_segment_file(path: &Path, mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .mode(mode)
        .open(path)
}

/// Size a freshly created segment file and apply its mode.
///
/// The mode passed to `open(2)` is masked by the umask; setting it again
/// here makes `mode` the exact permission bits of the segment.
pub fn init_segment_file(file: &File, size: u64, mode: u32) -> io::Result<()> {
    file.set_len(size)?;
    file.set_permissions(Permissions::from_mode(mode))
}

/// Open an existing segment file.
pub fn open_segment_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// Whether `file` is still the file linked at `path`.
///
/// A last detach may unlink the segment while another process holds an
/// open descriptor to it; such a descriptor refers to a dead segment.
pub fn is_linked(file: &File, path: &Path) -> io::Result<bool> {
    let open = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(linked) => Ok(open.dev() == linked.dev() && open.ino() == linked.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Map `size` bytes of the segment file shared and writable.
pub fn map_segment(file: &File, size: usize) -> io::Result<MmapRaw> {
    MmapOptions::new().len(size).map_raw(file)
}

/// Block until an exclusive `flock` is held on `file`.
pub fn lock_file(file: &File) -> Result<(), Errno> {
    flock(file, libc::LOCK_EX)
}

/// Release the `flock` held on `file`.
pub fn unlock_file(file: &File) -> Result<(), Errno> {
    flock(file, libc::LOCK_UN)
}

fn flock(file: &File, operation: libc::c_int) -> Result<(), Errno> {
    loop {
        let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
        match Errno::result(ret) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    // Use a null signal (None) to test for process existence without sending a signal
    match kill(Pid::from_raw(raw), None) {
        Ok(_) => true,
        Err(Errno::ESRCH) => false, // No such process
        Err(Errno::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
