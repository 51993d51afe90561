//! System-wide constants for the shmcount workspace.
//!
//! Single source of truth for segment sizes, naming and sentinel values.
//! Imported by all crates; constants are defined here only.

/// Minimum total segment size in bytes (one memory page).
pub const SEGMENT_MIN_SIZE: usize = 4096;

/// Maximum total segment size in bytes (1 GiB).
pub const SEGMENT_MAX_SIZE: usize = 1_073_741_824;

/// Size of the fixed counter header placed at offset 0 of every segment.
pub const COUNTER_HEADER_SIZE: usize = 64;

/// Default user-data size, chosen so the whole segment fills exactly one page.
pub const DEFAULT_USER_DATA_SIZE: usize = SEGMENT_MIN_SIZE - COUNTER_HEADER_SIZE;

/// `creator_pid` value meaning "no creator currently recorded".
pub const NO_CREATOR_PID: u32 = u32::MAX;

/// Directory backing POSIX shared memory on Linux.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Prefix of every counter segment file inside the shm directory.
pub const SEGMENT_PREFIX: &str = "shmcount_";

/// Longest file name accepted by the shm filesystem (`NAME_MAX`).
pub const MAX_SEGMENT_FILE_NAME: usize = 255;

/// Longest rectified identifier that still fits behind [`SEGMENT_PREFIX`].
pub const MAX_IDENTIFIER_LEN: usize = MAX_SEGMENT_FILE_NAME - SEGMENT_PREFIX.len();

/// Default file mode for newly created segments (owner read/write).
pub const DEFAULT_SEGMENT_PERMISSIONS: u32 = 0o600;

/// Default configuration file path for the CLI.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/shmcount/config.toml";

static_assertions::const_assert!(COUNTER_HEADER_SIZE < SEGMENT_MIN_SIZE);
static_assertions::const_assert!(SEGMENT_MIN_SIZE < SEGMENT_MAX_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_segment_fills_one_page() {
        assert_eq!(DEFAULT_USER_DATA_SIZE + COUNTER_HEADER_SIZE, SEGMENT_MIN_SIZE);
    }

    #[test]
    fn identifier_fits_behind_prefix() {
        assert_eq!(SEGMENT_PREFIX.len() + MAX_IDENTIFIER_LEN, MAX_SEGMENT_FILE_NAME);
    }

    #[test]
    fn sentinel_is_u32_max() {
        assert_eq!(NO_CREATOR_PID, 0xFFFF_FFFF);
    }
}
