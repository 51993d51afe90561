//! Segment discovery and read-only inspection
//!
//! Reads counter headers without attaching, so the instance count and
//! access time are left as they are.

use crate::error::{ShmError, ShmResult};
use crate::name::{rectify, unrectify};
use crate::platform::is_process_alive;
use crate::segment::SharedSegment;
use common::config::CounterConfig;
use common::consts::SEGMENT_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot of one counter segment
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// Rectified identifier
    pub identifier: String,
    /// Identifier decoded back from its rectified form
    pub name: String,
    /// Backing file path
    pub path: PathBuf,
    /// Total segment size in bytes
    pub segment_size: usize,
    /// User-data size in bytes
    pub user_data_size: usize,
    /// Live instance count
    pub instance_count: u32,
    /// Creator process, if one is recorded
    pub creator_pid: Option<u32>,
    /// Whether the creator process is still running
    pub creator_alive: bool,
    /// Creation time in days since the Unix epoch
    pub creation_time: f64,
    /// Last attach time in days since the Unix epoch
    pub last_access_time: f64,
}

/// Segment discovery over one shm directory
pub struct SegmentDiscovery {
    config: CounterConfig,
}

impl SegmentDiscovery {
    /// Create a discovery service for the segments described by `config`
    pub fn new(config: CounterConfig) -> Self {
        Self { config }
    }

    /// List all counter segments in the shm directory, newest first
    pub fn list_segments(&self) -> ShmResult<Vec<SegmentInfo>> {
        let mut segments = Vec::new();

        let entries = match std::fs::read_dir(&self.config.shm_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(segments),
            Err(e) => return Err(ShmError::Io { source: e }),
        };

        for entry in entries.flatten() {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(identifier) = file_name.strip_prefix(SEGMENT_PREFIX) else {
                continue;
            };

            match self.inspect_rectified(identifier) {
                Ok(info) => segments.push(info),
                // Vanished or foreign files are not counters.
                Err(e) => tracing::debug!("Skipping {}: {}", file_name, e),
            }
        }

        segments.sort_by(|a, b| b.creation_time.total_cmp(&a.creation_time));
        Ok(segments)
    }

    /// Find a segment by the identifier callers attach with
    pub fn find_segment(&self, identifier: &str) -> ShmResult<Option<SegmentInfo>> {
        match self.inspect(identifier) {
            Ok(info) => Ok(Some(info)),
            Err(ShmError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Inspect the segment an attach of `identifier` would use
    pub fn inspect(&self, identifier: &str) -> ShmResult<SegmentInfo> {
        self.inspect_rectified(&rectify(identifier)?)
    }

    /// Inspect a segment by its already-rectified identifier
    pub fn inspect_rectified(&self, identifier: &str) -> ShmResult<SegmentInfo> {
        let name = unrectify(identifier).ok_or_else(|| ShmError::InvalidName {
            name: identifier.to_string(),
            reason: "not a rectified identifier",
        })?;

        let segment = SharedSegment::open_existing(identifier, &self.config.shm_dir)?;
        let guard = segment.lock()?;
        let header = guard.read_header();
        guard.unlock()?;

        let creator_pid = header.has_creator().then_some(header.creator_pid);
        Ok(SegmentInfo {
            identifier: identifier.to_string(),
            name,
            path: segment.path().to_path_buf(),
            segment_size: segment.size(),
            user_data_size: segment.user_data_size(),
            instance_count: header.instance_count,
            creator_pid,
            creator_alive: creator_pid.is_some_and(is_process_alive),
            creation_time: header.creation_time,
            last_access_time: header.last_access_time,
        })
    }
}

impl Default for SegmentDiscovery {
    fn default() -> Self {
        Self::new(CounterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::SharedCounter;
    use tempfile::TempDir;

    fn discovery(dir: &TempDir) -> SegmentDiscovery {
        SegmentDiscovery::new(CounterConfig {
            shm_dir: dir.path().to_path_buf(),
            ..CounterConfig::default()
        })
    }

    #[test]
    fn inspect_does_not_attach() {
        let dir = TempDir::new().unwrap();
        let discovery = discovery(&dir);
        let counter = SharedCounter::create_with("Watched", &discovery.config).unwrap();
        let before = counter.header().unwrap();

        let info = discovery.inspect("WATCHED").unwrap();
        assert_eq!(info.identifier, "watched");
        assert_eq!(info.instance_count, 1);
        assert_eq!(info.creator_pid, Some(std::process::id()));
        assert!(info.creator_alive);
        assert_eq!(info.last_access_time, before.last_access_time);
        assert_eq!(counter.instance_count().unwrap(), 1);
    }

    #[test]
    fn list_finds_only_counter_segments() {
        let dir = TempDir::new().unwrap();
        let discovery = discovery(&dir);
        let _a = SharedCounter::create_with("alpha", &discovery.config).unwrap();
        let _b = SharedCounter::create_with("a/b", &discovery.config).unwrap();
        std::fs::write(dir.path().join("unrelated"), b"x").unwrap();
        std::fs::write(dir.path().join("shmcount_tiny"), b"x").unwrap();

        let segments = discovery.list_segments().unwrap();
        let mut names: Vec<_> = segments.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        assert_eq!(names, ["a/b", "alpha"]);
        assert!(segments.iter().any(|s| s.identifier == "a%2Fb"));
    }

    #[test]
    fn info_serializes_to_json() {
        let dir = TempDir::new().unwrap();
        let discovery = discovery(&dir);
        let _counter = SharedCounter::create_with("json", &discovery.config).unwrap();

        let info = discovery.inspect("json").unwrap();
        let text = serde_json::to_string(&info).unwrap();
        assert!(text.contains("\"instance_count\":1"));
        let back: SegmentInfo = serde_json::from_str(&text).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn find_missing_segment_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(discovery(&dir).find_segment("nobody").unwrap(), None);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let discovery = SegmentDiscovery::new(CounterConfig {
            shm_dir: PathBuf::from("/nonexistent/shmcount"),
            ..CounterConfig::default()
        });
        assert!(discovery.list_segments().unwrap().is_empty());
    }
}
