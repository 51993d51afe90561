//! Prelude module for common re-exports.
//!
//! ```rust
//! use shmcount_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, CounterConfig, LogLevel, SharedConfig};

// ─── Segment Constants ──────────────────────────────────────────────
pub use crate::consts::{
    COUNTER_HEADER_SIZE, DEFAULT_USER_DATA_SIZE, NO_CREATOR_PID, SEGMENT_MAX_SIZE,
    SEGMENT_MIN_SIZE,
};
