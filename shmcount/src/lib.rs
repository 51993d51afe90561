//! # shmcount: Cross-Process Instance Counter
//!
//! Lets unrelated processes that share an identifier agree on how many live
//! instances of a logical slot exist, which process created the slot, when
//! it was created and last attached, and share a small fixed-size block of
//! caller-defined bytes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────────────┐    ┌─────────────────┐
//! │   Process A     │    │  /dev/shm/shmcount_<id>  │    │   Process B     │
//! │                 │    │                          │    │                 │
//! │ SharedCounter   ├───►│ [Header 64B | User Data] │◄───┤ SharedCounter   │
//! │                 │    │                          │    │                 │
//! └─────────────────┘    │  flock = segment lock    │    └─────────────────┘
//!                        └──────────────────────────┘
//! ```
//!
//! Every [`SharedCounter`] maps the segment on its own. The header
//! (instance count, creator pid, creation and last-access time) is only
//! touched while holding the segment lock, and the same lock is handed to
//! callers through [`SharedCounter::lock`] for their user data.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shmcount::{SharedCounter, ShmResult};
//!
//! # fn main() -> ShmResult<()> {
//! let counter = SharedCounter::create("render-farm")?;
//! println!(
//!     "instance #{} of {}",
//!     counter.initial_count() + 1,
//!     counter.instance_count()?
//! );
//!
//! // Publish a status word to every other instance.
//! let guard = counter.lock()?;
//! guard.write_user_data(0, &42u32.to_le_bytes())?;
//! guard.unlock()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ShmError>`; [`ShmError::kind`] tells
//! segment failures from lock failures:
//!
//! ```rust,no_run
//! use shmcount::{ErrorKind, SharedCounter};
//!
//! match SharedCounter::create("slot") {
//!     Ok(counter) => { /* use counter */ }
//!     Err(e) if e.kind() == ErrorKind::Segment => {
//!         eprintln!("cannot allocate counter segment: {e}");
//!     }
//!     Err(e) => eprintln!("cannot determine instance count: {e}"),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! - **SharedCounter**: `Send + Sync`; the segment lock serializes threads
//!   and processes alike.
//! - **SegmentGuard**: bound to the locking thread. Nested locking on the
//!   same `SharedCounter` from that thread is allowed; locking a second
//!   `SharedCounter` for the same identifier while holding a guard
//!   deadlocks.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod counter;
pub mod error;
pub mod inspect;
pub mod layout;
pub mod lock;
pub mod name;
pub mod platform;
pub mod segment;

pub use common::config::CounterConfig;
pub use common::consts::NO_CREATOR_PID;
pub use counter::SharedCounter;
pub use error::{ErrorKind, ShmError, ShmResult};
pub use inspect::{SegmentDiscovery, SegmentInfo};
pub use layout::{CounterHeader, HEADER_SIZE};
pub use name::rectify;
pub use segment::{SegmentGuard, SharedSegment};

/// Install a stderr `tracing` subscriber for attach and detach diagnostics.
///
/// `RUST_LOG` takes precedence; `default_directive` (for example
/// `"shmcount=debug"`) applies when it is unset or invalid. Does nothing if
/// a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init();
}
