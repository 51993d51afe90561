//! shmcount Common Library
//!
//! Shared constants and configuration loading utilities for the shmcount
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Segment sizes, naming and sentinel values
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with an alias for shorter imports:
//! ```toml
//! [dependencies]
//! common = { package = "shmcount_common", path = "../shmcount_common" }
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
