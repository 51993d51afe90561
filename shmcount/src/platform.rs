//! Platform layer: segment files, mappings, the file lock and process ids

pub mod linux;

pub use linux::*;
