//! Counter header layout
//!
//! Every segment starts with a fixed 64-byte header followed by the
//! user-data region. The header is never accessed through a Rust struct
//! laid over the mapping; it is copied out and decoded field by field so
//! that processes built by different compilers agree on every byte.
//!
//! ```text
//! offset  size  field
//!      0     4  instance_count     u32, little-endian
//!      4     4  creator_pid        u32, little-endian (0xFFFFFFFF = none)
//!      8     8  creation_time      f64, days since Unix epoch
//!     16     8  last_access_time   f64, days since Unix epoch
//!     24    40  reserved           zero on creation, preserved on write
//!     64     -  user data          remainder of the segment
//! ```

use common::consts::{COUNTER_HEADER_SIZE, NO_CREATOR_PID};
use static_assertions::const_assert_eq;

/// Offset of `instance_count`.
pub const OFFSET_INSTANCE_COUNT: usize = 0;
/// Offset of `creator_pid`.
pub const OFFSET_CREATOR_PID: usize = 4;
/// Offset of `creation_time`.
pub const OFFSET_CREATION_TIME: usize = 8;
/// Offset of `last_access_time`.
pub const OFFSET_LAST_ACCESS_TIME: usize = 16;
/// Offset of the reserved padding.
pub const OFFSET_RESERVED: usize = 24;
/// Size of the reserved padding.
pub const RESERVED_SIZE: usize = 40;
/// Offset of the first user-data byte.
pub const OFFSET_USER_DATA: usize = OFFSET_RESERVED + RESERVED_SIZE;
/// Total header size.
pub const HEADER_SIZE: usize = COUNTER_HEADER_SIZE;

const_assert_eq!(OFFSET_CREATOR_PID, OFFSET_INSTANCE_COUNT + 4);
const_assert_eq!(OFFSET_CREATION_TIME, OFFSET_CREATOR_PID + 4);
const_assert_eq!(OFFSET_LAST_ACCESS_TIME, OFFSET_CREATION_TIME + 8);
const_assert_eq!(OFFSET_RESERVED, OFFSET_LAST_ACCESS_TIME + 8);
const_assert_eq!(OFFSET_USER_DATA, HEADER_SIZE);

/// Decoded copy of a segment header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterHeader {
    /// Live instances attached to the segment.
    pub instance_count: u32,
    /// Process that drove the count from 0 to 1, or [`NO_CREATOR_PID`].
    pub creator_pid: u32,
    /// Set on the 0 → 1 transition only.
    pub creation_time: f64,
    /// Overwritten on every attach.
    pub last_access_time: f64,
    /// Reserved for future fields.
    pub reserved: [u8; RESERVED_SIZE],
}

/// Header written when a segment file is first sized.
impl Default for CounterHeader {
    fn default() -> Self {
        Self {
            instance_count: 0,
            creator_pid: NO_CREATOR_PID,
            creation_time: 0.0,
            last_access_time: 0.0,
            reserved: [0; RESERVED_SIZE],
        }
    }
}

impl CounterHeader {
    /// Decode a header from its on-segment bytes.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut reserved = [0u8; RESERVED_SIZE];
        reserved.copy_from_slice(&bytes[OFFSET_RESERVED..OFFSET_USER_DATA]);

        Self {
            instance_count: u32::from_le_bytes(field(bytes, OFFSET_INSTANCE_COUNT)),
            creator_pid: u32::from_le_bytes(field(bytes, OFFSET_CREATOR_PID)),
            creation_time: f64::from_le_bytes(field(bytes, OFFSET_CREATION_TIME)),
            last_access_time: f64::from_le_bytes(field(bytes, OFFSET_LAST_ACCESS_TIME)),
            reserved,
        }
    }

    /// Encode the header into its on-segment bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[OFFSET_INSTANCE_COUNT..OFFSET_CREATOR_PID]
            .copy_from_slice(&self.instance_count.to_le_bytes());
        bytes[OFFSET_CREATOR_PID..OFFSET_CREATION_TIME]
            .copy_from_slice(&self.creator_pid.to_le_bytes());
        bytes[OFFSET_CREATION_TIME..OFFSET_LAST_ACCESS_TIME]
            .copy_from_slice(&self.creation_time.to_le_bytes());
        bytes[OFFSET_LAST_ACCESS_TIME..OFFSET_RESERVED]
            .copy_from_slice(&self.last_access_time.to_le_bytes());
        bytes[OFFSET_RESERVED..OFFSET_USER_DATA].copy_from_slice(&self.reserved);
        bytes
    }

    /// Whether a creator process is currently recorded.
    #[inline]
    pub fn has_creator(&self) -> bool {
        self.creator_pid != NO_CREATOR_PID
    }
}

fn field<const N: usize>(bytes: &[u8; HEADER_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_land_on_documented_offsets() {
        let header = CounterHeader {
            instance_count: 0x0403_0201,
            creator_pid: 0x0807_0605,
            creation_time: 1.5,
            last_access_time: 2.25,
            reserved: [0xEE; RESERVED_SIZE],
        };
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..8], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[8..16], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[16..24], &2.25f64.to_le_bytes());
        assert!(bytes[24..64].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn decode_reads_foreign_bytes() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&3u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&NO_CREATOR_PID.to_le_bytes());
        bytes[8..16].copy_from_slice(&20000.0f64.to_le_bytes());
        bytes[16..24].copy_from_slice(&20001.5f64.to_le_bytes());
        bytes[30] = 0x7F;

        let header = CounterHeader::decode(&bytes);
        assert_eq!(header.instance_count, 3);
        assert!(!header.has_creator());
        assert_eq!(header.creation_time, 20000.0);
        assert_eq!(header.last_access_time, 20001.5);
        assert_eq!(header.reserved[6], 0x7F);
        assert_eq!(header.encode(), bytes);
    }

    #[test]
    fn default_header_records_no_creator() {
        let header = CounterHeader::default();
        assert_eq!(header.instance_count, 0);
        assert!(!header.has_creator());
        assert_eq!(&header.encode()[4..8], &[0xFF; 4]);
        assert!(header.encode()[8..].iter().all(|&b| b == 0));
    }
}
