//! Identifier rectification
//!
//! Turns a caller-supplied identifier into a name usable as a file in the
//! shm directory. The mapping is deterministic and case-insensitive:
//! input is lowercased, then every byte outside `[a-z0-9._-]` is written
//! as `%XX` (uppercase hex of the UTF-8 byte). `%` itself is escaped, so
//! distinct lowercased inputs never collide.

use crate::error::{ShmError, ShmResult};
use common::consts::MAX_IDENTIFIER_LEN;
use std::fmt::Write;

/// Rectify `identifier` into a segment name.
///
/// # Errors
///
/// `ShmError::InvalidName` if the identifier is empty or its rectified
/// form exceeds [`MAX_IDENTIFIER_LEN`].
pub fn rectify(identifier: &str) -> ShmResult<String> {
    if identifier.is_empty() {
        return Err(ShmError::InvalidName {
            name: identifier.to_string(),
            reason: "identifier is empty",
        });
    }

    let lowered = identifier.to_lowercase();
    let mut rectified = String::with_capacity(lowered.len());
    for byte in lowered.bytes() {
        if is_safe(byte) {
            rectified.push(byte as char);
        } else {
            // Writing into a String cannot fail.
            let _ = write!(rectified, "%{byte:02X}");
        }
    }

    if rectified.len() > MAX_IDENTIFIER_LEN {
        return Err(ShmError::InvalidName {
            name: identifier.to_string(),
            reason: "rectified identifier exceeds the shm name limit",
        });
    }
    Ok(rectified)
}

/// Decode a rectified name back to its lowercased identifier.
///
/// Returns `None` for strings [`rectify`] could not have produced.
pub fn unrectify(rectified: &str) -> Option<String> {
    let bytes = rectified.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = rectified.get(i + 1..i + 3)?;
                if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F')) {
                    return None;
                }
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if is_safe(b) => {
                decoded.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(decoded).ok()
}

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'.' | b'-' | b'_')
}
