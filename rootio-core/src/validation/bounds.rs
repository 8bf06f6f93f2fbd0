//! Byte-range validation
//!
//! Pure arithmetic on offsets read from the file, with overflow protection.
//! Every pointer read from disk goes through here before it is used to slice
//! a buffer.

use crate::FormatError;

/// Validate that `[offset, offset + len)` lies within `size` bytes
///
/// Returns the range as `usize` bounds.
pub const fn check_span(offset: i64, len: i64, size: u64) -> Result<(usize, usize), FormatError> {
    if offset < 0 || len < 0 {
        return Err(FormatError::OutOfBounds);
    }
    let end = match (offset as u64).checked_add(len as u64) {
        Some(end) => end,
        None => return Err(FormatError::OutOfBounds),
    };
    if end > size {
        return Err(FormatError::OutOfBounds);
    }
    Ok((offset as usize, end as usize))
}

/// Validate an element count read from the wire against remaining bytes
///
/// Protects allocations driven by corrupted counts.
pub const fn check_count(count: i64, elem_size: usize, remaining: usize) -> Result<usize, FormatError> {
    if count < 0 {
        return Err(FormatError::OutOfBounds);
    }
    let bytes = match (count as usize).checked_mul(elem_size) {
        Some(b) => b,
        None => return Err(FormatError::OutOfBounds),
    };
    if bytes > remaining {
        return Err(FormatError::Truncated);
    }
    Ok(count as usize)
}
