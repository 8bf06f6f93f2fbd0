//! Parsing utilities for format-specific strings
//!
//! Pure functions over `&str`: `name;cycle` key selectors and leaf titles of
//! the form `name[count][3]/T`.

use crate::format::Scalar;
use crate::FormatError;

/// Split `name;cycle` into its parts
///
/// A missing cycle selects the highest one and is reported as `None`.
pub fn parse_namecycle(s: &str) -> Result<(&str, Option<i16>), FormatError> {
    let (name, cycle) = match s.rfind(';') {
        Some(at) => (&s[..at], Some(&s[at + 1..])),
        None => (s, None),
    };
    if name.is_empty() {
        return Err(FormatError::InvalidNameCycle);
    }
    let cycle = match cycle {
        None => None,
        Some(c) => {
            let v = parse_usize(c).map_err(|_| FormatError::InvalidNameCycle)?;
            if v > i16::MAX as usize {
                return Err(FormatError::InvalidNameCycle);
            }
            Some(v as i16)
        }
    };
    Ok((name, cycle))
}

/// Validate a key or branch name
pub fn validate_name(name: &str) -> Result<(), FormatError> {
    if name.is_empty() || name.len() > 1024 {
        return Err(FormatError::InvalidNameCycle);
    }
    if name.bytes().any(|b| b == b';' || b == 0 || b < 32) {
        return Err(FormatError::InvalidNameCycle);
    }
    Ok(())
}

/// Leaf layout described by a branch title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafSpec<'a> {
    pub name: &'a str,
    /// Name of the leaf holding the per-entry element count
    pub count: Option<&'a str>,
    /// Product of the fixed dimensions (1 for scalars)
    pub fixed_len: usize,
    pub scalar: Scalar,
}

/// Parse a leaf title such as `px/D`, `hits[nhits]/F` or `m[3][3]/I`
///
/// The type letter defaults to `F` when omitted. Only the first dimension
/// may name a count leaf.
pub fn parse_leaf_spec(title: &str) -> Result<LeafSpec<'_>, FormatError> {
    let (decl, letter) = match title.rfind('/') {
        Some(at) => {
            let ty = &title[at + 1..];
            if ty.len() != 1 {
                return Err(FormatError::InvalidLeafSpec);
            }
            (&title[..at], ty.as_bytes()[0])
        }
        None => (title, b'F'),
    };
    let scalar = Scalar::from_leaf_letter(letter).ok_or(FormatError::InvalidLeafSpec)?;

    let (name, mut dims) = match decl.find('[') {
        Some(at) => (&decl[..at], &decl[at..]),
        None => (decl, ""),
    };
    if name.is_empty() {
        return Err(FormatError::InvalidLeafSpec);
    }

    let mut count = None;
    let mut fixed_len = 1usize;
    let mut first = true;
    while !dims.is_empty() {
        if !dims.starts_with('[') {
            return Err(FormatError::InvalidLeafSpec);
        }
        let close = dims.find(']').ok_or(FormatError::InvalidLeafSpec)?;
        let dim = &dims[1..close];
        match parse_usize(dim) {
            Ok(n) if n > 0 => {
                fixed_len = fixed_len.checked_mul(n).ok_or(FormatError::InvalidLeafSpec)?
            }
            Ok(_) => return Err(FormatError::InvalidLeafSpec),
            Err(_) if first && !dim.is_empty() => count = Some(dim),
            Err(_) => return Err(FormatError::InvalidLeafSpec),
        }
        first = false;
        dims = &dims[close + 1..];
    }

    Ok(LeafSpec { name, count, fixed_len, scalar })
}

/// Parse a decimal usize without relying on `std`
fn parse_usize(s: &str) -> Result<usize, FormatError> {
    if s.is_empty() {
        return Err(FormatError::OutOfBounds);
    }
    let mut result: usize = 0;
    for byte in s.bytes() {
        if !byte.is_ascii_digit() {
            return Err(FormatError::OutOfBounds);
        }
        let digit = (byte - b'0') as usize;
        if result > (usize::MAX - digit) / 10 {
            return Err(FormatError::OutOfBounds);
        }
        result = result * 10 + digit;
    }
    Ok(result)
}
