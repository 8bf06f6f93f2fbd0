//! Big-endian codec for ROOT records
//!
//! [`RBuffer`] and [`WBuffer`] read and write every fixed-width scalar,
//! length-prefixed strings, arrays, versioned record envelopes with
//! self-checking byte counts, and the polymorphic object reference protocol.
//!
//! Buffers are single-pass cursors: a buffer belongs to one decode or encode
//! call and is dropped afterwards.

mod rbuffer;
mod refs;
mod wbuffer;

pub use rbuffer::{Context, RBuffer, Version};
pub use refs::RefTable;
pub use wbuffer::WBuffer;

use crate::Result;

/// A value that can decode itself from a buffer
pub trait Unmarshal: Sized {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self>;
}

/// A value that can encode itself into a buffer
pub trait Marshal: rootio_core::Object {
    fn marshal(&self, w: &mut WBuffer) -> Result<()>;

    /// Identity used to emit back-references when the same logical object is
    /// written twice into one buffer
    fn identity(&self) -> Option<String> {
        None
    }
}

/// Fixed-width values with a big-endian wire form
pub trait Primitive: Copy + Default + std::fmt::Debug + PartialEq {
    /// Bytes on the wire
    const SIZE: usize;

    fn read(r: &mut RBuffer<'_>) -> Result<Self>;
    fn write(self, w: &mut WBuffer);
}

macro_rules! impl_primitive {
    ($($ty:ty => $read:ident, $write:ident, $size:expr;)*) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = $size;

                fn read(r: &mut RBuffer<'_>) -> Result<Self> {
                    r.$read()
                }

                fn write(self, w: &mut WBuffer) {
                    w.$write(self)
                }
            }
        )*
    };
}

impl_primitive! {
    bool => read_bool, write_bool, 1;
    u8 => read_u8, write_u8, 1;
    i8 => read_i8, write_i8, 1;
    u16 => read_u16, write_u16, 2;
    i16 => read_i16, write_i16, 2;
    u32 => read_u32, write_u32, 4;
    i32 => read_i32, write_i32, 4;
    u64 => read_u64, write_u64, 8;
    i64 => read_i64, write_i64, 8;
    f32 => read_f32, write_f32, 4;
    f64 => read_f64, write_f64, 8;
}

/// Size of a length-prefixed string on the wire
pub fn string_size(s: &str) -> usize {
    if s.len() < 255 {
        1 + s.len()
    } else {
        5 + s.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_size() {
        assert_eq!(string_size(""), 1);
        assert_eq!(string_size("TKey"), 5);
        assert_eq!(string_size(&"x".repeat(254)), 255);
        assert_eq!(string_size(&"x".repeat(255)), 260);
    }

    fn roundtrip<T: Primitive>(values: &[T]) -> Vec<T> {
        let mut w = WBuffer::new(0);
        for v in values {
            v.write(&mut w);
        }
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), values.len() * T::SIZE);
        let mut r = RBuffer::new(&bytes, 0);
        values.iter().map(|_| T::read(&mut r).unwrap()).collect()
    }

    #[test]
    fn test_primitive_roundtrip() {
        assert_eq!(roundtrip(&[true, false]), vec![true, false]);
        assert_eq!(roundtrip(&[0u8, 7, 255]), vec![0u8, 7, 255]);
        assert_eq!(roundtrip(&[i8::MIN, -1, i8::MAX]), vec![i8::MIN, -1, i8::MAX]);
        assert_eq!(roundtrip(&[u16::MAX, 1]), vec![u16::MAX, 1]);
        assert_eq!(roundtrip(&[i16::MIN, i16::MAX]), vec![i16::MIN, i16::MAX]);
        assert_eq!(roundtrip(&[u32::MAX, 42]), vec![u32::MAX, 42]);
        assert_eq!(roundtrip(&[i32::MIN, -5, i32::MAX]), vec![i32::MIN, -5, i32::MAX]);
        assert_eq!(roundtrip(&[u64::MAX]), vec![u64::MAX]);
        assert_eq!(roundtrip(&[i64::MIN, i64::MAX]), vec![i64::MIN, i64::MAX]);
        assert_eq!(roundtrip(&[1.5f32, -0.0]), vec![1.5f32, -0.0]);
        assert_eq!(roundtrip(&[f64::MAX, f64::MIN_POSITIVE]), vec![f64::MAX, f64::MIN_POSITIVE]);
    }

    #[test]
    fn test_non_finite_roundtrip() {
        let back = roundtrip(&[f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        assert!(back[0].is_nan());
        assert!(back[1].is_infinite() && back[1] > 0.0);
        assert!(back[2].is_infinite() && back[2] < 0.0);

        let back = roundtrip(&[f32::NAN, f32::INFINITY]);
        assert!(back[0].is_nan());
        assert!(back[1].is_infinite());
    }

    #[test]
    fn test_big_endian_layout() {
        let mut w = WBuffer::new(0);
        w.write_i32(0x01020304);
        w.write_u16(0xa0b0);
        assert_eq!(w.bytes(), &[1, 2, 3, 4, 0xa0, 0xb0]);
    }
}
