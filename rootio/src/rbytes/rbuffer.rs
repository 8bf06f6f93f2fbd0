//! Read buffer with sticky error state

use rootio_core::format::constants::tags::{
    BYTE_COUNT_MASK, BYTE_COUNT_VMASK, CLASS_MASK, MAP_OFFSET, NEW_CLASS_TAG,
};
use rootio_core::validation::check_count;

use super::refs::RefTable;
use super::Primitive;
use crate::rdict::StreamerCatalog;
use crate::rtypes::{ClassRegistry, Object};
use crate::{Error, Result};

/// Registries consulted while decoding polymorphic values
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub registry: &'a ClassRegistry,
    pub streamers: Option<&'a StreamerCatalog>,
}

impl Context<'static> {
    /// Built-in classes only, no file schemas
    pub fn builtin() -> Self {
        Self {
            registry: ClassRegistry::builtin(),
            streamers: None,
        }
    }
}

/// Envelope read by [`RBuffer::read_version`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub version: i16,
    /// Absolute position of the byte-count word
    pub start: u64,
    /// Byte count, excluding the 4-byte count word itself
    pub count: u32,
}

impl Version {
    /// Absolute position where the record must end
    pub const fn end(&self) -> u64 {
        self.start + self.count as u64 + 4
    }
}

/// Cursor over a decoded payload
///
/// Positions are absolute: they include the key-length displacement the
/// payload had inside its record, which is what back-reference tags encode.
/// After the first failure every call returns that same error.
pub struct RBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u64,
    err: Option<Error>,
    refs: RefTable,
    ctx: Context<'a>,
}

macro_rules! read_scalar {
    ($($name:ident => $ty:ty;)*) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                let mut b = [0u8; std::mem::size_of::<$ty>()];
                b.copy_from_slice(self.take(std::mem::size_of::<$ty>())?);
                Ok(<$ty>::from_be_bytes(b))
            }
        )*
    };
}

impl<'a> RBuffer<'a> {
    /// Buffer over `data`, whose first byte sits at absolute position `offset`
    pub fn new(data: &'a [u8], offset: u64) -> RBuffer<'a> {
        RBuffer::with_context(data, offset, Context::builtin())
    }

    pub fn with_context(data: &'a [u8], offset: u64, ctx: Context<'a>) -> Self {
        Self {
            data,
            pos: 0,
            offset,
            err: None,
            refs: RefTable::default(),
            ctx,
        }
    }

    pub fn context(&self) -> Context<'a> {
        self.ctx
    }

    /// Absolute cursor position
    pub fn pos(&self) -> u64 {
        self.pos as u64 + self.offset
    }

    /// Move the cursor to an absolute position
    pub fn set_pos(&mut self, pos: u64) -> Result<()> {
        self.check()?;
        let rel = pos
            .checked_sub(self.offset)
            .filter(|rel| *rel <= self.data.len() as u64);
        match rel {
            Some(rel) => {
                self.pos = rel as usize;
                Ok(())
            }
            None => self.fail(Error::corrupt(
                "buffer",
                format!("seek to {pos} outside [{}, {}]", self.offset, self.offset + self.data.len() as u64),
            )),
        }
    }

    /// Remaining bytes
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First error recorded, if any
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Return the recorded error, if any
    pub fn check(&self) -> Result<()> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Record `err` unless an earlier error exists, and return the first one
    pub fn fail<T>(&mut self, err: Error) -> Result<T> {
        let first = self.err.get_or_insert(err);
        Err(first.clone())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.check()?;
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let data: &'a [u8] = self.data;
                let out = &data[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => self.fail(Error::corrupt(
                "buffer",
                format!("truncated read of {n} bytes at {} ({} left)", self.pos(), self.len()),
            )),
        }
    }

    /// Borrow the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    read_scalar! {
        read_u8 => u8;
        read_i8 => i8;
        read_u16 => u16;
        read_i16 => i16;
        read_u32 => u32;
        read_i32 => i32;
        read_u64 => u64;
        read_i64 => i64;
        read_f32 => f32;
        read_f64 => f64;
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Generic scalar read
    pub fn read<T: Primitive>(&mut self) -> Result<T> {
        T::read(self)
    }

    /// Read `n` consecutive values
    pub fn read_fast_array<T: Primitive>(&mut self, n: usize) -> Result<Vec<T>> {
        self.check()?;
        if let Err(err) = check_count(n as i64, T::SIZE, self.len()) {
            return self.fail(Error::corrupt(
                "buffer",
                format!("array of {n} x {} bytes at {}: {err}", T::SIZE, self.pos()),
            ));
        }
        (0..n).map(|_| T::read(self)).collect()
    }

    /// Read an `i32` count followed by that many values
    pub fn read_static_array<T: Primitive>(&mut self) -> Result<Vec<T>> {
        let n = self.read_i32()?;
        if n < 0 {
            return self.fail(Error::corrupt("buffer", format!("negative array length {n}")));
        }
        self.read_fast_array(n as usize)
    }

    /// Length-prefixed string: one length byte, `255` escapes to a `u32`
    pub fn read_string(&mut self) -> Result<String> {
        let mut n = self.read_u8()? as usize;
        if n == 255 {
            n = self.read_u32()? as usize;
        }
        let raw = self.take(n)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Null-terminated string of at most `max` bytes
    pub fn read_cstring(&mut self, max: usize) -> Result<String> {
        self.check()?;
        let rest = &self.data[self.pos..];
        let limit = rest.len().min(max);
        let (len, consumed) = match rest[..limit].iter().position(|b| *b == 0) {
            Some(nul) => (nul, nul + 1),
            None => (limit, limit),
        };
        let raw = &rest[..len];
        self.pos += consumed;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Read a versioned record envelope
    ///
    /// The leading word must carry the byte-count flag; older layouts without
    /// it are rejected.
    pub fn read_version(&mut self, class: &str) -> Result<Version> {
        let start = self.pos();
        let bcnt = self.read_u32()?;
        if bcnt & BYTE_COUNT_MASK == 0 {
            return self.fail(Error::corrupt(
                class,
                format!("missing byte count at {start} (word {bcnt:#010x}): record layout too old"),
            ));
        }
        let version = self.read_i16()?;
        Ok(Version {
            version,
            start,
            count: bcnt & !BYTE_COUNT_MASK,
        })
    }

    /// Verify that exactly the declared number of bytes was consumed
    pub fn check_byte_count(&mut self, v: &Version, class: &str) -> Result<()> {
        self.check()?;
        if v.count == 0 {
            return Ok(());
        }
        let got = self.pos();
        let want = v.end();
        if got > want {
            return self.fail(Error::corrupt(
                class,
                format!("read too many bytes (got {got}, want {want})"),
            ));
        }
        if got < want {
            return self.fail(Error::corrupt(
                class,
                format!("read too few bytes (got {got}, want {want})"),
            ));
        }
        Ok(())
    }

    /// Jump past the rest of a record whose content is not needed
    pub fn skip_to_end(&mut self, v: &Version) -> Result<()> {
        self.set_pos(v.end())
    }

    /// Read a version where the byte count is optional, as for `TObject`
    pub fn skip_version(&mut self, _class: &str) -> Result<i16> {
        let version = self.read_i16()?;
        if (version as u16) & BYTE_COUNT_VMASK != 0 {
            self.skip(2)?;
            return self.read_i16();
        }
        Ok(version)
    }

    /// Truncated-mantissa float stored in 3 bytes
    pub fn read_float16(&mut self, nbits: u32) -> Result<f32> {
        let exp = self.read_u8()? as u32;
        let man = self.read_u16()? as u32;
        let nbits = nbits.clamp(2, 22);
        let mut bits = exp << 23;
        bits |= (man & ((1 << (nbits + 1)) - 1)) << (23 - nbits);
        let mut v = f32::from_bits(bits);
        if (1 << (nbits + 1)) & man != 0 {
            v = -v;
        }
        Ok(v)
    }

    /// `Double32_t`: a plain `f32`, or a range-packed `u32` when `range` is set
    pub fn read_double32(&mut self, range: Option<(f64, f64, f64)>) -> Result<f64> {
        match range {
            Some((xmin, _xmax, factor)) if factor != 0.0 => {
                let raw = self.read_u32()?;
                Ok(xmin + raw as f64 / factor)
            }
            _ => Ok(self.read_f32()? as f64),
        }
    }

    /// Decode a value of a known class at the cursor
    pub fn read_class(&mut self, class: &str) -> Result<Object> {
        self.check()?;
        let ctx = self.ctx;
        match ctx.registry.decode(class, self, None) {
            Ok(obj) => Ok(obj),
            Err(err) => self.fail(err),
        }
    }

    /// Decode a polymorphic reference
    ///
    /// Returns `None` for null pointers and for back-references that cannot
    /// be resolved; the latter skip their declared span instead of failing.
    pub fn read_object_any(&mut self) -> Result<Option<Object>> {
        let beg = self.pos();
        let word = self.read_u32()?;

        let (tag, bcnt, start) = if word & BYTE_COUNT_MASK == 0 || word == NEW_CLASS_TAG {
            (word, None, 0)
        } else {
            let start = self.pos();
            (self.read_u32()?, Some(word & !BYTE_COUNT_MASK), start)
        };

        if tag & CLASS_MASK == 0 {
            if tag == 0 || tag == 1 {
                return Ok(None);
            }
            return match self.refs.object(u64::from(tag)) {
                Some(obj) => Ok(Some(obj.clone())),
                None => {
                    if let Some(n) = bcnt {
                        self.set_pos(beg + u64::from(n) + 4)?;
                    }
                    tracing::trace!(tag, beg, "unresolved object back-reference skipped");
                    Ok(None)
                }
            };
        }

        let class = if tag == NEW_CLASS_TAG {
            let class = self.read_cstring(80)?;
            let slot = match bcnt {
                Some(_) => start + MAP_OFFSET,
                None => self.refs.next_slot(),
            };
            self.refs.insert_class(slot, class.clone());
            class
        } else {
            let slot = u64::from(tag & !CLASS_MASK);
            match self.refs.class(slot) {
                Some(class) => class.to_owned(),
                None => {
                    return self.fail(Error::corrupt(
                        "object reference",
                        format!("unknown class back-reference {slot} at {beg}"),
                    ))
                }
            }
        };

        let slot = match bcnt {
            Some(_) => beg + MAP_OFFSET,
            None => self.refs.next_slot(),
        };
        self.refs.reserve(slot);

        let end = bcnt.map(|n| beg + u64::from(n) + 4);
        let ctx = self.ctx;
        let obj = match ctx.registry.decode(&class, self, end) {
            Ok(obj) => obj,
            Err(err) => return self.fail(err),
        };
        if let Some(end) = end {
            if self.pos() != end {
                return self.fail(Error::corrupt(
                    class,
                    format!("object reference spans to {}, declared end {end}", self.pos()),
                ));
            }
        }
        self.refs.fill(slot, obj.clone());
        Ok(Some(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbytes::WBuffer;

    #[test]
    fn test_strings() {
        let long = "L".repeat(300);
        let mut w = WBuffer::new(0);
        w.write_string("");
        w.write_string("TTree");
        w.write_string(&long);
        w.write_cstring("TNamed");
        let bytes = w.into_bytes();

        let mut r = RBuffer::new(&bytes, 0);
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.read_string().unwrap(), "TTree");
        assert_eq!(r.read_string().unwrap(), long);
        assert_eq!(r.read_cstring(80).unwrap(), "TNamed");
        assert!(r.is_empty());
    }

    #[test]
    fn test_arrays() {
        let mut w = WBuffer::new(0);
        w.write_static_array(&[1i32, -2, 3]);
        w.write_fast_array(&[0.5f64, 1.5]);
        w.write_fast_array::<u16>(&[]);
        let bytes = w.into_bytes();

        let mut r = RBuffer::new(&bytes, 0);
        assert_eq!(r.read_static_array::<i32>().unwrap(), vec![1, -2, 3]);
        assert_eq!(r.read_fast_array::<f64>(2).unwrap(), vec![0.5, 1.5]);
        assert_eq!(r.read_fast_array::<u16>(0).unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn test_sticky_error() {
        let bytes = [0u8, 1, 2];
        let mut r = RBuffer::new(&bytes, 0);
        let first = r.read_u32().unwrap_err();
        assert!(first.is_corruption());
        // even a read that would fit now fails with the first error
        let again = r.read_u8().unwrap_err();
        assert_eq!(first.to_string(), again.to_string());
        assert_eq!(r.pos(), 0);
    }

    #[test]
    fn test_version_and_byte_count() {
        let mut w = WBuffer::new(0);
        let start = w.write_version(3);
        w.write_i32(7);
        w.write_string("abc");
        w.set_byte_count(start, "Rec").unwrap();
        let bytes = w.into_bytes();

        let mut r = RBuffer::new(&bytes, 0);
        let v = r.read_version("Rec").unwrap();
        assert_eq!(v.version, 3);
        assert_eq!(v.count as usize, bytes.len() - 4);
        assert_eq!(r.read_i32().unwrap(), 7);
        assert_eq!(r.read_string().unwrap(), "abc");
        r.check_byte_count(&v, "Rec").unwrap();
    }

    #[test]
    fn test_byte_count_mismatch_kinds() {
        let mut w = WBuffer::new(0);
        let start = w.write_version(1);
        w.write_i32(7);
        w.write_i32(8);
        w.set_byte_count(start, "Rec").unwrap();
        let bytes = w.into_bytes();

        let mut r = RBuffer::new(&bytes, 0);
        let v = r.read_version("Rec").unwrap();
        r.read_i32().unwrap();
        let err = r.check_byte_count(&v, "Rec").unwrap_err();
        assert!(err.to_string().contains("read too few bytes"));

        let mut r = RBuffer::new(&bytes, 0);
        let mut v = r.read_version("Rec").unwrap();
        r.read_i32().unwrap();
        r.read_i32().unwrap();
        v.count -= 2;
        let err = r.check_byte_count(&v, "Rec").unwrap_err();
        assert!(err.to_string().contains("read too many bytes"));
    }

    #[test]
    fn test_missing_byte_count_flag() {
        let mut w = WBuffer::new(0);
        w.write_u32(12);
        w.write_i16(2);
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        let err = r.read_version("Old").unwrap_err();
        assert!(err.to_string().contains("too old"));
    }

    #[test]
    fn test_skip_version_with_and_without_count() {
        let mut w = WBuffer::new(0);
        w.write_i16(1);
        let start = w.write_version(1);
        w.set_byte_count(start, "TObject").unwrap();
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        assert_eq!(r.skip_version("TObject").unwrap(), 1);
        assert_eq!(r.skip_version("TObject").unwrap(), 1);
        assert!(r.is_empty());
    }

    #[test]
    fn test_offset_positions() {
        let bytes = [0u8; 8];
        let mut r = RBuffer::new(&bytes, 60);
        assert_eq!(r.pos(), 60);
        r.read_i32().unwrap();
        assert_eq!(r.pos(), 64);
        r.set_pos(66).unwrap();
        assert_eq!(r.len(), 2);
        assert!(r.set_pos(59).is_err());
    }

    #[test]
    fn test_float16() {
        // exponent 127, mantissa bits for 1.5 with 12-bit precision
        let mut w = WBuffer::new(0);
        w.write_u8(127);
        w.write_u16(1 << 11);
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        assert_eq!(r.read_float16(12).unwrap(), 1.5);
    }
}
