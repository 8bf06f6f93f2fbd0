//! Growable write buffer

use hashbrown::HashMap;
use rootio_core::format::constants::tags::{
    BYTE_COUNT_MASK, CLASS_MASK, MAP_OFFSET, NEW_CLASS_TAG,
};

use super::{Marshal, Primitive};
use crate::{Error, Result};

/// Largest byte count that fits beside the flag bit
const MAX_BYTE_COUNT: u64 = !BYTE_COUNT_MASK as u64 >> 1;

/// Encoder producing the big-endian wire form
///
/// Writes never fail; only envelope patching can report an oversize record.
#[derive(Debug, Default)]
pub struct WBuffer {
    buf: Vec<u8>,
    offset: u64,
    classes: HashMap<String, u64>,
    objects: HashMap<String, u64>,
}

macro_rules! write_scalar {
    ($($name:ident => $ty:ty;)*) => {
        $(
            pub fn $name(&mut self, v: $ty) {
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
        )*
    };
}

impl WBuffer {
    /// Buffer whose first byte will sit at absolute position `offset`
    pub fn new(offset: u64) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            offset,
            ..Default::default()
        }
    }

    /// Absolute position of the next byte
    pub fn pos(&self) -> u64 {
        self.buf.len() as u64 + self.offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    write_scalar! {
        write_u16 => u16;
        write_i16 => i16;
        write_u32 => u32;
        write_i32 => i32;
        write_u64 => u64;
        write_i64 => i64;
        write_f32 => f32;
        write_f64 => f64;
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write<T: Primitive>(&mut self, v: T) {
        v.write(self)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_fast_array<T: Primitive>(&mut self, values: &[T]) {
        self.buf.reserve(values.len() * T::SIZE);
        for v in values {
            v.write(self);
        }
    }

    /// `i32` count followed by the values
    pub fn write_static_array<T: Primitive>(&mut self, values: &[T]) {
        self.write_i32(values.len() as i32);
        self.write_fast_array(values);
    }

    pub fn write_string(&mut self, s: &str) {
        let n = s.len();
        if n < 255 {
            self.write_u8(n as u8);
        } else {
            self.write_u8(255);
            self.write_u32(n as u32);
        }
        self.write_bytes(s.as_bytes());
    }

    pub fn write_cstring(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
    }

    pub fn write_float16(&mut self, v: f32, nbits: u32) {
        let nbits = nbits.clamp(2, 22);
        let bits = v.to_bits();
        let exp = ((bits >> 23) & 0xff) as u8;
        let mut man = ((1u32 << (nbits + 1)) - 1) & (bits >> (22 - nbits));
        man = (man + 1) >> 1;
        if man & (1 << nbits) != 0 {
            man = (1 << nbits) - 1;
        }
        if v < 0.0 {
            man |= 1 << (nbits + 1);
        }
        self.write_u8(exp);
        self.write_u16(man as u16);
    }

    /// Inverse of [`RBuffer::read_double32`](super::RBuffer::read_double32)
    pub fn write_double32(&mut self, v: f64, range: Option<(f64, f64, f64)>) {
        match range {
            Some((xmin, xmax, factor)) if factor != 0.0 => {
                let clamped = v.clamp(xmin, xmax);
                self.write_u32(((clamped - xmin) * factor + 0.5) as u32);
            }
            _ => self.write_f32(v as f32),
        }
    }

    /// Overwrite four bytes at an absolute position
    pub fn patch_u32(&mut self, at: u64, v: u32) -> Result<()> {
        let rel = at
            .checked_sub(self.offset)
            .map(|rel| rel as usize)
            .filter(|rel| rel + 4 <= self.buf.len())
            .ok_or_else(|| Error::InvalidArgument(format!("patch at {at} outside buffer")))?;
        self.buf[rel..rel + 4].copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Start a versioned record, returning the envelope start for
    /// [`set_byte_count`](Self::set_byte_count)
    pub fn write_version(&mut self, version: i16) -> u64 {
        let start = self.pos();
        self.write_u32(0);
        self.write_i16(version);
        start
    }

    /// Patch the byte count of the record opened at `start`
    pub fn set_byte_count(&mut self, start: u64, class: &str) -> Result<()> {
        let count = self.pos() - start - 4;
        if count > MAX_BYTE_COUNT {
            return Err(Error::corrupt(
                class,
                format!("record of {count} bytes does not fit a byte count"),
            ));
        }
        self.patch_u32(start, count as u32 | BYTE_COUNT_MASK)
    }

    /// Encode a polymorphic reference
    ///
    /// A class written earlier in this buffer is referenced by tag. An object
    /// whose [`identity`](Marshal::identity) was already written becomes a
    /// bare back-reference.
    pub fn write_object_any(&mut self, obj: Option<&dyn Marshal>) -> Result<()> {
        let Some(obj) = obj else {
            self.write_u32(0);
            return Ok(());
        };

        let identity = obj.identity();
        if let Some(tag) = identity.as_ref().and_then(|id| self.objects.get(id)) {
            let tag = *tag as u32;
            self.write_u32(tag);
            return Ok(());
        }

        let beg = self.pos();
        self.write_u32(0);

        let class = obj.class();
        match self.classes.get(class) {
            Some(tag) => {
                let tag = *tag as u32 | CLASS_MASK;
                self.write_u32(tag);
            }
            None => {
                let tag_pos = self.pos();
                self.write_u32(NEW_CLASS_TAG);
                self.write_cstring(class);
                self.classes.insert(class.to_owned(), tag_pos + MAP_OFFSET);
            }
        }
        if let Some(id) = identity {
            self.objects.insert(id, beg + MAP_OFFSET);
        }

        obj.marshal(self)?;

        let count = self.pos() - beg - 4;
        if count > MAX_BYTE_COUNT {
            return Err(Error::corrupt(
                class,
                format!("object of {count} bytes does not fit a byte count"),
            ));
        }
        self.patch_u32(beg, count as u32 | BYTE_COUNT_MASK)
    }
}
