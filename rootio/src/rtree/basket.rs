//! Baskets: the compressed pages of a branch

use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rcompress::decompress;
use crate::riofs::Key;
use crate::{Error, Result};

/// Bytes of the basket header written after the key header
pub(crate) const BASKET_HEADER_LEN: usize = 2 + 4 + 4 + 4 + 4 + 1;

/// `TBasket`: key header, basket header and, for baskets held inside their
/// branch, the entry bytes themselves
#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    pub key: Key,
    pub version: i16,
    pub buffer_size: i32,
    /// Fixed entry size, or the entry offset length of variable-size branches
    pub nev_size: i32,
    /// Entries held
    pub nev_buf: i32,
    /// End of the entry bytes, key header included
    pub last: i32,
    /// Entry start positions, key header included; empty for fixed-size entries
    pub offsets: Vec<i32>,
    /// Buffer of `last` bytes for baskets stored inline with their branch
    pub data: Option<Vec<u8>>,
}

impl Basket {
    pub const VERSION: i16 = 3;

    pub fn entries(&self) -> i32 {
        self.nev_buf
    }

    /// Bytes of the key header plus the basket header
    pub fn keylen(&self) -> usize {
        self.key.keylen() as usize
    }

    fn flag(&self) -> u8 {
        match (&self.data, self.offsets.is_empty()) {
            (None, _) => 0,
            (Some(_), false) => 11,
            (Some(_), true) => 12,
        }
    }
}

impl rootio_core::Object for Basket {
    fn class(&self) -> &str {
        "TBasket"
    }
}

impl Unmarshal for Basket {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let mut key = Key::unmarshal(r)?;
        if key.class() != "TBasket" {
            return r.fail(Error::mismatch("TBasket", key.class()));
        }
        // baskets held by their branch are written with a header-only key
        if key.nbytes == 0 {
            key.nbytes = i32::from(key.keylen);
        }
        let version = r.read_i16()?;
        if version > Self::VERSION {
            return r.fail(Error::UnsupportedEncoding(format!("TBasket version {version}")));
        }
        let mut buffer_size = r.read_i32()?;
        let mut nev_size = r.read_i32()?;
        if nev_size < 0 {
            nev_size = -nev_size;
            super::IoFeatures::unmarshal(r)?;
        }
        let nev_buf = r.read_i32()?;
        let last = r.read_i32()?;
        let mut flag = r.read_u8()?;
        buffer_size = buffer_size.max(last);

        if flag >= 80 {
            return r.fail(Error::UnsupportedEncoding(
                "basket whose entry offsets must be regenerated".to_owned(),
            ));
        }

        let mut offsets = Vec::new();
        if flag != 0 && flag % 10 != 2 {
            if nev_buf > 0 {
                let n = r.read_i32()?;
                offsets = r.read_fast_array::<i32>(n.max(0) as usize)?;
                if 20 < flag && flag < 40 {
                    for off in &mut offsets {
                        *off &= !0xFF00_0000u32 as i32;
                    }
                }
            }
            if flag > 40 {
                // displacements only matter for clones arrays split over baskets
                let n = r.read_i32()?;
                r.read_fast_array::<i32>(n.max(0) as usize)?;
                flag -= 40;
            }
        }

        let data = if flag == 1 || flag > 10 {
            let size = if version <= 1 { r.read_i32()? } else { last };
            Some(r.read_bytes(size.max(0) as usize)?.to_vec())
        } else {
            None
        };

        Ok(Self {
            key,
            version,
            buffer_size,
            nev_size,
            nev_buf,
            last,
            offsets,
            data,
        })
    }
}

impl Marshal for Basket {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        self.key.write(w);
        w.write_i16(self.version);
        w.write_i32(self.buffer_size);
        w.write_i32(self.nev_size);
        w.write_i32(self.nev_buf);
        w.write_i32(self.last);
        w.write_u8(self.flag());
        if let Some(data) = &self.data {
            if !self.offsets.is_empty() {
                w.write_i32(self.offsets.len() as i32);
                w.write_fast_array(&self.offsets);
            }
            w.write_bytes(data);
        }
        Ok(())
    }
}

/// A basket whose entry bytes are in memory, ready to decode
#[derive(Debug, Clone)]
pub(crate) struct LoadedBasket {
    /// First entry held, tree numbering
    pub(crate) first: i64,
    /// One past the last entry held
    pub(crate) end: i64,
    pub(crate) keylen: u64,
    nev_size: i64,
    /// Entry bytes, starting at absolute position `keylen`
    pub(crate) data: Vec<u8>,
    offsets: Vec<i32>,
}

impl LoadedBasket {
    /// Inflate the payload of a basket read from its own record
    ///
    /// `raw` holds the whole record, key header first.
    pub(crate) fn from_record(
        header: Basket,
        raw: &[u8],
        index: usize,
        range: (i64, i64),
        entry_offset_len: i32,
    ) -> Result<Self> {
        let keylen = header.keylen();
        let stored = raw.get(keylen..).ok_or_else(|| {
            Error::corrupt("TBasket", format!("basket {index}: record of {} bytes, key length {keylen}", raw.len()))
        })?;
        let objlen = header.key.objlen() as usize;
        let payload = if header.key.is_compressed() {
            decompress(stored, objlen)?
        } else {
            stored.to_vec()
        };

        let mut offsets = header.offsets;
        if entry_offset_len > 0 && offsets.is_empty() && header.nev_buf > 0 {
            let mut r = RBuffer::new(&payload, keylen as u64);
            r.set_pos(header.last as u64)?;
            let n = r.read_i32()?;
            if n < header.nev_buf {
                return Err(Error::corrupt(
                    "TBasket",
                    format!("basket {index}: {n} entry offsets for {} entries", header.nev_buf),
                ));
            }
            offsets = r.read_fast_array::<i32>(n as usize)?;
        }
        Ok(Self {
            first: range.0,
            end: range.1,
            keylen: keylen as u64,
            nev_size: i64::from(header.nev_size),
            data: payload,
            offsets,
        })
    }

    /// Use the buffer of a basket stored inline with its branch
    pub(crate) fn from_inline(header: Basket, index: usize, range: (i64, i64)) -> Result<Self> {
        let keylen = header.keylen();
        let data = header
            .data
            .ok_or_else(|| Error::corrupt("TBasket", format!("basket {index} has no bytes")))?;
        let payload = data.get(keylen..).map(<[u8]>::to_vec).ok_or_else(|| {
            Error::corrupt("TBasket", format!("inline buffer of {} bytes", data.len()))
        })?;
        Ok(Self {
            first: range.0,
            end: range.1,
            keylen: keylen as u64,
            nev_size: i64::from(header.nev_size),
            data: payload,
            offsets: header.offsets,
        })
    }

    pub(crate) fn contains(&self, entry: i64) -> bool {
        self.first <= entry && entry < self.end
    }

    /// Absolute position of `entry`'s bytes
    pub(crate) fn entry_pos(&self, entry: i64, leaf_offset: i32) -> Result<u64> {
        let local = entry - self.first;
        let pos = if self.offsets.is_empty() {
            local * self.nev_size + self.keylen as i64
        } else {
            let at = usize::try_from(local)
                .ok()
                .and_then(|i| self.offsets.get(i))
                .ok_or_else(|| Error::corrupt("TBasket", format!("no offset for entry {entry}")))?;
            i64::from(*at)
        };
        u64::try_from(pos + i64::from(leaf_offset))
            .map_err(|_| Error::corrupt("TBasket", format!("negative position for entry {entry}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        let mut key = Key::new("TBasket", "px", "events", 1, 0, 100, false).unwrap();
        key.keylen += BASKET_HEADER_LEN as i16;
        key
    }

    #[test]
    fn test_header_only_fills_keylen() {
        let basket = Basket {
            key: key(),
            version: Basket::VERSION,
            buffer_size: 32_000,
            nev_size: 8,
            nev_buf: 3,
            last: 0,
            offsets: Vec::new(),
            data: None,
        };
        let mut w = WBuffer::new(0);
        basket.marshal(&mut w).unwrap();
        assert_eq!(w.len(), basket.keylen());

        let bytes = w.into_bytes();
        let back = Basket::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back, Basket { buffer_size: 32_000, ..basket });
    }

    #[test]
    fn test_inline_basket() {
        let key = key();
        let keylen = key.keylen() as usize;
        let mut data = vec![0u8; keylen];
        data.extend_from_slice(&[0, 0, 0, 7, 0, 0, 0, 9]);
        let basket = Basket {
            key,
            version: Basket::VERSION,
            buffer_size: 100,
            nev_size: 4,
            nev_buf: 2,
            last: data.len() as i32,
            offsets: vec![keylen as i32, keylen as i32 + 4],
            data: Some(data),
        };
        let mut w = WBuffer::new(0);
        basket.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        let back = Basket::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back, basket);

        let loaded = LoadedBasket::from_inline(back, 0, (10, 12)).unwrap();
        assert!(loaded.contains(11));
        assert!(!loaded.contains(12));
        let pos = loaded.entry_pos(11, 0).unwrap();
        let mut r = RBuffer::new(&loaded.data, loaded.keylen);
        r.set_pos(pos).unwrap();
        assert_eq!(r.read_i32().unwrap(), 9);
    }

    #[test]
    fn test_header_only_key_in_branch() {
        let mut key = key();
        key.nbytes = 0;
        let keylen = key.keylen() as usize;
        let mut data = vec![0u8; keylen];
        data.extend_from_slice(&[0, 0, 0, 5]);
        let basket = Basket {
            key,
            version: Basket::VERSION,
            buffer_size: 100,
            nev_size: 4,
            nev_buf: 1,
            last: data.len() as i32,
            offsets: Vec::new(),
            data: Some(data),
        };
        let mut w = WBuffer::new(0);
        basket.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        let back = Basket::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back.key.nbytes(), back.key.keylen() as i32);
        assert_eq!(back.nev_buf, 1);

        let loaded = LoadedBasket::from_inline(back, 0, (0, 1)).unwrap();
        let mut r = RBuffer::new(&loaded.data, loaded.keylen);
        r.set_pos(loaded.entry_pos(0, 0).unwrap()).unwrap();
        assert_eq!(r.read_i32().unwrap(), 5);
    }

    #[test]
    fn test_wrong_class_rejected() {
        let other = Key::new("TNamed", "x", "", 1, 0, 100, false).unwrap();
        let mut w = WBuffer::new(0);
        other.write(&mut w);
        let bytes = w.into_bytes();
        let err = Basket::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
