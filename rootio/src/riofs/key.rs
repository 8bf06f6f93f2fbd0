//! Key headers locating every stored record

use rootio_core::format::constants::{BIG_RECORD_VERSION, KEY_VERSION};
use rootio_core::Datime;

use super::file::FileIo;
use super::File;
use crate::error::ResultExt;
use crate::rbytes::{string_size, RBuffer, Unmarshal, WBuffer};
use crate::rcompress::decompress;
use crate::rtypes::Object;
use crate::{Error, Result};

/// Bytes of the fixed part before the seek pointers
pub(crate) const KEY_PREFIX: usize = 4 + 2 + 4 + 4 + 2 + 2;

/// Header of one stored record: where it lives, how long it is and what it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub(crate) nbytes: i32,
    pub(crate) version: i16,
    pub(crate) objlen: i32,
    pub(crate) datime: u32,
    pub(crate) keylen: i16,
    pub(crate) cycle: i16,
    pub(crate) seek_key: i64,
    pub(crate) seek_pdir: i64,
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) title: String,
}

impl Key {
    /// Header for a record not yet placed; `nbytes` and `objlen` are set once
    /// the payload is known
    pub(crate) fn new(
        class: &str,
        name: &str,
        title: &str,
        cycle: i16,
        datime: u32,
        seek_pdir: i64,
        big: bool,
    ) -> Result<Self> {
        let len = Self::header_len(big, class, name, title);
        let keylen = i16::try_from(len)
            .map_err(|_| Error::InvalidArgument(format!("key header of {name:?} is {len} bytes")))?;
        Ok(Self {
            nbytes: i32::from(keylen),
            version: if big { KEY_VERSION + BIG_RECORD_VERSION } else { KEY_VERSION },
            objlen: 0,
            datime,
            keylen,
            cycle,
            seek_key: 0,
            seek_pdir,
            class: class.to_owned(),
            name: name.to_owned(),
            title: title.to_owned(),
        })
    }

    /// Size of a header with the given strings
    pub(crate) fn header_len(big: bool, class: &str, name: &str, title: &str) -> usize {
        let ptrs = if big { 16 } else { 8 };
        KEY_PREFIX + ptrs + string_size(class) + string_size(name) + string_size(title)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn cycle(&self) -> i16 {
        self.cycle
    }

    /// Address of the record in the file
    pub fn seek(&self) -> i64 {
        self.seek_key
    }

    /// Bytes on disk, header included
    pub fn nbytes(&self) -> i32 {
        self.nbytes
    }

    /// Uncompressed payload length
    pub fn objlen(&self) -> i32 {
        self.objlen
    }

    pub fn keylen(&self) -> i16 {
        self.keylen
    }

    pub fn datime(&self) -> Datime {
        Datime::unpack(self.datime)
    }

    /// Whether the seek pointers are 64-bit
    pub fn is_big(&self) -> bool {
        self.version > BIG_RECORD_VERSION
    }

    /// Whether the payload went through the block compressor
    pub fn is_compressed(&self) -> bool {
        self.nbytes - i32::from(self.keylen) != self.objlen
    }

    /// Check the header of a record stored on its own: the record must hold
    /// at least its header
    ///
    /// Baskets kept inside their branch carry a header-only key and skip this.
    pub(crate) fn check_record(&self) -> Result<()> {
        if self.nbytes < i32::from(self.keylen) || self.seek_key < 0 {
            return Err(Error::corrupt(
                "TKey",
                format!(
                    "inconsistent key {:?} at {}: nbytes {}, keylen {}",
                    self.name, self.seek_key, self.nbytes, self.keylen
                ),
            ));
        }
        Ok(())
    }

    /// Decode a key header that starts a stored record
    pub(crate) fn read_record(r: &mut RBuffer<'_>) -> Result<Self> {
        let key = Self::unmarshal(r)?;
        match key.check_record() {
            Ok(()) => Ok(key),
            Err(err) => r.fail(err),
        }
    }

    /// Uncompressed payload
    pub fn bytes(&self, file: &File) -> Result<Vec<u8>> {
        self.payload(&file.io)
    }

    /// Decode the stored object
    ///
    /// Classes without a decoder or schema come back as
    /// [`Object::Opaque`](crate::rtypes::Object::Opaque).
    pub fn object(&self, file: &File) -> Result<Object> {
        self.decode(&file.io)
    }

    pub(crate) fn payload(&self, io: &FileIo) -> Result<Vec<u8>> {
        let keylen = i64::from(self.keylen);
        let stored = i64::from(self.nbytes) - keylen;
        let data = io
            .storage
            .read_at(self.seek_key + keylen, stored)
            .context(|| format!("key {:?}", self.name))?;
        if !self.is_compressed() {
            return Ok(data.into_owned());
        }
        tracing::trace!(key = %self.name, stored, objlen = self.objlen, "inflating key payload");
        decompress(&data, self.objlen as usize).context(|| format!("key {:?}", self.name))
    }

    pub(crate) fn decode(&self, io: &FileIo) -> Result<Object> {
        let bytes = self.payload(io)?;
        let keylen = self.keylen as u64;
        let mut r = RBuffer::with_context(&bytes, keylen, io.context());
        io.registry
            .decode(&self.class, &mut r, Some(keylen + bytes.len() as u64))
            .context(|| format!("key \"{};{}\"", self.name, self.cycle))
    }

    pub(crate) fn write(&self, w: &mut WBuffer) {
        w.write_i32(self.nbytes);
        w.write_i16(self.version);
        w.write_i32(self.objlen);
        w.write_u32(self.datime);
        w.write_i16(self.keylen);
        w.write_i16(self.cycle);
        if self.is_big() {
            w.write_i64(self.seek_key);
            w.write_i64(self.seek_pdir);
        } else {
            w.write_i32(self.seek_key as i32);
            w.write_i32(self.seek_pdir as i32);
        }
        w.write_string(&self.class);
        w.write_string(&self.name);
        w.write_string(&self.title);
    }
}

impl Unmarshal for Key {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let at = r.pos();
        let nbytes = r.read_i32()?;
        if nbytes < 0 {
            return r.fail(Error::corrupt(
                "TKey",
                format!("gap of {} free bytes at {at} where a key was expected", -i64::from(nbytes)),
            ));
        }
        let version = r.read_i16()?;
        let objlen = r.read_i32()?;
        let datime = r.read_u32()?;
        let keylen = r.read_i16()?;
        let cycle = r.read_i16()?;
        let (seek_key, seek_pdir) = if version > BIG_RECORD_VERSION {
            (r.read_i64()?, r.read_i64()?)
        } else {
            (i64::from(r.read_i32()?), i64::from(r.read_i32()?))
        };
        let class = r.read_string()?;
        let name = r.read_string()?;
        let title = r.read_string()?;

        if i64::from(keylen) < KEY_PREFIX as i64 || objlen < 0 {
            return r.fail(Error::corrupt(
                "TKey",
                format!("inconsistent key {name:?} at {at}: keylen {keylen}, objlen {objlen}"),
            ));
        }
        Ok(Self {
            nbytes,
            version,
            objlen,
            datime,
            keylen,
            cycle,
            seek_key,
            seek_pdir,
            class,
            name,
            title,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample(big: bool) -> Key {
        let mut key = Key::new("TObjString", "greeting", "", 2, 0x1234_5678, 100, big).unwrap();
        key.objlen = 20;
        key.nbytes = i32::from(key.keylen) + 20;
        key.seek_key = 4242;
        key
    }

    #[test]
    fn test_header_roundtrip() {
        for big in [false, true] {
            let key = sample(big);
            let mut w = WBuffer::new(0);
            key.write(&mut w);
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), key.keylen as usize);

            let back = Key::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
            assert_eq!(back, key);
            assert_eq!(back.is_big(), big);
            assert!(!back.is_compressed());
        }
    }

    #[test]
    fn test_header_len() {
        // 18 fixed + 8 pointers + "TObjString" 11 + "greeting" 9 + "" 1
        assert_eq!(sample(false).keylen, 47);
        assert_eq!(sample(true).keylen, 55);
        assert_eq!(sample(true).version, 1004);
    }

    #[test]
    fn test_gap_record_is_not_a_key() {
        let bytes = (-64i32).to_be_bytes();
        let err = Key::unmarshal(&mut RBuffer::new(&bytes, 300)).unwrap_err();
        assert!(err.to_string().contains("gap of 64 free bytes at 300"));
    }

    #[test]
    fn test_record_must_hold_its_header() {
        let mut key = sample(false);
        key.nbytes = 0;
        let mut w = WBuffer::new(0);
        key.write(&mut w);
        let bytes = w.into_bytes();

        // header-only keys are valid inside a branch
        let back = Key::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back.nbytes(), 0);

        let mut r = RBuffer::new(&bytes, 0);
        let err = Key::read_record(&mut r).unwrap_err();
        assert!(err.is_corruption(), "{err}");
        assert!(r.err().is_some());
    }

    fn decode_twice(bytes: &[u8]) -> (String, String) {
        let mut r = RBuffer::new(bytes, 0);
        let first = Key::read_record(&mut r).unwrap_err();
        assert!(first.is_corruption(), "{first}");
        // the buffer keeps reporting the first failure
        let sticky = r.read_i16().unwrap_err();
        assert_eq!(sticky.to_string(), first.to_string());
        let again = Key::read_record(&mut RBuffer::new(bytes, 0)).unwrap_err();
        (first.to_string(), again.to_string())
    }

    proptest! {
        // sign byte of nbytes, objlen or keylen
        #[test]
        fn prop_damaged_size_field_fails(at in prop::sample::select(vec![0usize, 6, 14]), high in 0x80u8..=0xFF, big in any::<bool>()) {
            let mut w = WBuffer::new(0);
            sample(big).write(&mut w);
            let mut bytes = w.into_bytes();
            bytes[at] = high;
            let (first, again) = decode_twice(&bytes);
            prop_assert_eq!(first, again);
        }

        #[test]
        fn prop_nbytes_below_header_fails(nbytes in 0i32..47) {
            let mut w = WBuffer::new(0);
            sample(false).write(&mut w);
            let mut bytes = w.into_bytes();
            bytes[..4].copy_from_slice(&nbytes.to_be_bytes());
            let (first, again) = decode_twice(&bytes);
            prop_assert!(first.contains("inconsistent key"), "{}", first);
            prop_assert_eq!(first, again);
        }
    }

    #[test]
    fn test_oversized_title_rejected() {
        let title = "t".repeat(40_000);
        let err = Key::new("TNamed", "n", &title, 1, 0, 0, false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
