//! Block compression for record payloads
//!
//! Payloads are cut into blocks of at most `0xffffff` bytes. Each block is
//! compressed independently and prefixed with a [`ChunkHeader`] naming its
//! algorithm, so a reader needs no out-of-band settings. Several blocks are
//! compressed in parallel with rayon.
//!
//! A payload that is too small, or that fails to shrink in any block, is
//! stored raw. Readers recognize raw storage by the on-disk length matching
//! the uncompressed length.

use std::borrow::Cow;
use std::io::{Read, Write};

use rayon::prelude::*;
use rootio_core::format::constants::{MAX_BLOCK_SIZE, MIN_COMPRESS_SIZE};
use rootio_core::{Algorithm, ChunkHeader, Settings};

use crate::{Error, Result};

/// Bytes of the big-endian xxhash64 prefix in LZ4 blocks
const LZ4_CHECKSUM_SIZE: usize = 8;

/// Compress `src` with `settings`
///
/// Returns the input unchanged when compression is disabled, the payload is
/// under 512 bytes, or a block does not shrink.
pub fn compress(settings: Settings, src: &[u8]) -> Result<Cow<'_, [u8]>> {
    if settings.is_none() || src.len() < MIN_COMPRESS_SIZE {
        return Ok(Cow::Borrowed(src));
    }

    let blocks: Vec<Option<Vec<u8>>> = if src.len() <= MAX_BLOCK_SIZE {
        vec![compress_block(settings, src)?]
    } else {
        src.par_chunks(MAX_BLOCK_SIZE)
            .map(|block| compress_block(settings, block))
            .collect::<Result<_>>()?
    };

    let mut out = Vec::with_capacity(src.len());
    for block in blocks {
        match block {
            Some(bytes) => out.extend_from_slice(&bytes),
            None => {
                tracing::trace!(len = src.len(), ?settings, "payload incompressible, stored raw");
                return Ok(Cow::Borrowed(src));
            }
        }
    }
    Ok(Cow::Owned(out))
}

/// Compress one block, header included; `None` when it does not shrink
fn compress_block(settings: Settings, src: &[u8]) -> Result<Option<Vec<u8>>> {
    let level = u32::from(settings.level);
    let body = match settings.algorithm {
        Algorithm::Zlib => {
            let level = flate2::Compression::new(level.min(9));
            let mut enc = flate2::write::ZlibEncoder::new(Vec::with_capacity(src.len()), level);
            enc.write_all(src)?;
            enc.finish()?
        }
        Algorithm::Lzma => {
            let stream = xz2::stream::Stream::new_easy_encoder(level.min(9), xz2::stream::Check::Crc32)
                .map_err(|err| Error::UnsupportedEncoding(format!("lzma encoder: {err}")))?;
            let mut enc = xz2::write::XzEncoder::new_stream(Vec::with_capacity(src.len()), stream);
            enc.write_all(src)?;
            enc.finish()?
        }
        Algorithm::Lz4 => {
            let packed = lz4_flex::block::compress(src);
            let mut body = Vec::with_capacity(LZ4_CHECKSUM_SIZE + packed.len());
            body.extend_from_slice(&xxhash_rust::xxh64::xxh64(&packed, 0).to_be_bytes());
            body.extend_from_slice(&packed);
            body
        }
        Algorithm::Zstd => zstd::bulk::compress(src, level as i32)?,
        Algorithm::Old => {
            return Err(Error::UnsupportedEncoding(
                "legacy CS compression cannot be written".into(),
            ))
        }
        Algorithm::None => return Ok(None),
    };

    if body.len() >= src.len() || body.len() > MAX_BLOCK_SIZE {
        return Ok(None);
    }

    let header = ChunkHeader::new(settings.algorithm, body.len(), src.len())?;
    let mut out = Vec::with_capacity(ChunkHeader::SIZE + body.len());
    out.extend_from_slice(&header.to_bytes()?);
    out.extend_from_slice(&body);
    Ok(Some(out))
}

/// Inflate `src` into a new buffer of `target_len` bytes
pub fn decompress(src: &[u8], target_len: usize) -> Result<Vec<u8>> {
    let mut dst = vec![0u8; target_len];
    decompress_into(src, &mut dst)?;
    Ok(dst)
}

/// Inflate `src` into `dst`, which must have the exact uncompressed length
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<()> {
    if src.len() == dst.len() {
        dst.copy_from_slice(src);
        return Ok(());
    }

    let mut cur = 0usize;
    let mut produced = 0usize;
    while produced < dst.len() {
        let header = ChunkHeader::from_bytes(&src[cur.min(src.len())..]).map_err(|err| match err {
            rootio_core::FormatError::UnknownAlgorithm(tag) => Error::UnsupportedEncoding(format!(
                "unknown compression tag {:?}",
                String::from_utf8_lossy(&tag)
            )),
            other => Error::corrupt("compressed block", format!("header at {cur}: {other}")),
        })?;
        let body_start = cur + ChunkHeader::SIZE;
        let body_end = body_start + header.compressed as usize;
        let out_end = produced + header.uncompressed as usize;
        if body_end > src.len() {
            return Err(Error::corrupt(
                "compressed block",
                format!("block at {cur} declares {} bytes, {} available", header.compressed, src.len() - body_start),
            ));
        }
        if out_end > dst.len() {
            return Err(Error::corrupt(
                "compressed block",
                format!("inflated size {out_end} exceeds expected {}", dst.len()),
            ));
        }

        let body = &src[body_start..body_end];
        let out = &mut dst[produced..out_end];
        let n = decompress_block(header.algorithm, body, out)?;
        if n != out.len() {
            return Err(Error::corrupt(
                "compressed block",
                format!("block at {cur} inflated to {n} bytes, header says {}", out.len()),
            ));
        }
        tracing::trace!(algorithm = ?header.algorithm, compressed = body.len(), inflated = n, "block inflated");

        cur = body_end;
        produced = out_end;
    }
    Ok(())
}

fn decompress_block(algorithm: Algorithm, body: &[u8], out: &mut [u8]) -> Result<usize> {
    match algorithm {
        Algorithm::Zlib => read_full(flate2::read::ZlibDecoder::new(body), out),
        Algorithm::Lzma => read_full(xz2::read::XzDecoder::new(body), out),
        Algorithm::Lz4 => {
            if body.len() < LZ4_CHECKSUM_SIZE {
                return Err(Error::corrupt("lz4 block", "missing checksum"));
            }
            let (sum, packed) = body.split_at(LZ4_CHECKSUM_SIZE);
            let mut want = [0u8; LZ4_CHECKSUM_SIZE];
            want.copy_from_slice(sum);
            let want = u64::from_be_bytes(want);
            let got = xxhash_rust::xxh64::xxh64(packed, 0);
            if got != want {
                return Err(Error::corrupt(
                    "lz4 block",
                    format!("checksum {got:#018x} does not match {want:#018x}"),
                ));
            }
            lz4_flex::block::decompress_into(packed, out)
                .map_err(|err| Error::corrupt("lz4 block", err.to_string()))
        }
        Algorithm::Zstd => {
            let inflated = zstd::bulk::decompress(body, out.len())
                .map_err(|err| Error::corrupt("zstd block", err.to_string()))?;
            out[..inflated.len()].copy_from_slice(&inflated);
            Ok(inflated.len())
        }
        Algorithm::Old => Err(Error::UnsupportedEncoding(
            "legacy CS compression is not supported".into(),
        )),
        Algorithm::None => Err(Error::corrupt("compressed block", "chunk without algorithm")),
    }
}

/// Fill `out` from a decoder; a short stream reports the bytes obtained
fn read_full(mut dec: impl Read, out: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    while n < out.len() {
        match dec.read(&mut out[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(Error::corrupt("compressed block", err.to_string())),
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(n: usize) -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog "
            .iter()
            .copied()
            .cycle()
            .take(n)
            .collect()
    }

    #[test]
    fn test_passthrough_rules() {
        let small = text(511);
        assert!(matches!(compress(Settings::default(), &small).unwrap(), Cow::Borrowed(_)));

        let big = text(4096);
        assert!(matches!(compress(Settings::NONE, &big).unwrap(), Cow::Borrowed(_)));
        let zero_level = Settings::new(Algorithm::Zlib, 0);
        assert!(matches!(compress(zero_level, &big).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_header_tags() {
        let src = text(4096);
        for (alg, tag) in [
            (Algorithm::Zlib, b"ZL"),
            (Algorithm::Lzma, b"XZ"),
            (Algorithm::Lz4, b"L4"),
            (Algorithm::Zstd, b"ZS"),
        ] {
            let packed = compress(Settings::new(alg, 1), &src).unwrap();
            assert_eq!(&packed[..2], tag, "{alg:?}");
            let header = ChunkHeader::from_bytes(&packed).unwrap();
            assert_eq!(header.uncompressed as usize, src.len());
            assert_eq!(header.compressed as usize + ChunkHeader::SIZE, packed.len());
            assert_eq!(decompress(&packed, src.len()).unwrap(), src);
        }
    }

    #[test]
    fn test_incompressible_stored_raw() {
        // xorshift noise does not shrink
        let mut x = 0x2545_f491_4f6c_dd1du64;
        let noise: Vec<u8> = (0..2048)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                x as u8
            })
            .collect();
        let out = compress(Settings::new(Algorithm::Zlib, 1), &noise).unwrap();
        assert_eq!(&*out, &noise[..]);
        assert_eq!(decompress(&out, noise.len()).unwrap(), noise);
    }

    #[test]
    fn test_lz4_checksum_verified() {
        let src = text(4096);
        let mut packed = compress(Settings::new(Algorithm::Lz4, 1), &src).unwrap().into_owned();
        packed[ChunkHeader::SIZE] ^= 0xff;
        let err = decompress(&packed, src.len()).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let mut packed = compress(Settings::default(), &text(4096)).unwrap().into_owned();
        packed[0] = b'Q';
        packed[1] = b'Q';
        let err = decompress(&packed, 4096).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_old_algorithm_rejected() {
        let err = compress(Settings::new(Algorithm::Old, 1), &text(4096)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_size_mismatch_is_corruption() {
        let src = text(4096);
        let packed = compress(Settings::default(), &src).unwrap().into_owned();
        let err = decompress(&packed, src.len() + 10).unwrap_err();
        assert!(err.is_corruption());
    }
}
