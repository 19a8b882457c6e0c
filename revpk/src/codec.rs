//! Chunk payload codec boundary.
//!
//! Everything above this module treats compressed chunk payloads as opaque
//! bytes: a chunk is compressed iff its compressed and uncompressed sizes
//! differ, and the only way in or out is through [`decompress`] and its
//! symmetric [`compress`]. Decompression writes into a caller-sized buffer
//! and reports the payload checksums alongside the written length.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::trace;

use crate::error::{Error, Result};

/// Result of decoding one chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Bytes written to the destination buffer.
    pub written: usize,
    /// Adler-32 of the decompressed payload, as carried by the stream.
    pub adler32: u32,
    /// CRC-32 of the decompressed payload.
    pub crc32: u32,
}

/// Decompress `src` into `dst`, which must be sized to the exact
/// uncompressed length.
///
/// Fails if the stream is corrupt or decodes to anything other than
/// `dst.len()` bytes.
pub fn decompress(src: &[u8], dst: &mut [u8]) -> Result<Decoded> {
    let mut decoder = ZlibDecoder::new(src);
    decoder
        .read_exact(dst)
        .map_err(|e| Error::Codec(format!("decompress chunk: {e}")))?;

    // The stream must end exactly at the destination size.
    let mut probe = [0u8; 1];
    match decoder.read(&mut probe) {
        Ok(0) => {}
        Ok(_) => {
            return Err(Error::Codec(format!(
                "decompressed payload larger than expected {} bytes",
                dst.len()
            )))
        }
        Err(e) => return Err(Error::Codec(format!("decompress chunk: {e}"))),
    }

    // zlib stores the adler of the uncompressed payload in its trailer.
    let adler32 = match src.len() {
        n if n >= 4 => u32::from_be_bytes([src[n - 4], src[n - 3], src[n - 2], src[n - 1]]),
        _ => 0,
    };

    trace!("decompressed {} -> {} bytes", src.len(), dst.len());
    Ok(Decoded {
        written: dst.len(),
        adler32,
        crc32: crc32fast::hash(dst),
    })
}

/// Compress `src` into a fresh buffer.
pub fn compress(src: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(src)
        .map_err(|e| Error::Codec(format!("compress chunk: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Codec(format!("compress chunk: {e}")))
}
