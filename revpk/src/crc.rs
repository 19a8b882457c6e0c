//! The CRC32 variant used for VPK file checksums.
//!
//! Source-engine tools compute this with a 16-entry nibble table rather than
//! the usual 256-entry byte table; the resulting digest is the standard
//! reflected CRC-32.

use std::io::{self, Read};

use crate::error::Error;

const CRC_TABLE: [u32; 16] = [
    0x0000_0000, 0x1db7_1064, 0x3b6e_20c8, 0x26d9_30ac, 0x76dc_4190, 0x6b6b_51f4, 0x4db2_6158,
    0x5005_713c, 0xedb8_8320, 0xf00f_9344, 0xd6d6_a3e8, 0xcb61_b38c, 0x9b64_c2b0, 0x86d3_d2d4,
    0xa00a_e278, 0xbdbd_f21c,
];

/// Streaming VPK CRC32 hasher.
#[derive(Debug, Default, Clone)]
pub struct ValveCrc32 {
    state: u32,
}

impl ValveCrc32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the hash. Updates compose, so data may arrive in any
    /// number of pieces.
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = !self.state;
        for &b in data {
            crc = (crc >> 4) ^ CRC_TABLE[((crc & 0xF) ^ (b as u32 & 0xF)) as usize];
            crc = (crc >> 4) ^ CRC_TABLE[((crc & 0xF) ^ (b as u32 >> 4)) as usize];
        }
        self.state = !crc;
    }

    /// The digest over everything fed so far.
    pub fn finalize(&self) -> u32 {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0;
    }
}

/// One-shot convenience over [`ValveCrc32`].
pub fn crc32(data: &[u8]) -> u32 {
    let mut h = ValveCrc32::new();
    h.update(data);
    h.finalize()
}

/// A reader that hashes everything passing through it and verifies the total
/// length and checksum once the inner reader is exhausted.
///
/// An expected checksum of 0 skips the CRC comparison (the length is still
/// enforced). Verification failures are sticky: every read after a failure
/// reports the same error.
pub struct CrcReader<R> {
    inner: R,
    size: u64,
    expected: u32,
    hasher: ValveCrc32,
    read: u64,
    /// `Some(Ok(()))` once verified, `Some(Err)` once failed.
    done: Option<std::result::Result<(), (io::ErrorKind, String)>>,
}

impl<R: Read> CrcReader<R> {
    /// Wrap `inner`, expecting exactly `size` bytes with checksum `expected`.
    pub fn new(inner: R, size: u64, expected: u32) -> Self {
        Self {
            inner,
            size,
            expected,
            hasher: ValveCrc32::new(),
            read: 0,
            done: None,
        }
    }

    fn verify(&mut self) -> io::Result<()> {
        if self.read != self.size {
            let err = Error::ShortRead {
                expected: self.size,
                actual: self.read,
            };
            self.done = Some(Err((io::ErrorKind::UnexpectedEof, err.to_string())));
        } else if self.expected != 0 && self.hasher.finalize() != self.expected {
            let err = Error::ChecksumMismatch {
                expected: self.expected,
                actual: self.hasher.finalize(),
            };
            self.done = Some(Err((io::ErrorKind::InvalidData, err.to_string())));
        } else {
            self.done = Some(Ok(()));
        }
        self.take_result()
    }

    fn take_result(&mut self) -> io::Result<()> {
        match &self.done {
            Some(Ok(())) | None => Ok(()),
            Some(Err((kind, msg))) => Err(io::Error::new(*kind, msg.clone())),
        }
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done.is_some() {
            return self.take_result().map(|()| 0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.verify()?;
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}
