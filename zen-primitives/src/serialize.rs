//! Canonical encoding helpers shared by every record type

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use sha2::{Digest, Sha256};
use zcash_encoding::CompactSize;

use crate::{uint::Uint256, Amount};

/// Sink that double-SHA256 hashes everything written to it
pub(crate) struct HashWriter {
    hasher: Sha256,
}

impl HashWriter {
    pub(crate) fn new() -> Self {
        HashWriter {
            hasher: Sha256::new(),
        }
    }

    pub(crate) fn finish(self) -> Uint256 {
        let first = self.hasher.finalize();
        Uint256(Sha256::digest(first).into())
    }
}

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that only counts bytes
pub(crate) struct SizeCounter(pub(crate) usize);

impl Write for SizeCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Double SHA-256 of the encoding produced by `write`.
pub(crate) fn hash_of<F>(write: F) -> Uint256
where
    F: FnOnce(&mut HashWriter) -> io::Result<()>,
{
    let mut writer = HashWriter::new();
    // writing into a hasher cannot fail
    let _ = write(&mut writer);
    writer.finish()
}

/// Encoded length of what `write` produces.
pub(crate) fn size_of<F>(write: F) -> usize
where
    F: FnOnce(&mut SizeCounter) -> io::Result<()>,
{
    let mut counter = SizeCounter(0);
    let _ = write(&mut counter);
    counter.0
}

/// Double SHA-256 of the concatenation of two hashes, the merkle tree node rule
pub(crate) fn hash_pair(left: &Uint256, right: &Uint256) -> Uint256 {
    hash_of(|w| {
        w.write_all(left.as_bytes())?;
        w.write_all(right.as_bytes())
    })
}

pub(crate) fn write_amount<W: Write>(mut writer: W, value: Amount) -> io::Result<()> {
    writer.write_i64::<LittleEndian>(value)
}

/// CompactSize length prefix followed by the raw bytes
pub(crate) fn write_bytes<W: Write>(mut writer: W, bytes: &[u8]) -> io::Result<()> {
    CompactSize::write(&mut writer, bytes.len())?;
    writer.write_all(bytes)
}
