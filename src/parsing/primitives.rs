//! Typed little-endian reads over any byte source.
//!
//! The same helpers decode the live part stream ([`PartReader`]) and
//! decrypted scratch buffers ([`SliceReader`]), so a record parser only
//! needs to be written once.
//!
//! [`PartReader`]: crate::part_reader::PartReader

use crate::error::{ArchiveError, Result};

/// Upper bound on a single allocation step when reading declared-length runs.
const READ_STEP: usize = 64 * 1024;

/// A forward-only source of bytes.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes. Fewer are returned only at the end of data.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Advance by `n` bytes without returning them.
    fn skip(&mut self, n: u64) -> Result<()>;

    /// Bytes consumed since the start of the source.
    fn position(&self) -> u64;
}

/// Fixed-width reads layered on [`ByteSource`].
pub trait PrimitiveReader: ByteSource {
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        let have = self.read_bytes(&mut buf)?;
        if have < N {
            return Err(ArchiveError::BufferTooSmall { needed: N, have });
        }
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read exactly `len` bytes into a new buffer.
    ///
    /// The buffer grows as data arrives, so a corrupt length field cannot
    /// force a huge allocation up front.
    fn read_buffer(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(READ_STEP));
        while out.len() < len {
            let start = out.len();
            let step = (len - start).min(READ_STEP);
            out.resize(start + step, 0);
            let n = self.read_bytes(&mut out[start..])?;
            out.truncate(start + n);
            if n < step {
                return Err(ArchiveError::BufferTooSmall {
                    needed: len,
                    have: out.len(),
                });
            }
        }
        Ok(out)
    }

    /// Read a fixed-length ASCII string. Bytes above 0x7f become U+FFFD.
    fn read_ascii(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_buffer(len)?;
        Ok(bytes
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '\u{fffd}' })
            .collect())
    }

    /// Read a fixed-length UTF-8 string, replacing invalid sequences.
    fn read_utf8(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_buffer(len)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

impl<T: ByteSource + ?Sized> PrimitiveReader for T {}

/// [`ByteSource`] over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

impl ByteSource for SliceReader<'_> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.remaining() as u64 {
            return Err(ArchiveError::BufferTooSmall {
                needed: n as usize,
                have: self.remaining(),
            });
        }
        self.pos += n as usize;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }
}
