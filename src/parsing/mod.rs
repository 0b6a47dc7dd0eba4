//! Record parsers for the JPA, JPS and ZIP formats.
//!
//! Parsers pull fields through [`PrimitiveReader`], so they work the same on
//! the live part stream and on decrypted buffers.

pub mod jpa;
pub mod jps;
pub mod primitives;
pub mod zip;

pub use jpa::{JpaArchiveHeaderParser, JpaEntityHeaderParser};
pub use jps::{JpsArchiveHeaderParser, JpsEndOfArchiveParser, JpsEntityHeaderParser};
pub use primitives::{ByteSource, PrimitiveReader, SliceReader};
pub use zip::{CentralDirectoryParser, EndOfCentralDirectoryParser, LocalFileHeaderParser};

use crate::error::{ArchiveError, Result};

/// What an entity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Directory,
    File,
    Symlink,
}

impl EntityKind {
    /// Decode the kind byte used by JPA and JPS entity blocks.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Directory),
            1 => Ok(Self::File),
            2 => Ok(Self::Symlink),
            other => Err(ArchiveError::InvalidEntityType(other)),
        }
    }
}

/// How an entity's payload is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    /// Raw deflate, no zlib or gzip framing.
    Deflate,
    Bzip2,
}

impl CompressionMethod {
    /// Decode the compression byte used by JPA and JPS entity blocks.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Stored),
            1 => Ok(Self::Deflate),
            2 => Ok(Self::Bzip2),
            other => Err(ArchiveError::UnsupportedCompressionMethod(other as u16)),
        }
    }

    /// Decode a ZIP compression method code.
    pub fn from_zip_code(code: u16) -> Result<Self> {
        match code {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflate),
            12 => Ok(Self::Bzip2),
            other => Err(ArchiveError::UnsupportedCompressionMethod(other)),
        }
    }
}
