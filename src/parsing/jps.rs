//! JPS encrypted container records.
//!
//! ```text
//! archive header   "JPS" major:u8 minor:u8 spanned:u8 extra_len:u16
//! 2.0 extra header "JH" 0x00 0x01 len:u16(=76) algorithm:u8 iterations:u32
//!                  static_salt:u8 salt[64]
//! end of archive   "JPE" parts:u16 files:u32 usize:u32 csize:u32   (last 17 bytes)
//! entity preamble  "JPF" encrypted:u16 decrypted:u16, then the encrypted header
//! entity header    path_len:u16 path kind:u8 method:u8 usize:u32 perms:u32 mtime:u32
//! data block       encrypted:u32 decrypted:u32, then the encrypted payload
//! ```

use super::primitives::{ByteSource, PrimitiveReader};
use super::{CompressionMethod, EntityKind};
use crate::crypto::{Pbkdf2Algorithm, Pbkdf2Params};
use crate::error::{ArchiveError, Result};

pub const ARCHIVE_SIGNATURE: &[u8; 3] = b"JPS";
pub const END_OF_ARCHIVE_SIGNATURE: &[u8; 3] = b"JPE";
pub const ENTITY_SIGNATURE: &[u8; 3] = b"JPF";
const PBKDF2_SIGNATURE: &[u8; 4] = b"JH\x00\x01";
const PBKDF2_HEADER_SIZE: u16 = 76;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpsArchiveHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub spanned: bool,
    pub extra_header_length: u16,
    /// Present on format 2.0 only.
    pub pbkdf2: Option<Pbkdf2Params>,
}

impl JpsArchiveHeader {
    /// Bytes from the start of part 1 to the first entity.
    pub fn total_length(&self) -> u64 {
        JpsArchiveHeaderParser::HEADER_SIZE as u64 + self.extra_header_length as u64
    }
}

pub struct JpsArchiveHeaderParser;

impl JpsArchiveHeaderParser {
    pub const HEADER_SIZE: usize = 8;

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<JpsArchiveHeader> {
        let signature: [u8; 3] = source.read_array()?;
        if &signature != ARCHIVE_SIGNATURE {
            return Err(ArchiveError::InvalidArchiveSignature {
                expected: ARCHIVE_SIGNATURE,
                found: signature.to_vec(),
            });
        }

        let major_version = source.read_u8()?;
        let minor_version = source.read_u8()?;
        let spanned = source.read_u8()? != 0;
        let extra_header_length = source.read_u16()?;

        let pbkdf2 = match (major_version, minor_version) {
            (1, 9) | (1, 10) => {
                if extra_header_length != 0 {
                    return Err(ArchiveError::InvalidHeader(format!(
                        "format {}.{} cannot carry an extra header",
                        major_version, minor_version
                    )));
                }
                None
            }
            (2, 0) => {
                if extra_header_length != PBKDF2_HEADER_SIZE {
                    return Err(ArchiveError::InvalidHeader(format!(
                        "format 2.0 extra header must be {} bytes, found {}",
                        PBKDF2_HEADER_SIZE, extra_header_length
                    )));
                }
                Some(Self::parse_pbkdf2(source)?)
            }
            (major, minor) => {
                return Err(ArchiveError::UnsupportedFormatVersion { major, minor });
            }
        };

        Ok(JpsArchiveHeader {
            major_version,
            minor_version,
            spanned,
            extra_header_length,
            pbkdf2,
        })
    }

    fn parse_pbkdf2<S: ByteSource + ?Sized>(source: &mut S) -> Result<Pbkdf2Params> {
        let signature: [u8; 4] = source.read_array()?;
        if &signature != PBKDF2_SIGNATURE {
            return Err(ArchiveError::InvalidHeader(format!(
                "unknown archive extra header {:02x?}",
                signature
            )));
        }
        let length = source.read_u16()?;
        let algorithm = source.read_u8()?;
        let iterations = source.read_u32()?;
        let static_salt = source.read_u8()? == 1;

        if length != PBKDF2_HEADER_SIZE {
            return Err(ArchiveError::InvalidHeader(format!(
                "PBKDF2 extra header declares {} bytes",
                length
            )));
        }
        let algorithm = Pbkdf2Algorithm::from_id(algorithm)?;
        if iterations == 0 {
            return Err(ArchiveError::InvalidHeader(
                "PBKDF2 iteration count is zero".into(),
            ));
        }
        let salt = source.read_array()?;

        Ok(Pbkdf2Params {
            algorithm,
            iterations,
            static_salt,
            salt,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpsEndOfArchive {
    pub parts: u16,
    pub file_count: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

pub struct JpsEndOfArchiveParser;

impl JpsEndOfArchiveParser {
    pub const SIZE: usize = 17;

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<JpsEndOfArchive> {
        let signature: [u8; 3] = source.read_array()?;
        if &signature != END_OF_ARCHIVE_SIGNATURE {
            return Err(ArchiveError::InvalidArchiveSignature {
                expected: END_OF_ARCHIVE_SIGNATURE,
                found: signature.to_vec(),
            });
        }
        Ok(JpsEndOfArchive {
            parts: source.read_u16()?,
            file_count: source.read_u32()?,
            uncompressed_size: source.read_u32()?,
            compressed_size: source.read_u32()?,
        })
    }
}

/// Sizes of an entity's encrypted header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpsEntityPreamble {
    pub encrypted_size: u16,
    pub decrypted_size: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpsEntityHeader {
    pub path: String,
    pub kind: EntityKind,
    pub compression: CompressionMethod,
    pub uncompressed_size: u32,
    pub permissions: u32,
    pub modified: u32,
}

pub struct JpsEntityHeaderParser;

impl JpsEntityHeaderParser {
    pub const PREAMBLE_SIZE: usize = 7;

    pub fn parse_preamble<S: ByteSource + ?Sized>(source: &mut S) -> Result<JpsEntityPreamble> {
        let start = source.position();
        let signature: [u8; 3] = source.read_array()?;
        if &signature != ENTITY_SIGNATURE {
            return Err(ArchiveError::InvalidHeader(format!(
                "expected entity block at offset {}, found {:02x?}",
                start, signature
            )));
        }
        Ok(JpsEntityPreamble {
            encrypted_size: source.read_u16()?,
            decrypted_size: source.read_u16()?,
        })
    }

    /// Parse a decrypted entity header.
    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<JpsEntityHeader> {
        let path_length = source.read_u16()?;
        let path = source.read_utf8(path_length as usize)?;
        Ok(JpsEntityHeader {
            path,
            kind: EntityKind::from_byte(source.read_u8()?)?,
            compression: CompressionMethod::from_byte(source.read_u8()?)?,
            uncompressed_size: source.read_u32()?,
            permissions: source.read_u32()?,
            modified: source.read_u32()?,
        })
    }
}

/// Sizes of one encrypted payload block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpsDataBlockHeader {
    pub encrypted_size: u32,
    pub decrypted_size: u32,
}

impl JpsDataBlockHeader {
    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Self {
            encrypted_size: source.read_u32()?,
            decrypted_size: source.read_u32()?,
        })
    }
}
