//! JPA container records.
//!
//! ```text
//! archive header   "JPA" header_len:u16 major:u8 minor:u8 files:u32 usize:u32 csize:u32
//!                  then extra headers until header_len is consumed:
//!                  'J' 'P' 0x01 type:u8 len:u16 payload   (len counts itself, not the tag)
//! entity block     "JPF" block_len:u16 path_len:u16 path kind:u8 method:u8
//!                  csize:u32 usize:u32 perms:u32
//!                  then extra fields until block_len is consumed:
//!                  tag:u16 len:u16 payload               (len counts tag and itself)
//! ```

use super::primitives::{ByteSource, PrimitiveReader};
use super::{CompressionMethod, EntityKind};
use crate::error::{ArchiveError, Result};

pub const ARCHIVE_SIGNATURE: &[u8; 3] = b"JPA";
pub const ENTITY_SIGNATURE: &[u8; 3] = b"JPF";

/// Extra header type: spanned archive marker.
const EXTRA_SPANNED: u8 = 0x01;
/// Extra field tag: modification timestamp.
const FIELD_TIMESTAMP: [u8; 2] = [0x00, 0x01];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpaArchiveHeader {
    pub header_length: u16,
    pub major_version: u8,
    pub minor_version: u8,
    pub file_count: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    /// From the spanned archive marker, 1 when absent.
    pub total_parts: u16,
}

pub struct JpaArchiveHeaderParser;

impl JpaArchiveHeaderParser {
    pub const HEADER_SIZE: usize = 19;

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<JpaArchiveHeader> {
        let signature: [u8; 3] = source.read_array()?;
        if &signature != ARCHIVE_SIGNATURE {
            return Err(ArchiveError::InvalidArchiveSignature {
                expected: ARCHIVE_SIGNATURE,
                found: signature.to_vec(),
            });
        }

        let mut header = JpaArchiveHeader {
            header_length: source.read_u16()?,
            major_version: source.read_u8()?,
            minor_version: source.read_u8()?,
            file_count: source.read_u32()?,
            uncompressed_size: source.read_u32()?,
            compressed_size: source.read_u32()?,
            total_parts: 1,
        };

        let mut remaining = (header.header_length as i64 - Self::HEADER_SIZE as i64).max(0);
        while remaining > 0 {
            let tag: [u8; 4] = source.read_array()?;
            if tag[..3] != [b'J', b'P', 0x01] {
                return Err(ArchiveError::InvalidHeader(format!(
                    "unknown archive extra header {:02x?}",
                    tag
                )));
            }
            let length = source.read_u16()?;
            remaining -= 4 + length as i64;
            if remaining < 0 {
                return Err(ArchiveError::InvalidHeader(
                    "archive extra headers overrun the header length".into(),
                ));
            }

            match tag[3] {
                EXTRA_SPANNED => {
                    if length < 4 {
                        return Err(ArchiveError::InvalidHeader(format!(
                            "spanned archive marker is {} bytes long",
                            length
                        )));
                    }
                    header.total_parts = source.read_u16()?;
                    source.skip(length as u64 - 4)?;
                }
                other => {
                    return Err(ArchiveError::InvalidHeader(format!(
                        "unknown archive extra header type 0x{:02x}",
                        other
                    )));
                }
            }
        }

        Ok(header)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpaEntityHeader {
    pub block_length: u16,
    pub path: String,
    pub kind: EntityKind,
    pub compression: CompressionMethod,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub permissions: u32,
    pub timestamp: Option<i32>,
}

pub struct JpaEntityHeaderParser;

impl JpaEntityHeaderParser {
    /// Block length without the path.
    pub const FIXED_SIZE: usize = 21;

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<JpaEntityHeader> {
        let start = source.position();
        let signature: [u8; 3] = source.read_array()?;
        if &signature != ENTITY_SIGNATURE {
            return Err(ArchiveError::InvalidHeader(format!(
                "expected entity block at offset {}, found {:02x?}",
                start, signature
            )));
        }

        let block_length = source.read_u16()?;
        let path_length = source.read_u16()?;
        let path = source.read_utf8(path_length as usize)?;
        let kind = EntityKind::from_byte(source.read_u8()?)?;
        let compression = CompressionMethod::from_byte(source.read_u8()?)?;
        let compressed_size = source.read_u32()?;
        let uncompressed_size = source.read_u32()?;
        let permissions = source.read_u32()?;

        let standard_length = Self::FIXED_SIZE as i64 + path_length as i64;
        if (block_length as i64) < standard_length {
            return Err(ArchiveError::InvalidHeader(format!(
                "entity block for {:?} declares {} bytes, needs {}",
                path, block_length, standard_length
            )));
        }

        let mut timestamp = None;
        let mut remaining = block_length as i64 - standard_length;
        while remaining > 0 {
            let tag: [u8; 2] = source.read_array()?;
            let length = source.read_u16()?;
            remaining -= length as i64;
            if remaining < 0 || length < 4 {
                return Err(ArchiveError::InvalidHeader(format!(
                    "extra field of {:?} overruns its entity block",
                    path
                )));
            }

            if tag == FIELD_TIMESTAMP {
                if length < 8 {
                    return Err(ArchiveError::InvalidHeader(format!(
                        "timestamp field of {:?} is {} bytes long",
                        path, length
                    )));
                }
                timestamp = Some(source.read_i32()?);
                source.skip(length as u64 - 8)?;
            } else {
                return Err(ArchiveError::InvalidHeader(format!(
                    "unknown extra field {:02x?} in {:?}",
                    tag, path
                )));
            }
        }

        Ok(JpaEntityHeader {
            block_length,
            path,
            kind,
            compression,
            compressed_size,
            uncompressed_size,
            permissions,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::SliceReader;

    fn archive_header(header_len: u16, extra: &[u8]) -> Vec<u8> {
        let mut buf = b"JPA".to_vec();
        buf.extend_from_slice(&header_len.to_le_bytes());
        buf.extend_from_slice(&[1, 2]); // version 1.2
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&300u32.to_le_bytes());
        buf.extend_from_slice(&120u32.to_le_bytes());
        buf.extend_from_slice(extra);
        buf
    }

    fn entity(path: &str, kind: u8, method: u8, extra: &[u8]) -> Vec<u8> {
        let block_len = (21 + path.len() + extra.len()) as u16;
        let mut buf = b"JPF".to_vec();
        buf.extend_from_slice(&block_len.to_le_bytes());
        buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
        buf.extend_from_slice(path.as_bytes());
        buf.push(kind);
        buf.push(method);
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&20u32.to_le_bytes());
        buf.extend_from_slice(&0o644u32.to_le_bytes());
        buf.extend_from_slice(extra);
        buf
    }

    #[test]
    fn test_parse_plain_archive_header() {
        let data = archive_header(19, &[]);
        let mut reader = SliceReader::new(&data);
        let header = JpaArchiveHeaderParser::parse(&mut reader).unwrap();
        assert_eq!(header.major_version, 1);
        assert_eq!(header.minor_version, 2);
        assert_eq!(header.file_count, 3);
        assert_eq!(header.uncompressed_size, 300);
        assert_eq!(header.compressed_size, 120);
        assert_eq!(header.total_parts, 1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_parse_spanned_marker() {
        let extra = [b'J', b'P', 0x01, 0x01, 4, 0, 7, 0];
        let data = archive_header(27, &extra);
        let mut reader = SliceReader::new(&data);
        let header = JpaArchiveHeaderParser::parse(&mut reader).unwrap();
        assert_eq!(header.total_parts, 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unknown_extra_header_is_fatal() {
        let extra = [b'J', b'P', 0x01, 0x09, 4, 0, 7, 0];
        let data = archive_header(27, &extra);
        assert!(matches!(
            JpaArchiveHeaderParser::parse(&mut SliceReader::new(&data)),
            Err(ArchiveError::InvalidHeader(_))
        ));

        let extra = [b'X', b'P', 0x01, 0x01, 4, 0, 7, 0];
        let data = archive_header(27, &extra);
        assert!(JpaArchiveHeaderParser::parse(&mut SliceReader::new(&data)).is_err());
    }

    #[test]
    fn test_bad_signature() {
        let mut data = archive_header(19, &[]);
        data[..3].copy_from_slice(b"XXX");
        match JpaArchiveHeaderParser::parse(&mut SliceReader::new(&data)) {
            Err(ArchiveError::InvalidArchiveSignature { found, .. }) => assert_eq!(found, b"XXX"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_entity_with_timestamp() {
        let mut extra = vec![0x00, 0x01, 8, 0];
        extra.extend_from_slice(&1_600_000_000i32.to_le_bytes());
        let data = entity("site/index.php", 1, 1, &extra);
        let mut reader = SliceReader::new(&data);
        let header = JpaEntityHeaderParser::parse(&mut reader).unwrap();
        assert_eq!(header.path, "site/index.php");
        assert_eq!(header.kind, EntityKind::File);
        assert_eq!(header.compression, CompressionMethod::Deflate);
        assert_eq!(header.compressed_size, 10);
        assert_eq!(header.uncompressed_size, 20);
        assert_eq!(header.permissions, 0o644);
        assert_eq!(header.timestamp, Some(1_600_000_000));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_entity_extra_field_errors() {
        // Unknown tag
        let data = entity("a", 1, 0, &[0x00, 0x02, 8, 0, 0, 0, 0, 0]);
        assert!(matches!(
            JpaEntityHeaderParser::parse(&mut SliceReader::new(&data)),
            Err(ArchiveError::InvalidHeader(_))
        ));

        // Field longer than what is left of the block
        let data = entity("a", 1, 0, &[0x00, 0x01, 12, 0, 0, 0, 0, 0]);
        assert!(matches!(
            JpaEntityHeaderParser::parse(&mut SliceReader::new(&data)),
            Err(ArchiveError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_entity_type_and_method_validation() {
        let data = entity("a", 5, 0, &[]);
        assert!(matches!(
            JpaEntityHeaderParser::parse(&mut SliceReader::new(&data)),
            Err(ArchiveError::InvalidEntityType(5))
        ));
        let data = entity("a", 1, 3, &[]);
        assert!(matches!(
            JpaEntityHeaderParser::parse(&mut SliceReader::new(&data)),
            Err(ArchiveError::UnsupportedCompressionMethod(3))
        ));
    }
}
