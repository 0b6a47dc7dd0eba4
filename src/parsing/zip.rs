//! ZIP records: End Of Central Directory, central directory entries and
//! local file headers. ZIP64 records are not understood.

use super::primitives::{ByteSource, PrimitiveReader};
use crate::error::{ArchiveError, Result};

pub const EOCD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";
pub const CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = *b"PK\x01\x02";
pub const LOCAL_FILE_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
pub const DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = *b"PK\x07\x08";
/// Markers a split archive may start with.
pub const SPANNED_SIGNATURES: [[u8; 4]; 2] = [*b"PK\x07\x08", *b"PK00"];
/// "Version needed to extract" used for symbolic links (UNIX host, 1.6).
pub const SYMLINK_VERSION: u16 = 0x0310;

const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    /// 0-based disk holding the start of the central directory.
    pub cd_disk: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_length: u32,
    /// Offset of the central directory within `cd_disk`.
    pub cd_offset: u32,
    pub comment: String,
}

pub struct EndOfCentralDirectoryParser;

impl EndOfCentralDirectoryParser {
    pub const SIZE: usize = 22;
    pub const MAX_COMMENT: usize = 65535;

    /// Find the record in the tail of the last part, scanning backwards one
    /// byte at a time from the last position it could start at.
    pub fn find(tail: &[u8]) -> Option<usize> {
        let last = tail.len().checked_sub(Self::SIZE)?;
        (0..=last)
            .rev()
            .find(|&offset| tail[offset..offset + 4] == EOCD_SIGNATURE)
    }

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<EndOfCentralDirectory> {
        let signature: [u8; 4] = source.read_array()?;
        if signature != EOCD_SIGNATURE {
            return Err(ArchiveError::EocdNotFound);
        }
        let disk_number = source.read_u16()?;
        let cd_disk = source.read_u16()?;
        let disk_entries = source.read_u16()?;
        let total_entries = source.read_u16()?;
        let cd_length = source.read_u32()?;
        let cd_offset = source.read_u32()?;
        let comment_length = source.read_u16()?;
        let comment = source.read_utf8(comment_length as usize)?;

        Ok(EndOfCentralDirectory {
            disk_number,
            cd_disk,
            disk_entries,
            total_entries,
            cd_length,
            cd_offset,
            comment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryEntry {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub name: String,
}

pub struct CentralDirectoryParser;

impl CentralDirectoryParser {
    pub const FIXED_SIZE: usize = 46;

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<CentralDirectoryEntry> {
        let start = source.position();
        let signature: [u8; 4] = source.read_array()?;
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ArchiveError::InvalidHeader(format!(
                "expected central directory entry at offset {}, found {:02x?}",
                start, signature
            )));
        }

        let version_made_by = source.read_u16()?;
        let version_needed = source.read_u16()?;
        let flags = source.read_u16()?;
        let method = source.read_u16()?;
        let mod_time = source.read_u16()?;
        let mod_date = source.read_u16()?;
        let crc32 = source.read_u32()?;
        let compressed_size = source.read_u32()?;
        let uncompressed_size = source.read_u32()?;
        let name_length = source.read_u16()?;
        let extra_length = source.read_u16()?;
        let comment_length = source.read_u16()?;
        let disk_start = source.read_u16()?;
        let internal_attributes = source.read_u16()?;
        let external_attributes = source.read_u32()?;
        let local_header_offset = source.read_u32()?;
        let name = source.read_utf8(name_length as usize)?;
        source.skip(extra_length as u64 + comment_length as u64)?;

        Ok(CentralDirectoryEntry {
            version_made_by,
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_start,
            internal_attributes,
            external_attributes,
            local_header_offset,
            name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: String,
}

impl LocalFileHeader {
    /// Sizes and CRC follow the payload instead of living in this header.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn modified(&self) -> i64 {
        dos_datetime_to_unix(self.mod_time, self.mod_date)
    }
}

pub struct LocalFileHeaderParser;

impl LocalFileHeaderParser {
    pub const FIXED_SIZE: usize = 30;

    pub fn parse<S: ByteSource + ?Sized>(source: &mut S) -> Result<LocalFileHeader> {
        let start = source.position();
        let signature: [u8; 4] = source.read_array()?;
        if signature != LOCAL_FILE_SIGNATURE {
            return Err(ArchiveError::InvalidHeader(format!(
                "expected local file header at offset {}, found {:02x?}",
                start, signature
            )));
        }

        let version_needed = source.read_u16()?;
        let flags = source.read_u16()?;
        let method = source.read_u16()?;
        let mod_time = source.read_u16()?;
        let mod_date = source.read_u16()?;
        let crc32 = source.read_u32()?;
        let compressed_size = source.read_u32()?;
        let uncompressed_size = source.read_u32()?;
        let name_length = source.read_u16()?;
        let extra_length = source.read_u16()?;
        let name = source.read_utf8(name_length as usize)?;
        source.skip(extra_length as u64)?;

        Ok(LocalFileHeader {
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
        })
    }

    /// Skip the data descriptor that follows a payload, with or without its
    /// optional signature.
    pub fn skip_data_descriptor<S: ByteSource + ?Sized>(source: &mut S) -> Result<()> {
        let first: [u8; 4] = source.read_array()?;
        if first == DATA_DESCRIPTOR_SIGNATURE {
            source.skip(12)
        } else {
            source.skip(8)
        }
    }
}

/// Convert an MS-DOS date and time pair to Unix seconds (local time taken as UTC).
pub fn dos_datetime_to_unix(time: u16, date: u16) -> i64 {
    let second = ((time & 0x1f) * 2) as i64;
    let minute = ((time >> 5) & 0x3f) as i64;
    let hour = ((time >> 11) & 0x1f) as i64;
    let day = ((date & 0x1f) as i64).max(1);
    let month = (((date >> 5) & 0x0f) as i64).clamp(1, 12);
    let year = ((date >> 9) as i64) + 1980;

    let is_leap = |y: i64| y % 4 == 0 && (y % 100 != 0 || y % 400 == 0);
    let mut days: i64 = (1970..year).map(|y| if is_leap(y) { 366 } else { 365 }).sum();
    let month_days = [
        31,
        if is_leap(year) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    days += month_days[..(month - 1) as usize].iter().sum::<i64>();
    days += day - 1;

    days * 86400 + hour * 3600 + minute * 60 + second
}
