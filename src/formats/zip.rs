//! ZIP extraction state machine.
//!
//! The header pass finds the End Of Central Directory record in the last part
//! and walks the central directory once for the archive totals. Extraction
//! then streams local file headers from part 1 until the central directory is
//! reached.

use std::collections::HashMap;

use super::{ArchiveFormat, ArchiveParser, EntityDescriptor};
use crate::error::{ArchiveError, Result};
use crate::parsing::zip::{EndOfCentralDirectory, SPANNED_SIGNATURES, SYMLINK_VERSION};
use crate::parsing::{
    ByteSource, CentralDirectoryParser, CompressionMethod, EndOfCentralDirectoryParser, EntityKind,
    LocalFileHeaderParser, PrimitiveReader, SliceReader,
};
use crate::part_reader::PartReader;
use crate::processor::{self, ProcessContext};
use crate::progress::{ArchiveSummary, Flow};

/// What the central directory knows about one entry.
#[derive(Debug, Clone, Copy)]
struct CentralRecord {
    compressed: u32,
    uncompressed: u32,
    crc32: u32,
    /// UNIX mode bits from the high half of the external attributes.
    permissions: u32,
}

pub struct ZipParser {
    reader: PartReader,
    eocd: Option<EndOfCentralDirectory>,
    /// Global position of the central directory.
    central_directory_start: u64,
    /// Keyed by (1-based part, offset of the local header).
    records: HashMap<(usize, u64), CentralRecord>,
    /// The entity being processed is followed by a data descriptor.
    pending_descriptor: bool,
}

impl ZipParser {
    pub fn new(reader: PartReader) -> Self {
        Self {
            reader,
            eocd: None,
            central_directory_start: 0,
            records: HashMap::new(),
            pending_descriptor: false,
        }
    }

    pub fn end_of_central_directory(&self) -> Option<&EndOfCentralDirectory> {
        self.eocd.as_ref()
    }

    fn locate_eocd(&mut self) -> Result<EndOfCentralDirectory> {
        let last = self.reader.part_count();
        let length = self.reader.part_length(last)?;
        let window = length.min(
            (EndOfCentralDirectoryParser::SIZE + EndOfCentralDirectoryParser::MAX_COMMENT) as u64,
        );

        self.reader.open(last)?;
        self.reader.skip(length - window)?;
        let tail = self.reader.read_buffer(window as usize)?;
        let offset = EndOfCentralDirectoryParser::find(&tail).ok_or(ArchiveError::EocdNotFound)?;
        EndOfCentralDirectoryParser::parse(&mut SliceReader::new(&tail[offset..]))
    }
}

impl ArchiveParser for ZipParser {
    fn read_archive_header(&mut self) -> Result<ArchiveSummary> {
        let eocd = self.locate_eocd()?;
        tracing::debug!(
            entries = eocd.total_entries,
            cd_disk = eocd.cd_disk,
            cd_offset = eocd.cd_offset,
            comment_length = eocd.comment.len(),
            "found end of central directory"
        );

        let cd_part = eocd.cd_disk as usize + 1;
        self.reader.open(cd_part)?;
        self.central_directory_start = self.reader.position() + eocd.cd_offset as u64;
        self.reader.skip(eocd.cd_offset as u64)?;

        let mut compressed = 0u64;
        let mut uncompressed = 0u64;
        self.records.clear();
        for _ in 0..eocd.total_entries {
            let entry = CentralDirectoryParser::parse(&mut self.reader)?;
            compressed += entry.compressed_size as u64;
            uncompressed += entry.uncompressed_size as u64;
            self.records.insert(
                (entry.disk_start as usize + 1, entry.local_header_offset as u64),
                CentralRecord {
                    compressed: entry.compressed_size,
                    uncompressed: entry.uncompressed_size,
                    crc32: entry.crc32,
                    permissions: entry.external_attributes >> 16,
                },
            );
        }

        self.reader.open(1)?;
        let marker: [u8; 4] = self.reader.read_array()?;
        if !SPANNED_SIGNATURES.contains(&marker) {
            self.reader.open(1)?;
        }
        if eocd.disk_number as usize + 1 != self.reader.part_count() {
            tracing::warn!(
                declared = eocd.disk_number as usize + 1,
                found = self.reader.part_count(),
                "part count differs from the end of central directory"
            );
        }

        let summary = ArchiveSummary {
            format: ArchiveFormat::Zip,
            file_count: eocd.total_entries as u64,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            archive_size: self.reader.total_size(),
            parts: self.reader.part_count(),
            declared_parts: eocd.disk_number as usize + 1,
        };
        self.eocd = Some(eocd);
        Ok(summary)
    }

    fn read_next_entity(&mut self) -> Result<Option<EntityDescriptor>> {
        let position = self.reader.position();
        if position >= self.central_directory_start || position >= self.reader.total_size() {
            return Ok(None);
        }

        let cursor = self.reader.normalized_cursor()?;
        let part = cursor.part.unwrap_or(1);
        let header = LocalFileHeaderParser::parse(&mut self.reader)?;

        let kind = if header.name.ends_with('/') {
            EntityKind::Directory
        } else if header.version_needed == SYMLINK_VERSION {
            EntityKind::Symlink
        } else {
            EntityKind::File
        };
        let compression = CompressionMethod::from_zip_code(header.method)?;

        let record = self.records.get(&(part, cursor.offset)).copied();
        let (compressed, uncompressed, crc32) = if header.has_data_descriptor() {
            let Some(record) = record else {
                return Err(ArchiveError::InvalidHeader(format!(
                    "{} defers its sizes but has no central directory record",
                    header.name
                )));
            };
            (record.compressed, record.uncompressed, record.crc32)
        } else {
            (header.compressed_size, header.uncompressed_size, header.crc32)
        };
        self.pending_descriptor = header.has_data_descriptor();
        tracing::debug!(path = %header.name, ?kind, ?compression, "decoded entity");

        Ok(Some(EntityDescriptor {
            modified: Some(header.modified()),
            stored_path: header.name,
            absolute_path: None,
            kind,
            compression,
            compressed_size: compressed as u64,
            uncompressed_size: uncompressed as u64,
            permissions: record.map_or(0, |r| r.permissions),
            part_number: part,
            part_offset: cursor.offset,
            crc32: (kind == EntityKind::File).then_some(crc32),
        }))
    }

    fn process_entity(
        &mut self,
        entity: &EntityDescriptor,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<Flow> {
        let flow = processor::process_plain_entity(&mut self.reader, entity, ctx)?;
        if flow == Flow::Continue && self.pending_descriptor {
            LocalFileHeaderParser::skip_data_descriptor(&mut self.reader)?;
            ctx.progress.file_position = self.reader.position();
        }
        self.pending_descriptor = false;
        Ok(flow)
    }

    fn position(&self) -> u64 {
        self.reader.position()
    }

    fn close(&mut self) {
        self.reader.close();
    }
}
