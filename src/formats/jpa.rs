//! JPA extraction state machine.

use super::{ArchiveFormat, ArchiveParser, EntityDescriptor};
use crate::error::Result;
use crate::parsing::jpa::JpaArchiveHeader;
use crate::parsing::{ByteSource, JpaArchiveHeaderParser, JpaEntityHeaderParser};
use crate::part_reader::PartReader;
use crate::processor::{self, ProcessContext};
use crate::progress::{ArchiveSummary, Flow};

pub struct JpaParser {
    reader: PartReader,
    header: Option<JpaArchiveHeader>,
}

impl JpaParser {
    pub fn new(reader: PartReader) -> Self {
        Self {
            reader,
            header: None,
        }
    }

    pub fn header(&self) -> Option<&JpaArchiveHeader> {
        self.header.as_ref()
    }
}

impl ArchiveParser for JpaParser {
    fn read_archive_header(&mut self) -> Result<ArchiveSummary> {
        self.reader.open(1)?;
        let header = JpaArchiveHeaderParser::parse(&mut self.reader)?;
        tracing::debug!(
            version = %format_args!("{}.{}", header.major_version, header.minor_version),
            files = header.file_count,
            declared_parts = header.total_parts,
            "read JPA header"
        );
        if header.total_parts as usize != self.reader.part_count() {
            tracing::warn!(
                declared = header.total_parts,
                found = self.reader.part_count(),
                "part count differs from the archive header"
            );
        }

        let summary = ArchiveSummary {
            format: ArchiveFormat::Jpa,
            file_count: header.file_count as u64,
            compressed_size: header.compressed_size as u64,
            uncompressed_size: header.uncompressed_size as u64,
            archive_size: self.reader.total_size(),
            parts: self.reader.part_count(),
            declared_parts: header.total_parts as usize,
        };
        self.header = Some(header);
        Ok(summary)
    }

    fn read_next_entity(&mut self) -> Result<Option<EntityDescriptor>> {
        if self.reader.position() >= self.reader.total_size() {
            return Ok(None);
        }

        let cursor = self.reader.normalized_cursor()?;
        let header = JpaEntityHeaderParser::parse(&mut self.reader)?;
        tracing::debug!(path = %header.path, kind = ?header.kind, "decoded entity");

        Ok(Some(EntityDescriptor {
            stored_path: header.path,
            absolute_path: None,
            kind: header.kind,
            compression: header.compression,
            compressed_size: header.compressed_size as u64,
            uncompressed_size: header.uncompressed_size as u64,
            permissions: header.permissions,
            modified: header.timestamp.map(i64::from),
            part_number: cursor.part.unwrap_or(1),
            part_offset: cursor.offset,
            crc32: None,
        }))
    }

    fn process_entity(
        &mut self,
        entity: &EntityDescriptor,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<Flow> {
        processor::process_plain_entity(&mut self.reader, entity, ctx)
    }

    fn position(&self) -> u64 {
        self.reader.position()
    }

    fn close(&mut self) {
        self.reader.close();
    }
}
