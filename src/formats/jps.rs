//! JPS extraction state machine.
//!
//! The archive totals live in an End-of-Archive trailer at the very end of the
//! last part, so the header pass reads part 1, jumps to the trailer, and comes
//! back to the first entity. Entity headers and payload blocks are encrypted
//! independently.

use super::{ArchiveFormat, ArchiveParser, EntityDescriptor};
use crate::crypto::BlockDecryptor;
use crate::error::{ArchiveError, Result};
use crate::parsing::jps::JpsArchiveHeader;
use crate::parsing::{
    ByteSource, JpsArchiveHeaderParser, JpsEndOfArchiveParser, JpsEntityHeaderParser,
    PrimitiveReader, SliceReader,
};
use crate::part_reader::PartReader;
use crate::processor::{self, ProcessContext};
use crate::progress::{ArchiveSummary, Flow};

pub struct JpsParser {
    reader: PartReader,
    password: Option<String>,
    header: Option<JpsArchiveHeader>,
    decryptor: Option<BlockDecryptor>,
    /// Global position of the End-of-Archive trailer.
    entities_end: u64,
}

impl JpsParser {
    pub fn new(reader: PartReader, password: Option<String>) -> Self {
        Self {
            reader,
            password,
            header: None,
            decryptor: None,
            entities_end: 0,
        }
    }

    pub fn header(&self) -> Option<&JpsArchiveHeader> {
        self.header.as_ref()
    }

    fn decryptor(&mut self) -> Result<&mut BlockDecryptor> {
        self.decryptor
            .as_mut()
            .ok_or_else(|| ArchiveError::InvalidHeader("archive header has not been read".into()))
    }
}

impl ArchiveParser for JpsParser {
    fn read_archive_header(&mut self) -> Result<ArchiveSummary> {
        let password = match self.password.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => return Err(ArchiveError::EmptyPassword),
        };

        self.reader.open(1)?;
        let header = JpsArchiveHeaderParser::parse(&mut self.reader)?;
        tracing::debug!(
            version = %format_args!("{}.{}", header.major_version, header.minor_version),
            spanned = header.spanned,
            pbkdf2 = header.pbkdf2.is_some(),
            "read JPS header"
        );
        let decryptor = BlockDecryptor::new(password, header.pbkdf2.clone())?;

        let last = self.reader.part_count();
        let last_length = self.reader.part_length(last)?;
        let trailer_offset = last_length
            .checked_sub(JpsEndOfArchiveParser::SIZE as u64)
            .ok_or(ArchiveError::BufferTooSmall {
                needed: JpsEndOfArchiveParser::SIZE,
                have: last_length as usize,
            })?;
        self.reader.open(last)?;
        self.reader.skip(trailer_offset)?;
        let trailer = JpsEndOfArchiveParser::parse(&mut self.reader)?;
        if trailer.parts as usize != last {
            tracing::warn!(
                declared = trailer.parts,
                found = last,
                "part count differs from the end-of-archive record"
            );
        }

        self.reader.open(1)?;
        self.reader.skip(header.total_length())?;

        let total = self.reader.total_size();
        self.entities_end = total.saturating_sub(JpsEndOfArchiveParser::SIZE as u64);
        self.decryptor = Some(decryptor);
        self.header = Some(header);

        Ok(ArchiveSummary {
            format: ArchiveFormat::Jps,
            file_count: trailer.file_count as u64,
            compressed_size: trailer.compressed_size as u64,
            uncompressed_size: trailer.uncompressed_size as u64,
            archive_size: total,
            parts: last,
            declared_parts: trailer.parts as usize,
        })
    }

    fn read_next_entity(&mut self) -> Result<Option<EntityDescriptor>> {
        if self.reader.position() >= self.entities_end {
            return Ok(None);
        }

        let cursor = self.reader.normalized_cursor()?;
        let preamble = JpsEntityHeaderParser::parse_preamble(&mut self.reader)?;
        let encrypted = self.reader.read_buffer(preamble.encrypted_size as usize)?;
        let plain = self.decryptor()?.decrypt(&encrypted)?;
        if plain.len() != preamble.decrypted_size as usize {
            return Err(ArchiveError::DecryptionSizeMismatch {
                expected: preamble.decrypted_size as usize,
                actual: plain.len(),
            });
        }

        let header = JpsEntityHeaderParser::parse(&mut SliceReader::new(&plain))?;
        tracing::debug!(path = %header.path, kind = ?header.kind, "decoded entity");

        Ok(Some(EntityDescriptor {
            stored_path: header.path,
            absolute_path: None,
            kind: header.kind,
            compression: header.compression,
            compressed_size: 0,
            uncompressed_size: header.uncompressed_size as u64,
            permissions: header.permissions,
            modified: Some(header.modified as i64),
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
        let decryptor = self
            .decryptor
            .as_mut()
            .ok_or_else(|| ArchiveError::InvalidHeader("archive header has not been read".into()))?;
        processor::process_encrypted_entity(&mut self.reader, decryptor, entity, ctx)
    }

    fn position(&self) -> u64 {
        self.reader.position()
    }

    fn close(&mut self) {
        self.reader.close();
    }
}
