//! Archive formats and the per-format extraction state machines.
//!
//! Every format walks the same cycle: read the archive header once, then
//! alternate between decoding an entity header and processing its payload until
//! the format's end marker is reached. [`FormatParser`] picks the machine from
//! the archive's extension.

pub mod jpa;
pub mod jps;
pub mod zip;

pub use jpa::JpaParser;
pub use jps::JpsParser;
pub use zip::ZipParser;

use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};
use crate::file_media::ArchiveHandle;
use crate::parsing::{CompressionMethod, EntityKind};
use crate::part_reader::PartReader;
use crate::processor::ProcessContext;
use crate::progress::{ArchiveSummary, Flow};
use crate::unarchiver::ExtractOptions;

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Plain block-structured backup archive.
    Jpa,
    /// Encrypted variant of JPA.
    Jps,
    Zip,
}

impl ArchiveFormat {
    /// Select a format from a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "jpa" => Ok(Self::Jpa),
            "jps" => Ok(Self::Jps),
            "zip" => Ok(Self::Zip),
            _ => Err(ArchiveError::UnsupportedExtension(extension.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpa => "jpa",
            Self::Jps => "jps",
            Self::Zip => "zip",
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Jps)
    }
}

/// One directory, file or symlink record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Archive-relative, forward-slash separated.
    pub stored_path: String,
    /// Where the sink will place the entity, if it maps to a filesystem.
    pub absolute_path: Option<PathBuf>,
    pub kind: EntityKind,
    pub compression: CompressionMethod,
    /// Declared payload size. Zero for JPS, which only learns it while streaming.
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub permissions: u32,
    /// Unix seconds. Absent in JPA archives without a timestamp extra field.
    pub modified: Option<i64>,
    /// 1-based part holding the start of the entity header.
    pub part_number: usize,
    /// Offset of the entity header within that part.
    pub part_offset: u64,
    /// Declared CRC-32 (ZIP only).
    pub crc32: Option<u32>,
}

impl EntityDescriptor {
    /// Path handed to directory and symlink sink operations.
    pub fn sink_path(&self) -> PathBuf {
        self.absolute_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.stored_path))
    }
}

/// One format's extraction state machine.
pub trait ArchiveParser {
    /// Validate the archive header and position at the first entity.
    fn read_archive_header(&mut self) -> Result<ArchiveSummary>;

    /// Decode the next entity header, or `None` once the archive end is reached.
    fn read_next_entity(&mut self) -> Result<Option<EntityDescriptor>>;

    /// Consume the payload of the entity just returned by `read_next_entity`.
    fn process_entity(
        &mut self,
        entity: &EntityDescriptor,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<Flow>;

    /// Global position in the archive set.
    fn position(&self) -> u64;

    /// Release the open part file.
    fn close(&mut self);
}

/// Closed set of format parsers, chosen by extension.
pub enum FormatParser {
    Jpa(JpaParser),
    Jps(JpsParser),
    Zip(ZipParser),
}

impl FormatParser {
    pub fn new(handle: &ArchiveHandle, options: &ExtractOptions) -> Result<Self> {
        let reader = PartReader::from_handle(handle)?;
        Ok(match handle.format() {
            ArchiveFormat::Jpa => Self::Jpa(JpaParser::new(reader)),
            ArchiveFormat::Jps => Self::Jps(JpsParser::new(reader, options.password.clone())),
            ArchiveFormat::Zip => Self::Zip(ZipParser::new(reader)),
        })
    }

    pub fn format(&self) -> ArchiveFormat {
        match self {
            Self::Jpa(_) => ArchiveFormat::Jpa,
            Self::Jps(_) => ArchiveFormat::Jps,
            Self::Zip(_) => ArchiveFormat::Zip,
        }
    }
}

impl ArchiveParser for FormatParser {
    fn read_archive_header(&mut self) -> Result<ArchiveSummary> {
        match self {
            Self::Jpa(p) => p.read_archive_header(),
            Self::Jps(p) => p.read_archive_header(),
            Self::Zip(p) => p.read_archive_header(),
        }
    }

    fn read_next_entity(&mut self) -> Result<Option<EntityDescriptor>> {
        match self {
            Self::Jpa(p) => p.read_next_entity(),
            Self::Jps(p) => p.read_next_entity(),
            Self::Zip(p) => p.read_next_entity(),
        }
    }

    fn process_entity(
        &mut self,
        entity: &EntityDescriptor,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<Flow> {
        match self {
            Self::Jpa(p) => p.process_entity(entity, ctx),
            Self::Jps(p) => p.process_entity(entity, ctx),
            Self::Zip(p) => p.process_entity(entity, ctx),
        }
    }

    fn position(&self) -> u64 {
        match self {
            Self::Jpa(p) => p.position(),
            Self::Jps(p) => p.position(),
            Self::Zip(p) => p.position(),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Jpa(p) => p.close(),
            Self::Jps(p) => p.close(),
            Self::Zip(p) => p.close(),
        }
    }
}
