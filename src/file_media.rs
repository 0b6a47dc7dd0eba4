//! Part files on disk and archive set discovery.
//!
//! An archive set is named after its *last* part (`backup.jpa`). Earlier parts
//! replace the extension with its first letter plus a two-digit 1-based index
//! (`backup.j01`, `backup.j02`, ...).

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};
use crate::formats::ArchiveFormat;

/// One part file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileMedia {
    path: PathBuf,
    name: String,
    length: u64,
}

impl LocalFileMedia {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            length: metadata.len(),
        })
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Path of part `part` (1-based) in a set of `parts` whose last part is `last_part`.
pub fn part_path(last_part: &Path, part: usize, parts: usize) -> PathBuf {
    if part == parts {
        return last_part.to_path_buf();
    }
    let letter = last_part
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.chars().next())
        .unwrap_or('p');
    last_part.with_extension(format!("{}{:02}", letter, part))
}

/// Count the parts of a set by probing `<L>01`, `<L>02`, ... until one is missing.
pub fn discover_part_count(last_part: &Path) -> usize {
    let mut found = 0;
    // Probing with an index past the end yields a sibling name, never the last part.
    while part_path(last_part, found + 1, usize::MAX).is_file() {
        found += 1;
    }
    found + 1
}

/// Identifies one archive set: its last part, format and (lazily) part count.
#[derive(Debug)]
pub struct ArchiveHandle {
    path: PathBuf,
    format: ArchiveFormat,
    parts: OnceCell<usize>,
}

impl ArchiveHandle {
    /// Name an archive set by its last part. The extension selects the format.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = ArchiveFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            parts: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Number of parts, discovered on first use and cached afterwards.
    pub fn part_count(&self) -> usize {
        *self.parts.get_or_init(|| {
            let parts = discover_part_count(&self.path);
            tracing::debug!(archive = %self.path.display(), parts, "discovered archive parts");
            parts
        })
    }

    pub fn part_path(&self, part: usize) -> PathBuf {
        part_path(&self.path, part, self.part_count())
    }

    /// Stat every part of the set, in order.
    pub fn media(&self) -> Result<Vec<LocalFileMedia>> {
        let parts = self.part_count();
        (1..=parts)
            .map(|part| {
                let path = self.part_path(part);
                LocalFileMedia::new(&path).map_err(|_| ArchiveError::PartFileMissing { part, path })
            })
            .collect()
    }
}
