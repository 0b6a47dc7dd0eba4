//! Spanning byte source over the parts of an archive set.
//!
//! [`PartReader`] makes `backup.j01`, `backup.j02`, ..., `backup.jpa` read as
//! one forward-only stream. Only one part file is open at a time; reaching the
//! end of a part closes it and opens the next.

use std::fs::File;
use std::io::{self, BufReader, Read};

use crate::error::{ArchiveError, Result};
use crate::file_media::{ArchiveHandle, LocalFileMedia};
use crate::parsing::primitives::ByteSource;

/// Read position within an archive set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartCursor {
    /// Current 1-based part, `None` before the first read.
    pub part: Option<usize>,
    /// Byte offset within the current part.
    pub offset: u64,
    /// Total size of all parts before the current one.
    pub closed_bytes: u64,
}

impl PartCursor {
    pub fn global_position(&self) -> u64 {
        self.closed_bytes + self.offset
    }
}

/// Spanning reader over an ordered list of part files.
#[derive(Debug)]
pub struct PartReader {
    media: Vec<LocalFileMedia>,
    file: Option<BufReader<File>>,
    cursor: PartCursor,
}

impl PartReader {
    pub fn new(media: Vec<LocalFileMedia>) -> Self {
        Self {
            media,
            file: None,
            cursor: PartCursor::default(),
        }
    }

    /// Stat every part of `handle` and build a reader positioned before part 1.
    pub fn from_handle(handle: &ArchiveHandle) -> Result<Self> {
        Ok(Self::new(handle.media()?))
    }

    pub fn part_count(&self) -> usize {
        self.media.len()
    }

    /// Size of the whole set, last part included.
    pub fn total_size(&self) -> u64 {
        self.media.iter().map(LocalFileMedia::length).sum()
    }

    pub fn part_length(&self, part: usize) -> Result<u64> {
        self.check_part(part)?;
        Ok(self.media[part - 1].length())
    }

    pub fn cursor(&self) -> PartCursor {
        self.cursor
    }

    /// Cursor of the next byte to be read.
    ///
    /// A reader parked at the end of a part is moved to the start of the
    /// next non-empty part, so entity offsets match what the archive records.
    /// The last part is never left.
    pub fn normalized_cursor(&mut self) -> Result<PartCursor> {
        let mut part = self.current_part()?;
        while self.remaining_in_part(part) == 0 && part < self.media.len() {
            self.open(part + 1)?;
            part += 1;
        }
        Ok(self.cursor)
    }

    fn check_part(&self, part: usize) -> Result<()> {
        if part == 0 || part > self.media.len() {
            return Err(ArchiveError::PartOutOfRange {
                part,
                parts: self.media.len(),
            });
        }
        Ok(())
    }

    /// Close the open part and position at the start of `part`.
    pub fn open(&mut self, part: usize) -> Result<()> {
        self.check_part(part)?;
        self.file = None;

        let media = &self.media[part - 1];
        let file = File::open(media.path()).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ArchiveError::PartFileMissing {
                part,
                path: media.path().to_path_buf(),
            },
            _ => ArchiveError::Io(e),
        })?;
        tracing::debug!(part, name = media.name(), length = media.length(), "opened part");

        self.file = Some(BufReader::new(file));
        self.cursor = PartCursor {
            part: Some(part),
            offset: 0,
            closed_bytes: self.media[..part - 1].iter().map(LocalFileMedia::length).sum(),
        };
        Ok(())
    }

    /// Close the open part and forget the position.
    pub fn close(&mut self) {
        self.file = None;
        self.cursor = PartCursor::default();
    }

    /// Current part, opening part 1 on first use.
    fn current_part(&mut self) -> Result<usize> {
        match self.cursor.part {
            Some(part) if self.file.is_some() => Ok(part),
            Some(part) => {
                let offset = self.cursor.offset;
                self.open(part)?;
                self.skip_in_part(offset)?;
                Ok(part)
            }
            None => {
                self.open(1)?;
                Ok(1)
            }
        }
    }

    fn remaining_in_part(&self, part: usize) -> u64 {
        self.media[part - 1].length().saturating_sub(self.cursor.offset)
    }

    fn skip_in_part(&mut self, n: u64) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.seek_relative(n as i64)?;
        }
        self.cursor.offset += n;
        Ok(())
    }
}

impl ByteSource for PartReader {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let part = self.current_part()?;
            let remaining = self.remaining_in_part(part);
            if remaining == 0 {
                if part == self.media.len() {
                    break;
                }
                self.open(part + 1)?;
                continue;
            }

            let want = ((buf.len() - filled) as u64).min(remaining) as usize;
            let Some(file) = self.file.as_mut() else {
                break;
            };
            let n = file.read(&mut buf[filled..filled + want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("part {} is shorter than its recorded length", part),
                )
                .into());
            }
            filled += n;
            self.cursor.offset += n as u64;
        }
        Ok(filled)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let mut left = n;
        while left > 0 {
            let part = self.current_part()?;
            let remaining = self.remaining_in_part(part);
            if remaining == 0 {
                // Also rejects skipping past the end of the last part.
                self.open(part + 1)?;
                continue;
            }
            let step = left.min(remaining);
            self.skip_in_part(step)?;
            left -= step;
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor.global_position()
    }
}
