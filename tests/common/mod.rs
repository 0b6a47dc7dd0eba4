//! Archive builders and a recording sink shared by the integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use jpa_stream::crypto::{legacy_key, pbkdf2_sha1, seal_block};
use jpa_stream::{DataSink, ExtractEvent};

pub const DIRECTORY: u8 = 0;
pub const FILE: u8 = 1;
pub const SYMLINK: u8 = 2;

pub const STORED: u8 = 0;
pub const DEFLATE: u8 = 1;
pub const BZIP2: u8 = 2;

/// Sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<String>,
    /// Contents of finished files, in extraction order.
    pub files: Vec<(String, Vec<u8>)>,
    current: Option<(String, Vec<u8>)>,
}

impl RecordingSink {
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }
}

impl DataSink for RecordingSink {
    fn make_directory_recursive(&mut self, path: &Path) -> io::Result<()> {
        self.calls.push(format!("mkdir {}", path.display()));
        Ok(())
    }

    fn start_file(&mut self, relative_path: &str) -> io::Result<()> {
        self.calls.push(format!("start {}", relative_path));
        self.current = Some((relative_path.to_string(), Vec::new()));
        Ok(())
    }

    fn stop_file(&mut self) -> io::Result<()> {
        self.calls.push("stop".into());
        if let Some(file) = self.current.take() {
            self.files.push(file);
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.calls.push(format!("write {}", data.len()));
        if let Some((_, buf)) = self.current.as_mut() {
            buf.extend_from_slice(data);
        }
        Ok(())
    }

    fn make_symlink(&mut self, target: &str, link_path: &Path) -> io::Result<()> {
        self.calls.push(format!("symlink {} -> {}", link_path.display(), target));
        Ok(())
    }

    fn resolve_absolute_path(&self, _relative_path: &str) -> Option<PathBuf> {
        None
    }
}

/// Short name of each event, for order assertions.
pub fn event_kinds(events: &[ExtractEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            ExtractEvent::ArchiveInformation(_) => "summary",
            ExtractEvent::Entity(_) => "entity",
            ExtractEvent::Progress(_) => "progress",
        })
        .collect()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn compress(method: u8, data: &[u8]) -> Vec<u8> {
    match method {
        DEFLATE => deflate(data),
        BZIP2 => bzip2(data),
        _ => data.to_vec(),
    }
}

/// Write `data` as a part set named after `last`, cut at `sizes` (all but the last part).
pub fn write_parts(last: &Path, data: &[u8], sizes: &[usize]) -> Vec<PathBuf> {
    let letter = last
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.chars().next())
        .unwrap();
    let mut paths = Vec::new();
    let mut rest = data;
    for (i, &size) in sizes.iter().enumerate() {
        let path = last.with_extension(format!("{}{:02}", letter, i + 1));
        std::fs::write(&path, &rest[..size]).unwrap();
        rest = &rest[size..];
        paths.push(path);
    }
    std::fs::write(last, rest).unwrap();
    paths.push(last.to_path_buf());
    paths
}

pub struct Entry {
    pub path: String,
    pub kind: u8,
    pub method: u8,
    pub content: Vec<u8>,
    pub timestamp: Option<i32>,
}

impl Entry {
    pub fn file(path: &str, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            kind: FILE,
            method: STORED,
            content: content.to_vec(),
            timestamp: None,
        }
    }

    pub fn directory(path: &str) -> Self {
        Self {
            path: path.into(),
            kind: DIRECTORY,
            method: STORED,
            content: Vec::new(),
            timestamp: None,
        }
    }

    pub fn symlink(path: &str, target: &str) -> Self {
        Self {
            path: path.into(),
            kind: SYMLINK,
            method: STORED,
            content: target.as_bytes().to_vec(),
            timestamp: None,
        }
    }

    pub fn compressed(mut self, method: u8) -> Self {
        self.method = method;
        self
    }

    pub fn at(mut self, timestamp: i32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Build a JPA archive. `parts > 1` adds the spanned-archive extra header.
pub fn jpa_archive(entries: &[Entry], parts: u16) -> Vec<u8> {
    let mut body = Vec::new();
    let mut total_compressed = 0u32;
    let mut total_uncompressed = 0u32;

    for entry in entries {
        let payload = compress(entry.method, &entry.content);
        total_compressed += payload.len() as u32;
        total_uncompressed += entry.content.len() as u32;

        let extra = if entry.timestamp.is_some() { 8 } else { 0 };
        body.extend_from_slice(b"JPF");
        body.extend_from_slice(&((21 + entry.path.len() + extra) as u16).to_le_bytes());
        body.extend_from_slice(&(entry.path.len() as u16).to_le_bytes());
        body.extend_from_slice(entry.path.as_bytes());
        body.push(entry.kind);
        body.push(entry.method);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&(entry.content.len() as u32).to_le_bytes());
        body.extend_from_slice(&0o644u32.to_le_bytes());
        if let Some(ts) = entry.timestamp {
            body.extend_from_slice(&[0x00, 0x01]);
            body.extend_from_slice(&8u16.to_le_bytes());
            body.extend_from_slice(&ts.to_le_bytes());
        }
        body.extend_from_slice(&payload);
    }

    let mut out = b"JPA".to_vec();
    let header_length: u16 = if parts > 1 { 27 } else { 19 };
    out.extend_from_slice(&header_length.to_le_bytes());
    out.extend_from_slice(&[1, 2]);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    out.extend_from_slice(&total_uncompressed.to_le_bytes());
    out.extend_from_slice(&total_compressed.to_le_bytes());
    if parts > 1 {
        out.extend_from_slice(b"JP\x01\x01");
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&parts.to_le_bytes());
    }
    out.extend_from_slice(&body);
    out
}

/// Key derivation used for JPS fixtures.
pub enum JpsKeys {
    /// Format 1.10, legacy key and IV.
    Legacy,
    /// Format 2.0 with one archive-wide salt.
    StaticSalt { iterations: u32, salt: [u8; 64] },
    /// Format 2.0 with a fresh salt in every block.
    PerBlockSalt { iterations: u32, salt: [u8; 64] },
}

/// Build a JPS archive. File contents are split into blocks of `block_size` bytes.
pub fn jps_archive(entries: &[Entry], password: &str, keys: &JpsKeys, block_size: usize) -> Vec<u8> {
    jps_archive_in_parts(entries, password, keys, block_size, 1)
}

/// Same as [`jps_archive`], with `parts` recorded in the end-of-archive trailer.
pub fn jps_archive_in_parts(
    entries: &[Entry],
    password: &str,
    keys: &JpsKeys,
    block_size: usize,
    parts: u16,
) -> Vec<u8> {
    let mut out = b"JPS".to_vec();
    let iv = [0x5a; 16];

    let seal = |plaintext: &[u8], block_index: usize| -> Vec<u8> {
        match keys {
            JpsKeys::Legacy => seal_block(&legacy_key(password).unwrap(), None, None, plaintext),
            JpsKeys::StaticSalt { iterations, salt } => {
                seal_block(&pbkdf2_sha1(password, salt, *iterations), Some(&iv), None, plaintext)
            }
            JpsKeys::PerBlockSalt { iterations, salt } => {
                // Alternate between two salts to exercise the key cache.
                let mut salt = *salt;
                salt[0] ^= (block_index % 2) as u8;
                seal_block(&pbkdf2_sha1(password, &salt, *iterations), Some(&iv), Some(&salt), plaintext)
            }
        }
    };

    match keys {
        JpsKeys::Legacy => {
            out.extend_from_slice(&[1, 10, 0]);
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        JpsKeys::StaticSalt { iterations, salt } | JpsKeys::PerBlockSalt { iterations, salt } => {
            out.extend_from_slice(&[2, 0, 0]);
            out.extend_from_slice(&76u16.to_le_bytes());
            out.extend_from_slice(b"JH\x00\x01");
            out.extend_from_slice(&76u16.to_le_bytes());
            out.push(0);
            out.extend_from_slice(&iterations.to_le_bytes());
            out.push(u8::from(matches!(keys, JpsKeys::StaticSalt { .. })));
            out.extend_from_slice(salt);
        }
    }

    let mut block_index = 0;
    let mut total_compressed = 0u32;
    let mut total_uncompressed = 0u32;
    for entry in entries {
        let mut header = Vec::new();
        header.extend_from_slice(&(entry.path.len() as u16).to_le_bytes());
        header.extend_from_slice(entry.path.as_bytes());
        header.push(entry.kind);
        header.push(entry.method);
        header.extend_from_slice(&(entry.content.len() as u32).to_le_bytes());
        header.extend_from_slice(&0o644u32.to_le_bytes());
        header.extend_from_slice(&1_700_000_000u32.to_le_bytes());

        let sealed = seal(&header, block_index);
        block_index += 1;
        out.extend_from_slice(b"JPF");
        out.extend_from_slice(&(sealed.len() as u16).to_le_bytes());
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(&sealed);

        let chunks: Vec<&[u8]> = match entry.kind {
            DIRECTORY => Vec::new(),
            SYMLINK => vec![&entry.content[..]],
            _ => entry.content.chunks(block_size.max(1)).collect(),
        };
        for chunk in chunks {
            let data = if entry.kind == SYMLINK {
                chunk.to_vec()
            } else {
                compress(entry.method, chunk)
            };
            let sealed = seal(&data, block_index);
            block_index += 1;
            out.extend_from_slice(&(sealed.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&sealed);
            total_compressed += sealed.len() as u32;
        }
        total_uncompressed += entry.content.len() as u32;
    }

    out.extend_from_slice(b"JPE");
    out.extend_from_slice(&parts.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    out.extend_from_slice(&total_uncompressed.to_le_bytes());
    out.extend_from_slice(&total_compressed.to_le_bytes());
    out
}

pub struct ZipOptions<'a> {
    pub comment: &'a [u8],
    pub data_descriptor: bool,
    /// Prefix the first part with a split-archive marker.
    pub split_marker: bool,
    /// Sizes of every part but the last. Central directory records and the
    /// EOCD point into these disks; write the result with [`write_parts`].
    pub parts: &'a [usize],
}

impl Default for ZipOptions<'_> {
    fn default() -> Self {
        Self {
            comment: b"",
            data_descriptor: false,
            split_marker: false,
            parts: &[],
        }
    }
}

/// (0-based disk, offset within it) of a position in the concatenated set.
fn zip_disk_offset(parts: &[usize], position: usize) -> (u16, u32) {
    let mut start = 0;
    for (disk, &size) in parts.iter().enumerate() {
        if position < start + size {
            return (disk as u16, (position - start) as u32);
        }
        start += size;
    }
    (parts.len() as u16, (position - start) as u32)
}

/// Build a ZIP archive. Entry methods use the JPA codes.
pub fn zip_archive(entries: &[Entry], options: &ZipOptions<'_>) -> Vec<u8> {
    zip_layout(entries, options).0
}

/// Build a ZIP archive and return the position of every local header in
/// the concatenated set. The layout does not depend on `options.parts`.
pub fn zip_layout(entries: &[Entry], options: &ZipOptions<'_>) -> (Vec<u8>, Vec<usize>) {
    let mut out = Vec::new();
    let mut local_headers = Vec::new();
    if options.split_marker {
        out.extend_from_slice(b"PK\x07\x08");
    }
    let mut central = Vec::new();
    let flags: u16 = if options.data_descriptor { 0x0008 } else { 0 };
    // 2024-03-15 12:30:10
    let (time, date) = ((12u16 << 11) | (30 << 5) | 5, ((2024u16 - 1980) << 9) | (3 << 5) | 15);

    for entry in entries {
        let method: u16 = match entry.method {
            DEFLATE => 8,
            BZIP2 => 12,
            _ => 0,
        };
        let name = if entry.kind == DIRECTORY && !entry.path.ends_with('/') {
            format!("{}/", entry.path)
        } else {
            entry.path.clone()
        };
        let version: u16 = if entry.kind == SYMLINK { 0x0310 } else { 20 };
        let payload = compress(entry.method, &entry.content);
        let crc = crc32fast::hash(&entry.content);
        local_headers.push(out.len());
        let (disk_start, offset) = zip_disk_offset(options.parts, out.len());

        let (local_crc, local_csize, local_usize) = if options.data_descriptor {
            (0, 0, 0)
        } else {
            (crc, payload.len() as u32, entry.content.len() as u32)
        };
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&time.to_le_bytes());
        out.extend_from_slice(&date.to_le_bytes());
        out.extend_from_slice(&local_crc.to_le_bytes());
        out.extend_from_slice(&local_csize.to_le_bytes());
        out.extend_from_slice(&local_usize.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&[0xca, 0xfe, 0x00, 0x00]);
        out.extend_from_slice(&payload);
        if options.data_descriptor {
            out.extend_from_slice(b"PK\x07\x08");
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.content.len() as u32).to_le_bytes());
        }

        central.extend_from_slice(b"PK\x01\x02");
        central.extend_from_slice(&0x031eu16.to_le_bytes());
        central.extend_from_slice(&version.to_le_bytes());
        central.extend_from_slice(&flags.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&time.to_le_bytes());
        central.extend_from_slice(&date.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.content.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&2u16.to_le_bytes());
        central.extend_from_slice(&3u16.to_le_bytes());
        central.extend_from_slice(&disk_start.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&(0o100644u32 << 16).to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
        central.extend_from_slice(&[0xaa, 0xbb]);
        central.extend_from_slice(b"abc");
    }

    let (cd_disk, cd_offset) = zip_disk_offset(options.parts, out.len());
    out.extend_from_slice(&central);
    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&(options.parts.len() as u16).to_le_bytes());
    out.extend_from_slice(&cd_disk.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&(options.comment.len() as u16).to_le_bytes());
    out.extend_from_slice(options.comment);
    (out, local_headers)
}
