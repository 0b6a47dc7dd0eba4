//! Entity payload processing.
//!
//! JPA and ZIP payloads are a run of `compressed_size` bytes, read in bounded
//! chunks and pushed through a streaming decoder into the sink. JPS payloads
//! are a sequence of independently encrypted and compressed blocks, read until
//! the entity's declared size has been produced.
//!
//! Cancellation is checked between chunks, never inside one.

use std::io::{self, Read, Write};

use crate::crc32::Crc32;
use crate::crypto::BlockDecryptor;
use crate::error::{ArchiveError, Result};
use crate::formats::EntityDescriptor;
use crate::parsing::jps::JpsDataBlockHeader;
use crate::parsing::{ByteSource, CompressionMethod, EntityKind, PrimitiveReader};
use crate::progress::{CancellationToken, ExtractionProgress, Flow};
use crate::sink::DataSink;

/// Largest payload chunk read at once.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Everything the processor needs besides the archive stream.
pub struct ProcessContext<'a> {
    /// `None` in scan mode: payloads are skipped where possible.
    pub sink: Option<&'a mut dyn DataSink>,
    pub progress: &'a mut ExtractionProgress,
    pub token: &'a CancellationToken,
    pub chunk_size: usize,
    pub verify_checksums: bool,
}

/// Process a JPA or ZIP entity whose payload starts at the current position.
pub fn process_plain_entity<S: ByteSource + ?Sized>(
    source: &mut S,
    entity: &EntityDescriptor,
    ctx: &mut ProcessContext<'_>,
) -> Result<Flow> {
    ctx.progress.file_position = source.position();
    ctx.progress.running_compressed += entity.compressed_size;
    ctx.progress.running_uncompressed += entity.uncompressed_size;

    let Some(sink) = ctx.sink.as_deref_mut() else {
        source.skip(entity.compressed_size)?;
        ctx.progress.file_position = source.position();
        return Ok(Flow::Continue);
    };

    match entity.kind {
        EntityKind::Directory => {
            sink.make_directory_recursive(&entity.sink_path())
                .map_err(ArchiveError::Sink)?;
            source.skip(entity.compressed_size)?;
        }
        EntityKind::Symlink => {
            let raw = source.read_buffer(entity.compressed_size as usize)?;
            let target = decompress_block(entity.compression, &raw)?;
            let target = String::from_utf8_lossy(&target);
            sink.make_symlink(&target, &entity.sink_path())
                .map_err(ArchiveError::Sink)?;
        }
        EntityKind::File => {
            sink.start_file(&entity.stored_path).map_err(ArchiveError::Sink)?;

            if entity.uncompressed_size == 0 {
                source.skip(entity.compressed_size)?;
            } else {
                let chunk_size = ctx.chunk_size.clamp(1, MAX_CHUNK_SIZE);
                match stream_payload(source, entity, &mut *sink, ctx.token, chunk_size)? {
                    Streamed::Cancelled => {
                        sink.stop_file().map_err(ArchiveError::Sink)?;
                        return Ok(Flow::Cancelled);
                    }
                    Streamed::Complete { written, crc } => {
                        if written != entity.uncompressed_size {
                            tracing::warn!(
                                path = %entity.stored_path,
                                declared = entity.uncompressed_size,
                                written,
                                "entity size differs from its header"
                            );
                        }
                        if let (true, Some(expected)) = (ctx.verify_checksums, entity.crc32) {
                            if crc != expected {
                                return Err(ArchiveError::ChecksumMismatch {
                                    path: entity.stored_path.clone(),
                                    expected,
                                    actual: crc,
                                });
                            }
                        }
                    }
                }
            }

            sink.stop_file().map_err(ArchiveError::Sink)?;
        }
    }

    ctx.progress.file_position = source.position();
    Ok(Flow::Continue)
}

enum Streamed {
    Complete { written: u64, crc: u32 },
    Cancelled,
}

fn stream_payload<S: ByteSource + ?Sized>(
    source: &mut S,
    entity: &EntityDescriptor,
    sink: &mut dyn DataSink,
    token: &CancellationToken,
    chunk_size: usize,
) -> Result<Streamed> {
    let mut decoder = PayloadDecoder::new(entity.compression, SinkWriter::new(sink));
    let mut left = entity.compressed_size;
    let mut chunk = vec![0u8; (chunk_size as u64).min(left) as usize];

    while left > 0 {
        let want = left.min(chunk.len() as u64) as usize;
        let got = source.read_bytes(&mut chunk[..want])?;
        if got < want {
            return Err(ArchiveError::BufferTooSmall {
                needed: want,
                have: got,
            });
        }
        decoder.feed(&chunk[..want])?;
        left -= want as u64;
        tracing::trace!(path = %entity.stored_path, chunk = want, left, "payload chunk");

        if left > 0 && token.check() == Flow::Cancelled {
            return Ok(Streamed::Cancelled);
        }
    }

    let writer = decoder.finish()?;
    Ok(Streamed::Complete {
        written: writer.written,
        crc: writer.crc.finish(),
    })
}

/// `io::Write` adapter that forwards decoded bytes to a sink.
struct SinkWriter<'s> {
    sink: &'s mut dyn DataSink,
    written: u64,
    crc: Crc32,
    /// Error returned by the sink itself, as opposed to the decoder.
    sink_error: Option<io::Error>,
}

impl<'s> SinkWriter<'s> {
    fn new(sink: &'s mut dyn DataSink) -> Self {
        Self {
            sink,
            written: 0,
            crc: Crc32::new(),
            sink_error: None,
        }
    }
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sink_error.is_some() {
            return Err(io::Error::new(io::ErrorKind::Other, "sink already failed"));
        }
        if let Err(e) = self.sink.write(buf) {
            let kind = e.kind();
            self.sink_error = Some(e);
            return Err(io::Error::new(kind, "sink write failed"));
        }
        self.written += buf.len() as u64;
        self.crc.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum PayloadDecoder<'s> {
    Stored(SinkWriter<'s>),
    Deflate(flate2::write::DeflateDecoder<SinkWriter<'s>>),
    Bzip2(bzip2::write::BzDecoder<SinkWriter<'s>>),
}

impl<'s> PayloadDecoder<'s> {
    fn new(method: CompressionMethod, writer: SinkWriter<'s>) -> Self {
        match method {
            CompressionMethod::Stored => Self::Stored(writer),
            CompressionMethod::Deflate => Self::Deflate(flate2::write::DeflateDecoder::new(writer)),
            CompressionMethod::Bzip2 => Self::Bzip2(bzip2::write::BzDecoder::new(writer)),
        }
    }

    fn writer_mut(&mut self) -> &mut SinkWriter<'s> {
        match self {
            Self::Stored(writer) => writer,
            Self::Deflate(decoder) => decoder.get_mut(),
            Self::Bzip2(decoder) => decoder.get_mut(),
        }
    }

    fn classify(&mut self, error: io::Error) -> ArchiveError {
        match self.writer_mut().sink_error.take() {
            Some(sink_error) => ArchiveError::Sink(sink_error),
            None => ArchiveError::Decompression(error.to_string()),
        }
    }

    fn feed(&mut self, data: &[u8]) -> Result<()> {
        let result = match self {
            Self::Stored(writer) => writer.write_all(data),
            Self::Deflate(decoder) => decoder.write_all(data),
            Self::Bzip2(decoder) => decoder.write_all(data),
        };
        result.map_err(|e| self.classify(e))
    }

    fn finish(mut self) -> Result<SinkWriter<'s>> {
        let result = match &mut self {
            Self::Stored(_) => Ok(()),
            Self::Deflate(decoder) => decoder.try_finish(),
            Self::Bzip2(decoder) => decoder.try_finish(),
        };
        result.map_err(|e| self.classify(e))?;
        match self {
            Self::Stored(writer) => Ok(writer),
            Self::Deflate(decoder) => decoder
                .finish()
                .map_err(|e| ArchiveError::Decompression(e.to_string())),
            // BzDecoder::finish borrows mutably and hands the writer back.
            Self::Bzip2(mut decoder) => decoder
                .finish()
                .map_err(|e| ArchiveError::Decompression(e.to_string())),
        }
    }
}

/// Decompress one self-contained block.
pub fn decompress_block(method: CompressionMethod, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let result = match method {
        CompressionMethod::Stored => {
            out.extend_from_slice(data);
            Ok(out.len())
        }
        CompressionMethod::Deflate => flate2::read::DeflateDecoder::new(data).read_to_end(&mut out),
        CompressionMethod::Bzip2 => bzip2::read::BzDecoder::new(data).read_to_end(&mut out),
    };
    result.map_err(|e| ArchiveError::Decompression(e.to_string()))?;
    Ok(out)
}

/// Read one encrypted data block and return its plaintext.
fn read_encrypted_block<S: ByteSource + ?Sized>(
    source: &mut S,
    decryptor: &mut BlockDecryptor,
    progress: &mut ExtractionProgress,
) -> Result<Vec<u8>> {
    let header = JpsDataBlockHeader::parse(source)?;
    let encrypted = source.read_buffer(header.encrypted_size as usize)?;
    progress.running_compressed += header.encrypted_size as u64;

    let plain = decryptor.decrypt(&encrypted)?;
    if plain.len() != header.decrypted_size as usize {
        return Err(ArchiveError::DecryptionSizeMismatch {
            expected: header.decrypted_size as usize,
            actual: plain.len(),
        });
    }
    Ok(plain)
}

/// Process a JPS entity whose first data block starts at the current position.
///
/// Blocks are decrypted even without a sink, since only their decoded sizes
/// tell where the entity ends.
pub fn process_encrypted_entity<S: ByteSource + ?Sized>(
    source: &mut S,
    decryptor: &mut BlockDecryptor,
    entity: &EntityDescriptor,
    ctx: &mut ProcessContext<'_>,
) -> Result<Flow> {
    ctx.progress.file_position = source.position();

    match entity.kind {
        EntityKind::Directory => {
            if let Some(sink) = ctx.sink.as_deref_mut() {
                sink.make_directory_recursive(&entity.sink_path())
                    .map_err(ArchiveError::Sink)?;
            }
        }
        EntityKind::Symlink => {
            let mut target = read_encrypted_block(source, decryptor, ctx.progress)?;
            target.truncate(entity.uncompressed_size as usize);
            if let Some(sink) = ctx.sink.as_deref_mut() {
                sink.make_symlink(&String::from_utf8_lossy(&target), &entity.sink_path())
                    .map_err(ArchiveError::Sink)?;
            }
            ctx.progress.running_uncompressed += entity.uncompressed_size;
        }
        EntityKind::File => {
            if let Some(sink) = ctx.sink.as_deref_mut() {
                sink.start_file(&entity.stored_path).map_err(ArchiveError::Sink)?;
            }

            let mut produced = 0u64;
            while produced < entity.uncompressed_size {
                if ctx.token.check() == Flow::Cancelled {
                    if let Some(sink) = ctx.sink.as_deref_mut() {
                        sink.stop_file().map_err(ArchiveError::Sink)?;
                    }
                    return Ok(Flow::Cancelled);
                }

                let plain = read_encrypted_block(source, decryptor, ctx.progress)?;
                let data = decompress_block(entity.compression, &plain)?;
                produced += data.len() as u64;
                ctx.progress.running_uncompressed += data.len() as u64;
                tracing::trace!(path = %entity.stored_path, block = data.len(), produced, "payload block");

                if let Some(sink) = ctx.sink.as_deref_mut() {
                    sink.write(&data).map_err(ArchiveError::Sink)?;
                }
            }

            if let Some(sink) = ctx.sink.as_deref_mut() {
                sink.stop_file().map_err(ArchiveError::Sink)?;
            }
        }
    }

    ctx.progress.file_position = source.position();
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::SliceReader;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
        data: Vec<u8>,
        fail_writes: bool,
    }

    impl DataSink for RecordingSink {
        fn make_directory_recursive(&mut self, path: &Path) -> io::Result<()> {
            self.calls.push(format!("mkdir {}", path.display()));
            Ok(())
        }
        fn start_file(&mut self, relative_path: &str) -> io::Result<()> {
            self.calls.push(format!("start {}", relative_path));
            Ok(())
        }
        fn stop_file(&mut self) -> io::Result<()> {
            self.calls.push("stop".into());
            Ok(())
        }
        fn write(&mut self, data: &[u8]) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.calls.push(format!("write {}", data.len()));
            self.data.extend_from_slice(data);
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

    fn entity(kind: EntityKind, compression: CompressionMethod, csize: u64, usize: u64) -> EntityDescriptor {
        EntityDescriptor {
            stored_path: "dir/file.bin".into(),
            absolute_path: None,
            kind,
            compression,
            compressed_size: csize,
            uncompressed_size: usize,
            permissions: 0o644,
            modified: None,
            part_number: 1,
            part_offset: 0,
            crc32: None,
        }
    }

    fn run(
        data: &[u8],
        entity: &EntityDescriptor,
        sink: Option<&mut dyn DataSink>,
        token: &CancellationToken,
        chunk_size: usize,
    ) -> (Result<Flow>, ExtractionProgress, u64) {
        let mut progress = ExtractionProgress::default();
        let mut reader = SliceReader::new(data);
        let result = {
            let mut ctx = ProcessContext {
                sink: sink.map(|s| s as &mut dyn DataSink),
                progress: &mut progress,
                token,
                chunk_size,
                verify_checksums: true,
            };
            process_plain_entity(&mut reader, entity, &mut ctx)
        };
        (result, progress, reader.position())
    }

    #[test]
    fn test_stored_file_in_chunks() {
        let payload: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let e = entity(EntityKind::File, CompressionMethod::Stored, 1000, 1000);
        let mut sink = RecordingSink::default();
        let (result, progress, pos) = run(&payload, &e, Some(&mut sink), &CancellationToken::new(), 300);

        assert_eq!(result.unwrap(), Flow::Continue);
        assert_eq!(sink.data, payload);
        assert_eq!(
            sink.calls,
            ["start dir/file.bin", "write 300", "write 300", "write 300", "write 100", "stop"]
        );
        assert_eq!(progress.running_compressed, 1000);
        assert_eq!(progress.file_position, 1000);
        assert_eq!(pos, 1000);
    }

    #[test]
    fn test_deflate_file() {
        let original = b"abcabcabcabcabcabcabcabcabcabcabcabc hello hello hello".repeat(50);
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(&original).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut e = entity(
            EntityKind::File,
            CompressionMethod::Deflate,
            compressed.len() as u64,
            original.len() as u64,
        );
        e.crc32 = Some(crate::crc32::crc32(&original));
        let mut sink = RecordingSink::default();
        let (result, _, _) = run(&compressed, &e, Some(&mut sink), &CancellationToken::new(), 16);
        assert_eq!(result.unwrap(), Flow::Continue);
        assert_eq!(sink.data, original);
    }

    #[test]
    fn test_bzip2_file() {
        let original = b"bzip2 payload ".repeat(200);
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&original).unwrap();
        let compressed = encoder.finish().unwrap();

        let e = entity(
            EntityKind::File,
            CompressionMethod::Bzip2,
            compressed.len() as u64,
            original.len() as u64,
        );
        let mut sink = RecordingSink::default();
        let (result, _, _) = run(&compressed, &e, Some(&mut sink), &CancellationToken::new(), 64);
        assert_eq!(result.unwrap(), Flow::Continue);
        assert_eq!(sink.data, original);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut e = entity(EntityKind::File, CompressionMethod::Stored, 4, 4);
        e.crc32 = Some(0x1234_5678);
        let mut sink = RecordingSink::default();
        let (result, _, _) = run(b"data", &e, Some(&mut sink), &CancellationToken::new(), 1024);
        assert!(matches!(result, Err(ArchiveError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_corrupt_deflate_is_decompression_error() {
        let garbage = [0xffu8; 32];
        let e = entity(EntityKind::File, CompressionMethod::Deflate, 32, 100);
        let mut sink = RecordingSink::default();
        let (result, _, _) = run(&garbage, &e, Some(&mut sink), &CancellationToken::new(), 1024);
        assert!(matches!(result, Err(ArchiveError::Decompression(_))));
    }

    #[test]
    fn test_sink_failure_is_sink_error() {
        let e = entity(EntityKind::File, CompressionMethod::Stored, 4, 4);
        let mut sink = RecordingSink {
            fail_writes: true,
            ..Default::default()
        };
        let (result, _, _) = run(b"data", &e, Some(&mut sink), &CancellationToken::new(), 1024);
        assert!(matches!(result, Err(ArchiveError::Sink(_))));
    }

    #[test]
    fn test_scan_mode_skips_payload() {
        let e = entity(EntityKind::File, CompressionMethod::Deflate, 6, 600);
        let (result, progress, pos) = run(b"\xff\xff\xff\xff\xff\xffNEXT", &e, None, &CancellationToken::new(), 1024);
        assert_eq!(result.unwrap(), Flow::Continue);
        assert_eq!(pos, 6);
        assert_eq!(progress.running_uncompressed, 600);
    }

    #[test]
    fn test_empty_file_has_no_writes() {
        let e = entity(EntityKind::File, CompressionMethod::Stored, 0, 0);
        let mut sink = RecordingSink::default();
        let (result, _, _) = run(b"", &e, Some(&mut sink), &CancellationToken::new(), 1024);
        assert_eq!(result.unwrap(), Flow::Continue);
        assert_eq!(sink.calls, ["start dir/file.bin", "stop"]);
    }

    #[test]
    fn test_directory_and_symlink() {
        let mut sink = RecordingSink::default();
        let token = CancellationToken::new();

        let mut dir = entity(EntityKind::Directory, CompressionMethod::Stored, 0, 0);
        dir.stored_path = "media".into();
        run(b"", &dir, Some(&mut sink), &token, 1024).0.unwrap();

        let mut link = entity(EntityKind::Symlink, CompressionMethod::Stored, 9, 9);
        link.stored_path = "latest".into();
        run(b"v2/app.js", &link, Some(&mut sink), &token, 1024).0.unwrap();

        assert_eq!(sink.calls, ["mkdir media", "symlink latest -> v2/app.js"]);
    }

    #[test]
    fn test_cancellation_between_chunks() {
        let payload = vec![7u8; 100];
        let e = entity(EntityKind::File, CompressionMethod::Stored, 100, 100);
        let token = CancellationToken::new();
        token.cancel();
        let mut sink = RecordingSink::default();
        let (result, _, pos) = run(&payload, &e, Some(&mut sink), &token, 10);

        assert_eq!(result.unwrap(), Flow::Cancelled);
        // The chunk in flight is finished before stopping.
        assert_eq!(pos, 10);
        assert_eq!(sink.calls, ["start dir/file.bin", "write 10", "stop"]);
    }

    #[test]
    fn test_encrypted_file_blocks() {
        use crate::crypto::{legacy_key, seal_block};

        let key = legacy_key("pw").unwrap();
        let mut data = Vec::new();
        for part in [&b"first block, "[..], &b"second block"[..]] {
            let sealed = seal_block(&key, None, None, part);
            data.extend_from_slice(&(sealed.len() as u32).to_le_bytes());
            data.extend_from_slice(&(part.len() as u32).to_le_bytes());
            data.extend_from_slice(&sealed);
        }

        let e = entity(EntityKind::File, CompressionMethod::Stored, 0, 25);
        let mut decryptor = BlockDecryptor::new("pw", None).unwrap();
        let mut sink = RecordingSink::default();
        let mut progress = ExtractionProgress::default();
        let token = CancellationToken::new();
        let mut reader = SliceReader::new(&data);
        let mut ctx = ProcessContext {
            sink: Some(&mut sink),
            progress: &mut progress,
            token: &token,
            chunk_size: MAX_CHUNK_SIZE,
            verify_checksums: true,
        };
        let flow = process_encrypted_entity(&mut reader, &mut decryptor, &e, &mut ctx).unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(sink.data, b"first block, second block");
        assert_eq!(progress.running_uncompressed, 25);
        assert_eq!(progress.running_compressed, 16 + 4 + 16 + 4);
        assert!(reader.is_empty());
    }
}
