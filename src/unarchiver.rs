//! The extraction engine.
//!
//! [`Unarchiver`] owns an archive set and runs whole passes over it. A pass
//! never returns an error: faults end it with an `Error` snapshot, and
//! cancellation resets it to `Idle` so the same instance can run again.
//!
//! ```rust,ignore
//! use jpa_stream::{CancellationToken, ExtractEvent, ExtractOptions, Unarchiver};
//!
//! let mut unarchiver = Unarchiver::open("site-backup.jpa", ExtractOptions::default())?;
//! let token = CancellationToken::new();
//! let progress = unarchiver.extract_to("restore", &mut |event: ExtractEvent| {
//!     if let ExtractEvent::Entity(entity) = event {
//!         println!("{}", entity.stored_path);
//!     }
//! }, &token)?;
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::file_media::ArchiveHandle;
use crate::formats::{ArchiveFormat, ArchiveParser, FormatParser};
use crate::processor::{ProcessContext, MAX_CHUNK_SIZE};
use crate::progress::{
    ArchiveSummary, CancellationToken, ExtractEvent, ExtractObserver, ExtractionProgress,
    ExtractionStatus, Flow,
};
use crate::sink::{DataSink, FilesystemSink, NullSink};

/// Options for an extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Required for JPS archives.
    pub password: Option<String>,
    /// Payload chunk size. `with_chunk_size` clamps it to `1..=MAX_CHUNK_SIZE`,
    /// and the processor applies the same bounds to values set directly.
    pub chunk_size: usize,
    /// Compare ZIP payloads against their declared CRC-32.
    pub verify_checksums: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            password: None,
            chunk_size: MAX_CHUNK_SIZE,
            verify_checksums: true,
        }
    }
}

impl ExtractOptions {
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }
}

/// Runs extraction passes over one archive set.
pub struct Unarchiver {
    handle: ArchiveHandle,
    options: ExtractOptions,
    progress: ExtractionProgress,
    summary: Option<ArchiveSummary>,
}

impl Unarchiver {
    /// Name an archive set by its last part. Nothing is read until a pass runs.
    pub fn open(path: impl AsRef<Path>, options: ExtractOptions) -> Result<Self> {
        Ok(Self {
            handle: ArchiveHandle::new(path)?,
            options,
            progress: ExtractionProgress::default(),
            summary: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn format(&self) -> ArchiveFormat {
        self.handle.format()
    }

    pub fn part_count(&self) -> usize {
        self.handle.part_count()
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Progress of the current or last pass.
    pub fn progress(&self) -> &ExtractionProgress {
        &self.progress
    }

    /// Header totals from the last pass that got past the archive header.
    pub fn summary(&self) -> Option<&ArchiveSummary> {
        self.summary.as_ref()
    }

    /// Extract every entity into `sink`.
    pub fn extract(
        &mut self,
        sink: &mut dyn DataSink,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> ExtractionProgress {
        self.run(Some(sink), observer, token)
    }

    /// Extract below `directory`, creating it if needed.
    pub fn extract_to(
        &mut self,
        directory: impl AsRef<Path>,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> Result<ExtractionProgress> {
        let mut sink = FilesystemSink::new(directory.as_ref())?;
        Ok(self.extract(&mut sink, observer, token))
    }

    /// Decode every payload and discard it, so corrupt data surfaces as an error.
    pub fn test(
        &mut self,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> ExtractionProgress {
        let mut sink = NullSink;
        self.run(Some(&mut sink), observer, token)
    }

    /// List entities without decoding JPA or ZIP payloads.
    pub fn scan(
        &mut self,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> ExtractionProgress {
        self.run(None, observer, token)
    }

    #[tracing::instrument(
        name = "extract",
        skip_all,
        fields(archive = %self.handle.path().display(), format = ?self.handle.format())
    )]
    fn run(
        &mut self,
        sink: Option<&mut dyn DataSink>,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> ExtractionProgress {
        self.progress.reset();
        self.summary = None;
        self.progress.status = ExtractionStatus::Running;

        match self.drive(sink, observer, token) {
            Ok(Flow::Continue) => {
                self.progress.status = ExtractionStatus::Finished;
                tracing::info!(
                    position = self.progress.file_position,
                    uncompressed = self.progress.running_uncompressed,
                    "extraction finished"
                );
            }
            Ok(Flow::Cancelled) => {
                tracing::info!(position = self.progress.file_position, "extraction cancelled");
                self.progress.reset();
            }
            Err(error) => {
                tracing::error!(%error, position = self.progress.file_position, "extraction aborted");
                self.progress.status = ExtractionStatus::Error;
                self.progress.last_error = Some(Arc::new(error));
            }
        }

        observer.on_event(ExtractEvent::Progress(self.progress.clone()));
        self.progress.clone()
    }

    fn drive(
        &mut self,
        sink: Option<&mut dyn DataSink>,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> Result<Flow> {
        let mut parser = FormatParser::new(&self.handle, &self.options)?;
        let result = self.walk(&mut parser, sink, observer, token);
        parser.close();
        result
    }

    fn walk(
        &mut self,
        parser: &mut FormatParser,
        mut sink: Option<&mut dyn DataSink>,
        observer: &mut dyn ExtractObserver,
        token: &CancellationToken,
    ) -> Result<Flow> {
        let summary = parser.read_archive_header()?;
        self.summary = Some(summary.clone());
        observer.on_event(ExtractEvent::ArchiveInformation(summary));

        self.progress.file_position = parser.position();
        observer.on_event(ExtractEvent::Progress(self.progress.clone()));

        loop {
            if token.check() == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }

            let Some(mut entity) = parser.read_next_entity()? else {
                return Ok(Flow::Continue);
            };
            if let Some(sink) = sink.as_deref() {
                entity.absolute_path = sink.resolve_absolute_path(&entity.stored_path);
            }
            observer.on_event(ExtractEvent::Entity(entity.clone()));

            let mut ctx = ProcessContext {
                sink: reborrow(&mut sink),
                progress: &mut self.progress,
                token,
                chunk_size: self.options.chunk_size,
                verify_checksums: self.options.verify_checksums,
            };
            if parser.process_entity(&entity, &mut ctx)? == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }
            observer.on_event(ExtractEvent::Progress(self.progress.clone()));
        }
    }
}

fn reborrow<'a>(sink: &'a mut Option<&mut dyn DataSink>) -> Option<&'a mut dyn DataSink> {
    match sink {
        Some(sink) => Some(&mut **sink),
        None => None,
    }
}
