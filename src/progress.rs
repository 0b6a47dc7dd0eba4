//! Extraction state, events and cancellation.
//!
//! An extraction emits events in a fixed order: one
//! [`ExtractEvent::ArchiveInformation`], a [`ExtractEvent::Progress`] snapshot,
//! then an [`ExtractEvent::Entity`] / [`ExtractEvent::Progress`] pair per
//! entity, then a final [`ExtractEvent::Progress`] whose status is
//! `Finished`, `Error` or `Idle` (cancelled).
//!
//! Events carry owned snapshots, so they can be forwarded to another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ArchiveError;
use crate::formats::{ArchiveFormat, EntityDescriptor};

/// Extraction state machine.
///
/// `Idle -> Running -> Finished | Error`, or `Running -> Idle` on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionStatus {
    #[default]
    Idle,
    Running,
    Finished,
    Error,
}

/// Snapshot of an extraction's progress.
#[derive(Debug, Clone, Default)]
pub struct ExtractionProgress {
    /// Position in the archive set, across parts.
    pub file_position: u64,
    /// Archive bytes consumed by processed entities.
    pub running_compressed: u64,
    /// Bytes produced by processed entities.
    pub running_uncompressed: u64,
    pub status: ExtractionStatus,
    /// Fault that ended the pass when `status` is `Error`.
    pub last_error: Option<Arc<ArchiveError>>,
}

impl ExtractionProgress {
    /// Back to the "never ran" state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Completion against `total` archive bytes, in percent.
    pub fn percent_of(&self, total: u64) -> f64 {
        if total == 0 {
            return 100.0;
        }
        (self.file_position as f64 * 100.0 / total as f64).min(100.0)
    }
}

/// Archive-level totals reported once, after the header is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub format: ArchiveFormat,
    /// Declared number of entities.
    pub file_count: u64,
    /// Declared totals; not checked against the payload.
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Measured size of all parts on disk.
    pub archive_size: u64,
    /// Parts found on disk.
    pub parts: usize,
    /// Parts the archive says it was written as. A mismatch is logged, not fatal.
    pub declared_parts: usize,
}

#[derive(Debug, Clone)]
pub enum ExtractEvent {
    ArchiveInformation(ArchiveSummary),
    Entity(EntityDescriptor),
    Progress(ExtractionProgress),
}

/// Receiver of extraction events. Called synchronously on the extracting thread.
pub trait ExtractObserver {
    fn on_event(&mut self, event: ExtractEvent);
}

impl<F: FnMut(ExtractEvent)> ExtractObserver for F {
    fn on_event(&mut self, event: ExtractEvent) {
        self(event)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExtractObserver for NoopObserver {
    fn on_event(&mut self, _event: ExtractEvent) {}
}

/// Forwards events over a crossbeam channel. A dropped receiver is ignored.
#[cfg(feature = "channel")]
#[cfg_attr(docsrs, doc(cfg(feature = "channel")))]
#[derive(Debug, Clone)]
pub struct ChannelObserver(pub crossbeam_channel::Sender<ExtractEvent>);

#[cfg(feature = "channel")]
impl ExtractObserver for ChannelObserver {
    fn on_event(&mut self, event: ExtractEvent) {
        let _ = self.0.send(event);
    }
}

/// Outcome of a cancellation checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancelled,
}

/// Cooperative cancellation flag shared between the caller and the engine.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Clear a previous request so the token can drive another pass.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Flow {
        if self.is_cancelled() {
            Flow::Cancelled
        } else {
            Flow::Continue
        }
    }
}
