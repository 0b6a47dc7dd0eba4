//! Run extractions off the async executor.
//!
//! The engine is synchronous, so a pass runs on tokio's blocking pool and its
//! events are forwarded over an unbounded channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::progress::{CancellationToken, ExtractEvent, ExtractionProgress};
use crate::sink::DataSink;
use crate::unarchiver::Unarchiver;

/// A pass running on the blocking pool.
pub struct ExtractionTask<S> {
    /// Resolves to the engine, the sink and the final snapshot.
    pub handle: JoinHandle<(Unarchiver, S, ExtractionProgress)>,
    /// Events in emission order. Closed when the pass ends.
    pub events: mpsc::UnboundedReceiver<ExtractEvent>,
    /// Cancels the pass at its next checkpoint.
    pub token: CancellationToken,
}

/// Start `unarchiver.extract(sink, ..)` on the blocking pool.
///
/// Must be called from within a tokio runtime.
pub fn spawn_extraction<S>(mut unarchiver: Unarchiver, mut sink: S) -> ExtractionTask<S>
where
    S: DataSink + Send + 'static,
{
    let (tx, events) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let worker_token = token.clone();

    let handle = tokio::task::spawn_blocking(move || {
        let mut forward = |event: ExtractEvent| {
            let _ = tx.send(event);
        };
        let progress = unarchiver.extract(&mut sink, &mut forward, &worker_token);
        (unarchiver, sink, progress)
    });

    ExtractionTask {
        handle,
        events,
        token,
    }
}
