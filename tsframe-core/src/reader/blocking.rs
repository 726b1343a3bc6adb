//! Blocking reader: Reading -> (Backoff) -> Reading -> Closed.

use std::time::Duration;

use super::{FrameReader, SessionReport};
use crate::accumulator::FrameAccumulator;
use crate::cancel::CancelToken;
use crate::connection::{Connection, ReadOutcome};
use crate::error::SessionError;
use crate::event::{EventKind, EventSink};
use crate::frame::{Validity, FRAME_LEN};
use crate::stats::StatsReport;

/// Reads at most the space left in the current frame, so partial frames carry
/// over between reads. A zero-byte or would-block read sleeps `backoff`.
#[derive(Debug, Clone)]
pub struct BlockingFrameReader {
    backoff: Duration,
}

impl BlockingFrameReader {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }
}

impl FrameReader for BlockingFrameReader {
    fn drive(
        &self,
        mut conn: Box<dyn Connection>,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> SessionReport {
        events.notify(EventKind::Connected, 0, 0);
        let mut acc = FrameAccumulator::new();
        let mut stats = StatsReport::new();
        let mut scratch = [0u8; FRAME_LEN];

        let error = loop {
            if cancel.is_cancelled() {
                break Some(SessionError::Cancelled);
            }
            let offset = acc.offset();
            let requested = acc.remaining();
            match conn.read(&mut scratch[..requested]) {
                ReadOutcome::Data(n) if n > 0 => {
                    tracing::trace!(offset, requested, read = n, "read");
                    for frame in acc.ingest(&scratch[..n]) {
                        let validity = frame.validity();
                        stats.record(validity);
                        if validity == Validity::Malformed {
                            let (b0, b1) = frame.lead();
                            tracing::debug!(b0, b1, "malformed frame");
                            events.notify(EventKind::Malformed, b0.into(), b1.into());
                        }
                    }
                }
                ReadOutcome::Data(_) | ReadOutcome::WouldBlock => {
                    tracing::debug!(
                        offset,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "no data, backing off"
                    );
                    events.notify(EventKind::Backoff, offset as u64, 0);
                    if cancel.sleep(self.backoff) {
                        break Some(SessionError::Cancelled);
                    }
                }
                ReadOutcome::EndOfStream => {
                    tracing::info!("end of stream");
                    break None;
                }
                ReadOutcome::Error(e) => {
                    tracing::error!(error = %e, "read failed");
                    events.notify(EventKind::ReadFailed, 0, 0);
                    break Some(SessionError::ReadFailed(e));
                }
            }
        };
        drop(conn);

        match error {
            None => SessionReport::completed(stats),
            Some(e) => SessionReport::failed(stats, e),
        }
    }
}
