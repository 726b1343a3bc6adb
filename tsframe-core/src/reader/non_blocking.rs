//! Non-blocking reader: PollConnect -> Reading -> Closed.

use std::time::Duration;

use super::{FrameReader, SessionReport};
use crate::cancel::CancelToken;
use crate::connection::{Connection, ReadOutcome};
use crate::error::SessionError;
use crate::event::{EventKind, EventSink};
use crate::frame::{Validity, FRAME_LEN};
use crate::stats::StatsReport;

/// Polls for connect completion, then polls reads of up to one frame.
///
/// There is no offset carried between reads: each successful read counts as
/// one attempt, well-formed only if it returned exactly `FRAME_LEN` bytes.
/// Content is not inspected.
#[derive(Debug, Clone)]
pub struct NonBlockingFrameReader {
    poll_interval: Duration,
}

impl NonBlockingFrameReader {
    /// `poll_interval` of zero spins without yielding.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Wait between polls. Returns true if cancelled while waiting.
    fn pause(&self, cancel: &CancelToken) -> bool {
        if self.poll_interval.is_zero() {
            std::hint::spin_loop();
            false
        } else {
            cancel.sleep(self.poll_interval)
        }
    }

    fn poll_until_connected(
        &self,
        conn: &mut dyn Connection,
        cancel: &CancelToken,
    ) -> Result<(), SessionError> {
        let mut polls: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            match conn.poll_connected() {
                Ok(true) => {
                    tracing::debug!(polls, "connect completed");
                    return Ok(());
                }
                Ok(false) => {
                    polls += 1;
                    tracing::trace!("still connecting");
                    if self.pause(cancel) {
                        return Err(SessionError::Cancelled);
                    }
                }
                Err(e) => {
                    let target = conn
                        .peer()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "peer".to_string());
                    tracing::warn!(%target, error = %e, "connect failed");
                    return Err(SessionError::connect_failed(target, e));
                }
            }
        }
    }
}

impl FrameReader for NonBlockingFrameReader {
    fn drive(
        &self,
        mut conn: Box<dyn Connection>,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> SessionReport {
        let mut stats = StatsReport::new();
        if let Err(e) = self.poll_until_connected(conn.as_mut(), cancel) {
            return SessionReport::failed(stats, e);
        }
        events.notify(EventKind::Connected, 0, 0);

        let mut buf = [0u8; FRAME_LEN];
        let error = loop {
            if cancel.is_cancelled() {
                break Some(SessionError::Cancelled);
            }
            match conn.read(&mut buf) {
                ReadOutcome::Data(n) if n > 0 => {
                    tracing::trace!(read = n, "read");
                    if n == FRAME_LEN {
                        stats.record(Validity::WellFormed);
                    } else {
                        stats.record(Validity::Malformed);
                        events.notify(EventKind::Malformed, n as u64, 0);
                    }
                }
                ReadOutcome::Data(_) | ReadOutcome::WouldBlock => {
                    if self.pause(cancel) {
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
