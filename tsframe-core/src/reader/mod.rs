//! Frame readers: two ingestion strategies behind one interface.
//!
//! - `BlockingFrameReader` reassembles frames across short reads and backs off
//!   on non-productive reads.
//! - `NonBlockingFrameReader` busy-polls and scores every successful read as a
//!   whole unit, well-formed only if it returned exactly one frame's worth of bytes.
//!
//! The two disagree on partial reads on purpose; they are separate strategies,
//! not two implementations of the same one.

mod blocking;
mod non_blocking;

use std::time::Duration;

pub use blocking::BlockingFrameReader;
pub use non_blocking::NonBlockingFrameReader;

use crate::cancel::CancelToken;
use crate::connection::{Connection, Mode};
use crate::error::SessionError;
use crate::event::EventSink;
use crate::stats::StatsReport;

/// Sleep after a non-productive blocking read.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Tunables shared by the opener and both readers. `Default` keeps the
/// reference behavior: 1 s backoff, pure spin polling, no timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Blocking reader: delay after a zero-byte or would-block read.
    pub backoff: Duration,
    /// Non-blocking reader: pause between polls. Zero spins.
    pub poll_interval: Duration,
    /// Blocking open: give up connecting after this long.
    pub connect_timeout: Option<Duration>,
    /// Blocking reads: return would-block after this long without data, so
    /// the reader backs off and can observe a cancel.
    pub read_timeout: Option<Duration>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            poll_interval: Duration::ZERO,
            connect_timeout: None,
            read_timeout: None,
        }
    }
}

/// Final result of a session: statistics always, plus the error that ended it, if any.
#[derive(Debug)]
pub struct SessionReport {
    pub stats: StatsReport,
    pub error: Option<SessionError>,
}

impl SessionReport {
    pub fn completed(stats: StatsReport) -> Self {
        Self { stats, error: None }
    }

    pub fn failed(stats: StatsReport, error: SessionError) -> Self {
        Self {
            stats,
            error: Some(error),
        }
    }

    /// True when the stream ran to end-of-stream without error or cancel.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// A strategy that drives one connection to completion.
///
/// The reader takes ownership of the connection; it is dropped (closed) when
/// `drive` returns, whatever the exit path.
pub trait FrameReader: Send {
    fn drive(
        &self,
        conn: Box<dyn Connection>,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> SessionReport;
}

/// Reader matching `mode`.
pub fn reader_for(mode: Mode, config: &ReaderConfig) -> Box<dyn FrameReader> {
    match mode {
        Mode::Blocking => Box::new(BlockingFrameReader::new(config.backoff)),
        Mode::NonBlocking => Box::new(NonBlockingFrameReader::new(config.poll_interval)),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted connection for reader tests.

    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::connection::{Connection, ReadOutcome};

    /// One scripted read: how many bytes and what they are.
    pub enum Step {
        Bytes(Vec<u8>),
        WouldBlock,
        Eof,
        Fail(io::ErrorKind),
    }

    pub struct MockConnection {
        pending_polls: usize,
        connect_error: Option<io::ErrorKind>,
        steps: VecDeque<Step>,
        /// Bytes of the current `Bytes` step not yet handed out.
        partial: Vec<u8>,
        closes: Arc<AtomicUsize>,
        pub reads: Arc<AtomicUsize>,
    }

    impl MockConnection {
        pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let conn = Self {
                pending_polls: 0,
                connect_error: None,
                steps: steps.into(),
                partial: Vec::new(),
                closes: closes.clone(),
                reads: Arc::new(AtomicUsize::new(0)),
            };
            (conn, closes)
        }

        /// Report "not yet connected" this many times before connecting.
        pub fn connecting_for(mut self, polls: usize) -> Self {
            self.pending_polls = polls;
            self
        }

        pub fn connect_error(mut self, kind: io::ErrorKind) -> Self {
            self.connect_error = Some(kind);
            self
        }
    }

    impl Connection for MockConnection {
        fn poll_connected(&mut self) -> io::Result<bool> {
            if let Some(kind) = self.connect_error {
                return Err(io::Error::from(kind));
            }
            if self.pending_polls > 0 {
                self.pending_polls -= 1;
                return Ok(false);
            }
            Ok(true)
        }

        fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.partial.is_empty() {
                match self.steps.pop_front() {
                    Some(Step::Bytes(bytes)) => self.partial = bytes,
                    Some(Step::WouldBlock) => return ReadOutcome::WouldBlock,
                    Some(Step::Fail(kind)) => return ReadOutcome::Error(io::Error::from(kind)),
                    Some(Step::Eof) | None => return ReadOutcome::EndOfStream,
                }
            }
            // A step larger than the buffer is handed out over several reads.
            let n = self.partial.len().min(buf.len());
            buf[..n].copy_from_slice(&self.partial[..n]);
            self.partial.drain(..n);
            ReadOutcome::Data(n)
        }
    }

    impl Drop for MockConnection {
        fn drop(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// `len` bytes starting with `lead`, rest counting up from 1.
    pub fn bytes(lead: u8, len: usize) -> Vec<u8> {
        let mut out: Vec<u8> = (0..len).map(|i| i as u8).collect();
        if let Some(first) = out.first_mut() {
            *first = lead;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_reference_timing() {
        let c = ReaderConfig::default();
        assert_eq!(c.backoff, Duration::from_millis(1000));
        assert_eq!(c.poll_interval, Duration::ZERO);
        assert!(c.connect_timeout.is_none());
        assert!(c.read_timeout.is_none());
    }

    #[test]
    fn report_clean_only_without_error() {
        assert!(SessionReport::completed(StatsReport::new()).is_clean());
        assert!(!SessionReport::failed(StatsReport::new(), SessionError::Cancelled).is_clean());
    }
}
