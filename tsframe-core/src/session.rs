//! Session control: run one reader on its own worker thread.
//!
//! `Session::start` opens the connection and drives the matching reader on a
//! dedicated thread, so the caller never blocks on network I/O. `SessionSlot`
//! keeps at most one session alive per owner: starting a new one cancels and
//! joins the previous one first, so its connection is always closed.

use std::thread::JoinHandle;

use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::connection::{self, Mode, Target};
use crate::error::SessionError;
use crate::event::{EventKind, EventSink};
use crate::reader::{reader_for, ReaderConfig, SessionReport};
use crate::stats::StatsReport;

/// Open the connection for `mode` and drive it to completion on the current thread.
///
/// A connect failure yields a report with zero counts and `ConnectFailed`.
pub fn run(
    target: &Target,
    mode: Mode,
    config: &ReaderConfig,
    cancel: &CancelToken,
    events: &EventSink,
) -> SessionReport {
    events.notify(EventKind::Started, 0, 0);
    let report = if cancel.is_cancelled() {
        SessionReport::failed(StatsReport::new(), SessionError::Cancelled)
    } else {
        match connection::open(target, mode, config) {
            Ok(conn) => reader_for(mode, config).drive(Box::new(conn), cancel, events),
            Err(e) => {
                tracing::warn!(%target, error = %e, "connect failed");
                SessionReport::failed(StatsReport::new(), e)
            }
        }
    };
    tracing::info!(
        %target,
        %mode,
        total = report.stats.attempts,
        good = report.stats.well_formed,
        bad = report.stats.malformed,
        "session closed"
    );
    events.notify(
        EventKind::Finished,
        report.stats.attempts,
        report.stats.well_formed,
    );
    report
}

/// Entry point for starting sessions.
pub struct Session;

impl Session {
    /// Start a session on a new worker thread.
    pub fn start(
        target: Target,
        mode: Mode,
        config: ReaderConfig,
        events: EventSink,
    ) -> std::io::Result<SessionHandle> {
        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name(format!("tsframe-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                let span = tracing::info_span!("session", %id);
                let _enter = span.enter();
                run(&target, mode, &config, &worker_cancel, &events)
            })?;
        tracing::debug!(%id, %mode, "session started");
        Ok(SessionHandle { id, cancel, thread })
    }
}

/// Owner's handle on a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancelToken,
    thread: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the session to stop. Observed between reads and during sleeps,
    /// not while a read is in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and take its report. A panicked worker reports as
    /// a read failure with no counts.
    pub fn join(self) -> SessionReport {
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => {
                tracing::error!(id = %self.id, "session thread panicked");
                SessionReport::failed(
                    StatsReport::new(),
                    SessionError::ReadFailed(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "session thread panicked",
                    )),
                )
            }
        }
    }
}

/// Holds at most one running session.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Option<SessionHandle>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, cancelling and joining any previous one first.
    /// Returns the previous session's report, if there was one.
    pub fn start(
        &mut self,
        target: Target,
        mode: Mode,
        config: ReaderConfig,
        events: EventSink,
    ) -> std::io::Result<Option<SessionReport>> {
        let previous = self.stop();
        self.current = Some(Session::start(target, mode, config, events)?);
        Ok(previous)
    }

    /// Cancel and join the current session.
    pub fn stop(&mut self) -> Option<SessionReport> {
        let handle = self.current.take()?;
        tracing::debug!(id = %handle.id(), "replacing session");
        handle.cancel();
        Some(handle.join())
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.current {
            handle.cancel();
        }
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(SessionHandle::id)
    }

    /// Take the current session's handle, leaving the slot empty.
    pub fn take(&mut self) -> Option<SessionHandle> {
        self.current.take()
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
