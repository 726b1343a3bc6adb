//! 188-byte frame reassembly over TCP.
//! The host supplies a target and a mode; the core reads, validates and counts
//! frames on a worker thread and hands back events and a final report.

pub mod accumulator;
pub mod cancel;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod reader;
pub mod session;
pub mod source;
pub mod stats;

pub use accumulator::FrameAccumulator;
pub use cancel::CancelToken;
pub use connection::{open, Connection, Mode, ReadOutcome, Target, TcpConnection};
pub use error::{SessionError, SourceError};
pub use event::{EventKind, EventReceiver, EventSink, SessionEvent};
pub use frame::{validate, Frame, Validity, FRAME_LEN, SYNC_BYTE};
pub use reader::{
    BlockingFrameReader, FrameReader, NonBlockingFrameReader, ReaderConfig, SessionReport,
};
pub use session::{Session, SessionHandle, SessionSlot};
pub use source::SourceConfig;
pub use stats::StatsReport;
