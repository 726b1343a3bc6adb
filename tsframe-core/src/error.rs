//! Error types. Every session error is terminal for that session.

/// Why a session stopped early. Statistics gathered before the error are kept
/// alongside it in `SessionReport`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Address invalid, refused, timed out or unreachable.
    #[error("connect to {target} failed: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },
    /// Transport error in the middle of the stream.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),
    /// External cancel observed between reads or during a backoff sleep.
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn connect_failed(target: impl Into<String>, source: std::io::Error) -> Self {
        SessionError::ConnectFailed {
            target: target.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }
}

/// Errors from the test stream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("socket setup failed: {0}")]
    Setup(#[from] std::io::Error),
}
