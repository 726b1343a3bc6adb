//! TCP connection handle and opener, in blocking or non-blocking mode.
//!
//! Readers only see the `Connection` trait, so tests can script reads with a
//! mock. `TcpConnection` is the real socket; it is closed when dropped, and the
//! reader driving it is its only owner.

use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::SessionError;
use crate::reader::ReaderConfig;

/// I/O discipline for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Blocking,
    NonBlocking,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Blocking => f.write_str("blocking"),
            Mode::NonBlocking => f.write_str("non_blocking"),
        }
    }
}

/// Remote endpoint to read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "host resolved to no addresses",
            ));
        }
        Ok(addrs)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Result of one read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were written to the front of the buffer. `Data(0)` is treated like `WouldBlock`.
    Data(usize),
    EndOfStream,
    WouldBlock,
    Error(io::Error),
}

impl ReadOutcome {
    /// Map a `read(2)`-style result onto an outcome.
    pub fn from_io(result: io::Result<usize>) -> Self {
        match result {
            Ok(0) => ReadOutcome::EndOfStream,
            Ok(n) => ReadOutcome::Data(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) =>
            {
                ReadOutcome::WouldBlock
            }
            Err(e) => ReadOutcome::Error(e),
        }
    }
}

/// An open stream a reader can drive. Dropping it closes it.
pub trait Connection: Send {
    /// True once the connection is established. Blocking connections are always
    /// established; non-blocking ones report progress of the pending connect.
    fn poll_connected(&mut self) -> io::Result<bool>;

    /// One read attempt into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Remote address, when known. Used in logs and connect errors.
    fn peer(&self) -> Option<SocketAddr> {
        None
    }
}

/// TCP socket opened by `open`.
#[derive(Debug)]
pub struct TcpConnection {
    socket: Socket,
    mode: Mode,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl Connection for TcpConnection {
    fn poll_connected(&mut self) -> io::Result<bool> {
        if self.mode == Mode::Blocking {
            return Ok(true);
        }
        if let Some(e) = self.socket.take_error()? {
            return Err(e);
        }
        match self.socket.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        ReadOutcome::from_io(self.socket.read(buf))
    }

    fn peer(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        tracing::debug!(peer = %self.peer, mode = %self.mode, "closing connection");
    }
}

/// Open a TCP connection to `target`.
///
/// Blocking: returns once connected (or failed), trying every resolved
/// address in turn. Non-blocking: returns as soon as the connect is in
/// flight; callers poll `poll_connected` until it reports true.
pub fn open(
    target: &Target,
    mode: Mode,
    config: &ReaderConfig,
) -> Result<TcpConnection, SessionError> {
    let fail = |e: io::Error| SessionError::connect_failed(target.to_string(), e);
    let addrs = target.resolve().map_err(fail)?;
    match mode {
        Mode::Blocking => {
            let mut last_err = None;
            for addr in addrs {
                match connect_blocking(addr, config) {
                    Ok(socket) => {
                        tracing::info!(%target, peer = %addr, "connected");
                        return Ok(TcpConnection {
                            socket,
                            mode,
                            peer: addr,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(peer = %addr, error = %e, "connect attempt failed");
                        last_err = Some(e);
                    }
                }
            }
            Err(fail(last_err.unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no address accepted the connection",
                )
            })))
        }
        Mode::NonBlocking => {
            let addr = addrs[0];
            let socket = connect_non_blocking(addr).map_err(fail)?;
            tracing::info!(%target, peer = %addr, "connect in progress");
            Ok(TcpConnection {
                socket,
                mode,
                peer: addr,
            })
        }
    }
}

fn new_stream_socket(addr: SocketAddr) -> io::Result<Socket> {
    Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
}

fn connect_blocking(addr: SocketAddr, config: &ReaderConfig) -> io::Result<Socket> {
    let socket = new_stream_socket(addr)?;
    let sock_addr = SockAddr::from(addr);
    match config.connect_timeout {
        Some(timeout) => socket.connect_timeout(&sock_addr, timeout)?,
        None => socket.connect(&sock_addr)?,
    }
    socket.set_read_timeout(config.read_timeout)?;
    Ok(socket)
}

fn connect_non_blocking(addr: SocketAddr) -> io::Result<Socket> {
    let socket = new_stream_socket(addr)?;
    socket.set_nonblocking(true)?;
    match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => Ok(socket),
        Err(e) if connect_in_progress(&e) => Ok(socket),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(not(unix))]
fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn read_outcome_mapping() {
        assert!(matches!(ReadOutcome::from_io(Ok(0)), ReadOutcome::EndOfStream));
        assert!(matches!(ReadOutcome::from_io(Ok(12)), ReadOutcome::Data(12)));
        let wb = io::Error::from(io::ErrorKind::WouldBlock);
        assert!(matches!(ReadOutcome::from_io(Err(wb)), ReadOutcome::WouldBlock));
        let to = io::Error::from(io::ErrorKind::TimedOut);
        assert!(matches!(ReadOutcome::from_io(Err(to)), ReadOutcome::WouldBlock));
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(ReadOutcome::from_io(Err(reset)), ReadOutcome::Error(_)));
    }

    #[test]
    fn mode_serde_names() {
        #[derive(Deserialize)]
        struct Wrap {
            mode: Mode,
        }
        let w: Wrap = toml::from_str("mode = \"non_blocking\"").unwrap();
        assert_eq!(w.mode, Mode::NonBlocking);
        assert_eq!(Mode::NonBlocking.to_string(), "non_blocking");
    }

    #[test]
    fn blocking_open_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = open(
            &Target::new("127.0.0.1", port),
            Mode::Blocking,
            &ReaderConfig::default(),
        )
        .unwrap();
        assert!(conn.poll_connected().unwrap());
        assert_eq!(conn.peer().map(|p| p.port()), Some(port));
    }

    #[test]
    fn non_blocking_open_eventually_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = open(
            &Target::new("127.0.0.1", port),
            Mode::NonBlocking,
            &ReaderConfig::default(),
        )
        .unwrap();
        let mut connected = false;
        for _ in 0..1000 {
            if conn.poll_connected().unwrap() {
                connected = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(connected);
        assert!(matches!(conn.read(&mut [0u8; 16]), ReadOutcome::WouldBlock));
    }

    #[test]
    fn refused_connect_is_connect_failed() {
        // Bind then drop to get a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = open(
            &Target::new("127.0.0.1", port),
            Mode::Blocking,
            &ReaderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::ConnectFailed { .. }));
    }

    #[test]
    fn unresolvable_host_is_connect_failed() {
        let err = open(
            &Target::new("no-such-host.invalid", 9999),
            Mode::NonBlocking,
            &ReaderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::ConnectFailed { .. }));
    }
}
