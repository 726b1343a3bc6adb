//! Test stream source: serves a fixed run of frames to every client.
//!
//! Each client gets `frames_per_client` frames, zero filled, sync byte at 0
//! and the frame index (mod 256) at 1. Blocking mode writes whole frames;
//! non-blocking mode resumes partial writes and sleeps on would-block.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};

use crate::cancel::CancelToken;
use crate::connection::Mode;
use crate::error::SourceError;
use crate::frame::{source_frame, FRAME_LEN};

/// Frames sent to each client by default.
pub const DEFAULT_FRAMES_PER_CLIENT: usize = 10_000;

/// Sleep before retrying a would-block send.
pub const SEND_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Sleep between accept polls while no client is waiting.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

const LISTEN_BACKLOG: i32 = 20;

/// Low-delay type of service, set on every client socket.
const CLIENT_TOS: u32 = 224;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub frames_per_client: usize,
    pub mode: Mode,
    pub retry_delay: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            frames_per_client: DEFAULT_FRAMES_PER_CLIENT,
            mode: Mode::Blocking,
            retry_delay: SEND_RETRY_DELAY,
        }
    }
}

/// Bind a listener with address reuse and a backlog of 20.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, SourceError> {
    let bind_err = |source: io::Error| SourceError::Bind {
        addr: addr.to_string(),
        source,
    };
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
    tracing::info!(%addr, "source listening");
    Ok(socket.into())
}

/// Accept clients one at a time and stream frames to each, until cancelled or
/// `max_clients` have been served. Returns the frames fully sent per client.
pub fn serve(
    listener: &TcpListener,
    config: &SourceConfig,
    cancel: &CancelToken,
    max_clients: Option<usize>,
) -> Result<Vec<usize>, SourceError> {
    listener.set_nonblocking(true)?;
    let mut sent = Vec::new();
    while max_clients.map_or(true, |max| sent.len() < max) {
        if cancel.is_cancelled() {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::info!(%peer, mode = %config.mode, "client accepted");
                let n = serve_client(stream, config, cancel)?;
                tracing::info!(%peer, frames = n, "client closed");
                sent.push(n);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if cancel.sleep(ACCEPT_POLL) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(SourceError::Accept(e)),
        }
    }
    Ok(sent)
}

fn serve_client(
    mut stream: TcpStream,
    config: &SourceConfig,
    cancel: &CancelToken,
) -> Result<usize, SourceError> {
    stream.set_nonblocking(config.mode == Mode::NonBlocking)?;
    stream.set_nodelay(true)?;
    if let Err(e) = SockRef::from(&stream).set_tos(CLIENT_TOS) {
        tracing::debug!(error = %e, "IP_TOS not applied");
    }
    for i in 0..config.frames_per_client {
        if cancel.is_cancelled() {
            return Ok(i);
        }
        let frame = source_frame(i);
        let result = match config.mode {
            Mode::Blocking => stream.write_all(&frame),
            Mode::NonBlocking => {
                send_non_blocking(&mut stream, &frame, config.retry_delay, cancel)
            }
        };
        if let Err(e) = result {
            if e.kind() == io::ErrorKind::ConnectionReset {
                tracing::warn!(frame = i, "connection reset");
            } else {
                tracing::warn!(frame = i, error = %e, "send failed");
            }
            return Ok(i);
        }
        tracing::trace!(frame = i, "sent");
    }
    Ok(config.frames_per_client)
}

/// Send one frame on a non-blocking socket, resuming after partial writes.
fn send_non_blocking(
    stream: &mut TcpStream,
    frame: &[u8; FRAME_LEN],
    retry_delay: Duration,
    cancel: &CancelToken,
) -> io::Result<()> {
    let mut offset = 0;
    while offset < FRAME_LEN {
        match stream.write(&frame[offset..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "send returned 0")),
            Ok(n) => offset += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::trace!(offset, "send would block");
                if cancel.sleep(retry_delay) {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SYNC_BYTE;
    use std::io::Read;

    fn loopback() -> TcpListener {
        bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    fn read_all(addr: SocketAddr) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn blocking_source_sends_indexed_frames() {
        let listener = loopback();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || read_all(addr));
        let config = SourceConfig {
            frames_per_client: 300,
            ..SourceConfig::default()
        };
        let sent = serve(&listener, &config, &CancelToken::new(), Some(1)).unwrap();
        assert_eq!(sent, vec![300]);

        let data = client.join().unwrap();
        assert_eq!(data.len(), 300 * FRAME_LEN);
        for (i, frame) in data.chunks(FRAME_LEN).enumerate() {
            assert_eq!(frame[0], SYNC_BYTE);
            assert_eq!(frame[1], i as u8);
        }
    }

    #[test]
    fn non_blocking_source_sends_every_byte() {
        let listener = loopback();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || read_all(addr));
        let config = SourceConfig {
            frames_per_client: 500,
            mode: Mode::NonBlocking,
            retry_delay: Duration::from_millis(5),
        };
        let sent = serve(&listener, &config, &CancelToken::new(), Some(1)).unwrap();
        assert_eq!(sent, vec![500]);
        assert_eq!(client.join().unwrap().len(), 500 * FRAME_LEN);
    }

    #[test]
    fn cancel_stops_idle_accept_loop() {
        let listener = loopback();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        let sent = serve(&listener, &SourceConfig::default(), &cancel, None).unwrap();
        canceller.join().unwrap();
        assert!(sent.is_empty());
    }

    #[test]
    fn bind_conflict_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(matches!(bind(addr), Err(SourceError::Bind { .. })));
    }
}
