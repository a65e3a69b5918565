//! Socket abstraction consumed by the session and scheduler.
//!
//! The core never touches `std::net` types directly — it reads and writes
//! through [`ClientConnection`] and accepts through [`AcceptSource`]. This
//! keeps the session/scheduler testable with scripted connections and
//! mirrors the firmware split between protocol logic and the platform
//! socket layer.
//!
//! All provided TCP implementations are non-blocking: the scheduler tick
//! must be budgeted in milliseconds, so a slow peer can never stall the
//! process's other duties.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Interleaved channel carrying RTP on the control connection (RFC 2326 §10.12).
pub const RTP_CHANNEL: u8 = 0;
/// Interleaved channel carrying RTCP on the control connection.
pub const RTCP_CHANNEL: u8 = 1;

/// Outcome of a bounded-timeout read on the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// The peer closed the connection (end of stream).
    Closed,
    /// Nothing arrived within the timeout. Not an error — try again next tick.
    NoData,
}

/// One accepted client control connection.
///
/// The session owns its connection exclusively; dropping the value releases
/// the socket exactly once.
pub trait ClientConnection {
    /// Read once with an upper time bound. A zero timeout is a pure poll.
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome>;

    /// Write the entire buffer to the peer.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Write one interleaved record: `$ <channel> <len BE16> <payload>`
    /// (RFC 2326 §10.12). Used for RTP-over-TCP delivery on the control
    /// connection itself.
    fn send_interleaved(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(4 + payload.len());
        record.push(b'$');
        record.push(channel);
        record.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        record.extend_from_slice(payload);
        self.write_all(&record)
    }
}

/// Source of incoming client connections.
pub trait AcceptSource {
    type Conn: ClientConnection;

    /// Non-blocking accept: `Ok(None)` when no client is waiting.
    fn accept_if_pending(&mut self) -> Result<Option<Self::Conn>>;
}

/// [`ClientConnection`] over a non-blocking `TcpStream`.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer })
    }
}

/// Retry interval while waiting out a `WouldBlock` on a non-blocking socket.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

impl ClientConnection for TcpConnection {
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome> {
        let start = Instant::now();
        loop {
            match self.stream.read(buf) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => return Ok(ReadOutcome::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Ok(ReadOutcome::NoData);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match self.stream.write(&data[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// [`AcceptSource`] over a non-blocking `TcpListener`.
pub struct RtspListener {
    listener: TcpListener,
}

impl RtspListener {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "RTSP listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

impl AcceptSource for RtspListener {
    type Conn = TcpConnection;

    fn accept_if_pending(&mut self) -> Result<Option<TcpConnection>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "client connection pending");
                Ok(Some(TcpConnection::new(stream)?))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_accept(listener: &mut RtspListener) -> TcpConnection {
        for _ in 0..200 {
            if let Some(conn) = listener.accept_if_pending().unwrap() {
                return conn;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("no connection accepted");
    }

    #[test]
    fn accept_is_nonblocking() {
        let mut listener = RtspListener::bind("127.0.0.1:0").unwrap();
        assert!(listener.accept_if_pending().unwrap().is_none());
    }

    #[test]
    fn read_nodata_then_data_then_closed() {
        let mut listener = RtspListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let mut conn = wait_accept(&mut listener);

        let mut buf = [0u8; 64];
        assert_eq!(
            conn.read_with_timeout(&mut buf, Duration::ZERO).unwrap(),
            ReadOutcome::NoData
        );

        client.write_all(b"hello").unwrap();
        match conn
            .read_with_timeout(&mut buf, Duration::from_millis(500))
            .unwrap()
        {
            ReadOutcome::Data(n) => assert_eq!(&buf[..n], b"hello"),
            other => panic!("expected data, got {:?}", other),
        }

        drop(client);
        assert_eq!(
            conn.read_with_timeout(&mut buf, Duration::from_millis(500))
                .unwrap(),
            ReadOutcome::Closed
        );
    }

    #[test]
    fn interleaved_record_framing() {
        let mut listener = RtspListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut conn = wait_accept(&mut listener);

        conn.send_interleaved(RTP_CHANNEL, &[0xAA, 0xBB, 0xCC]).unwrap();

        let mut record = [0u8; 7];
        let mut client = client;
        client.read_exact(&mut record).unwrap();
        assert_eq!(record, [b'$', 0, 0, 3, 0xAA, 0xBB, 0xCC]);
    }
}
