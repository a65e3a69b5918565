//! Scripted collaborators for exercising the session and scheduler without
//! real sockets.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::net::{AcceptSource, ClientConnection, ReadOutcome};
use crate::streamer::Streamer;

/// One scripted outcome for a `read_with_timeout` call.
pub enum ScriptedRead {
    Data(Vec<u8>),
    NoData,
    Closed,
}

/// [`ClientConnection`] fed from a script. Each poll consumes one entry;
/// an exhausted script reads as no-data. Everything written is captured
/// in a shared log so tests can inspect it after the connection moves
/// into a scheduler.
pub struct MockConnection {
    script: VecDeque<ScriptedRead>,
    written: Arc<Mutex<Vec<u8>>>,
    peer: SocketAddr,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 99)), 51234),
        }
    }

    pub fn with_requests(requests: &[&str]) -> Self {
        let mut conn = Self::new();
        for request in requests {
            conn.queue_request(request);
        }
        conn
    }

    pub fn queue_request(&mut self, raw: &str) {
        self.script.push_back(ScriptedRead::Data(raw.as_bytes().to_vec()));
    }

    pub fn queue_nodata(&mut self) {
        self.script.push_back(ScriptedRead::NoData);
    }

    pub fn queue_closed(&mut self) {
        self.script.push_back(ScriptedRead::Closed);
    }

    /// Shared handle to the write log, usable after the connection is
    /// moved elsewhere.
    pub fn written_log(&self) -> WrittenLog {
        WrittenLog(self.written.clone())
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable view of everything a [`MockConnection`] wrote.
#[derive(Clone)]
pub struct WrittenLog(Arc<Mutex<Vec<u8>>>);

impl WrittenLog {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl ClientConnection for MockConnection {
    fn read_with_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<ReadOutcome> {
        match self.script.pop_front() {
            Some(ScriptedRead::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(ReadOutcome::Data(n))
            }
            Some(ScriptedRead::NoData) | None => Ok(ReadOutcome::NoData),
            Some(ScriptedRead::Closed) => Ok(ReadOutcome::Closed),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// [`AcceptSource`] handing out pre-queued mock connections.
#[derive(Default)]
pub struct MockListener {
    pending: VecDeque<MockConnection>,
}

impl MockListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_connection(&mut self, conn: MockConnection) {
        self.pending.push_back(conn);
    }
}

impl AcceptSource for MockListener {
    type Conn = MockConnection;

    fn accept_if_pending(&mut self) -> Result<Option<MockConnection>> {
        Ok(self.pending.pop_front())
    }
}

/// What a [`MockStreamer`] was asked to do.
#[derive(Default)]
pub struct StreamerLog {
    /// `(client_rtp_port, client_rtcp_port, interleaved)` per SETUP.
    pub init_calls: Vec<(u16, u16, bool)>,
    /// `now_ms` of every frame push.
    pub push_times: Vec<u64>,
}

/// Recording [`Streamer`] with fixed server ports 6970/6971.
pub struct MockStreamer {
    log: Arc<Mutex<StreamerLog>>,
}

impl MockStreamer {
    pub fn new() -> (Self, Arc<Mutex<StreamerLog>>) {
        let log = Arc::new(Mutex::new(StreamerLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl Streamer for MockStreamer {
    fn init_transport(
        &mut self,
        _peer: IpAddr,
        client_rtp_port: u16,
        client_rtcp_port: u16,
        interleaved: bool,
    ) -> Result<()> {
        self.log
            .lock()
            .init_calls
            .push((client_rtp_port, client_rtcp_port, interleaved));
        Ok(())
    }

    fn rtp_server_port(&self) -> u16 {
        6970
    }

    fn rtcp_server_port(&self) -> u16 {
        6971
    }

    fn push_frame(&mut self, now_ms: u64, _sink: &mut dyn ClientConnection) -> Result<()> {
        self.log.lock().push_times.push(now_ms);
        Ok(())
    }
}
