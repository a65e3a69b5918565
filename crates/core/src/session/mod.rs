//! RTSP session state machine (RFC 2326 §3, §12.37).
//!
//! One session per accepted control connection, exclusively owned by the
//! scheduler. The session parses each incoming request, tracks negotiated
//! transport and playback state, and writes protocol responses back to the
//! connection.
//!
//! ## Session lifecycle
//!
//! ```text
//! accept            -> Idle
//! SETUP             -> Ready      (transport negotiated)
//! PLAY              -> Playing    (rejected from Idle: 455)
//! TEARDOWN          -> Stopped    (terminal, from any state)
//! peer close        -> Stopped
//! idle deadline     -> Stopped    (enforced by the scheduler)
//! ```
//!
//! `Stopped` is never left; the scheduler destroys the session on the next
//! tick. OPTIONS, DESCRIBE and GET_PARAMETER are legal in every live state.
//!
//! Nothing here is fatal to the host process: malformed requests are
//! dropped silently with the connection kept open, and I/O failures
//! degrade to "drop this session".

pub mod transport;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rand::RngExt;

use crate::error::Result;
use crate::net::{ClientConnection, ReadOutcome};
use crate::protocol::request::MAX_REQUEST_BYTES;
use crate::protocol::{Method, ParsedRequest, RtspResponse, sdp};
use crate::stream::StreamId;
use crate::streamer::Streamer;

pub use transport::TransportSpec;

/// Session timeout advertised to clients and enforced by the scheduler
/// (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Playback state. Modeled as an explicit enum so illegal transitions are
/// rejected instead of reaching a half-configured streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no transport negotiated yet.
    Idle,
    /// SETUP completed; transport is bound.
    Ready,
    /// PLAY completed; the scheduler pushes frames.
    Playing,
    /// Terminal. Never reset.
    Stopped,
}

/// One RTSP client session.
///
/// The receive scratch buffer is allocated once at construction and reused
/// for every poll — bounded memory, no growth, overflow is a parse error.
pub struct RtspSession {
    id: u32,
    state: SessionState,
    stream_id: Option<StreamId>,
    transport: Option<TransportSpec>,
    sdp_origin_id: u32,
    timeout_secs: u64,
    last_activity_ms: u64,
    video_size: (u16, u16),
    recv_buf: Box<[u8; MAX_REQUEST_BYTES]>,
}

impl RtspSession {
    /// Create a session for a freshly accepted connection.
    ///
    /// The session ID is a 31-bit random value with the high bit forced
    /// set, so it never collides with the zero/small IDs some NVRs treat
    /// as sentinel values.
    pub fn new(now_ms: u64, video_size: (u16, u16), timeout_secs: u64) -> Self {
        let mut rng = rand::rng();
        let id = rng.random::<u32>() | 0x8000_0000;
        tracing::debug!(session_id = id, "session created");
        Self {
            id,
            state: SessionState::Idle,
            stream_id: None,
            transport: None,
            sdp_origin_id: rng.random::<u32>(),
            timeout_secs,
            last_activity_ms: now_ms,
            video_size,
            recv_buf: Box::new([0u8; MAX_REQUEST_BYTES]),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the scheduler should push frames (a successful PLAY was
    /// observed and the session is not terminal).
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Playing
    }

    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    /// Stream resolved by the last DESCRIBE, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        self.stream_id
    }

    /// Transport negotiated by SETUP, if any.
    pub fn transport(&self) -> Option<TransportSpec> {
        self.transport
    }

    /// Force the terminal state (peer loss, idle deadline, push failure).
    pub fn mark_stopped(&mut self) {
        if self.state != SessionState::Stopped {
            tracing::debug!(session_id = self.id, "session stopped");
            self.state = SessionState::Stopped;
        }
    }

    /// Whether the advertised inactivity timeout has elapsed.
    pub fn idle_deadline_exceeded(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) >= self.timeout_secs * 1000
    }

    /// `Session:` response header value, e.g. `"2158018829;timeout=60"`.
    fn session_header(&self) -> String {
        format!("{};timeout={}", self.id, self.timeout_secs)
    }

    /// Poll the control connection for one request and handle it.
    ///
    /// A read timeout is a no-op; peer close and I/O failures mark the
    /// session terminal; an unparseable request is dropped silently with
    /// the connection kept open (NVRs occasionally probe with other
    /// protocols and expect the control channel to survive).
    pub fn poll_control<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        streamer: Option<&mut (dyn Streamer + '_)>,
        now_ms: u64,
        timeout: Duration,
    ) {
        if self.state == SessionState::Stopped {
            return;
        }

        let outcome = match conn.read_with_timeout(&mut self.recv_buf[..], timeout) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(session_id = self.id, error = %e, "control read failed");
                self.mark_stopped();
                return;
            }
        };

        match outcome {
            ReadOutcome::NoData => {}
            ReadOutcome::Closed => {
                tracing::info!(session_id = self.id, "peer closed control connection");
                self.mark_stopped();
            }
            ReadOutcome::Data(n) => {
                self.last_activity_ms = now_ms;
                match ParsedRequest::parse(&self.recv_buf[..n]) {
                    Ok(request) => {
                        if let Err(e) = self.dispatch(&request, conn, streamer) {
                            tracing::warn!(session_id = self.id, error = %e, "response failed");
                            self.mark_stopped();
                        }
                    }
                    Err(e) => {
                        tracing::debug!(session_id = self.id, error = %e, "dropping request");
                    }
                }
            }
        }
    }

    fn dispatch<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
        streamer: Option<&mut (dyn Streamer + '_)>,
    ) -> Result<()> {
        tracing::debug!(
            session_id = self.id,
            method = request.method.as_str(),
            cseq = %request.cseq,
            "request"
        );

        match request.method {
            Method::Options => self.on_options(request, conn),
            Method::Describe => self.on_describe(request, conn),
            Method::Setup => self.on_setup(request, conn, streamer),
            Method::Play => self.on_play(request, conn),
            Method::Teardown => self.on_teardown(request, conn),
            Method::GetParameter => self.on_get_parameter(request, conn),
            Method::Unknown => {
                tracing::debug!(session_id = self.id, "ignoring unknown verb");
                Ok(())
            }
        }
    }

    fn on_options<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
    ) -> Result<()> {
        let response = RtspResponse::ok().add_header("CSeq", &request.cseq).add_header(
            "Public",
            "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN, GET_PARAMETER",
        );
        conn.write_all(response.serialize().as_bytes())
    }

    fn on_describe<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
    ) -> Result<()> {
        let Some(stream) = StreamId::resolve(&request.url_prefix, &request.url_suffix) else {
            tracing::warn!(
                session_id = self.id,
                prefix = %request.url_prefix,
                suffix = %request.url_suffix,
                "DESCRIBE for unknown stream"
            );
            let response = RtspResponse::stream_not_found().add_header("CSeq", &request.cseq);
            return conn.write_all(response.serialize().as_bytes());
        };

        self.stream_id = Some(stream);

        let origin_host = request.host_port.split(':').next().unwrap_or("");
        let sdp_body = sdp::describe_sdp(
            stream,
            self.sdp_origin_id,
            origin_host,
            self.video_size.0,
            self.video_size.1,
        );
        let content_base = format!("rtsp://{}/{}/", request.host_port, stream.path());

        let response = RtspResponse::ok()
            .add_header("CSeq", &request.cseq)
            .add_header("Content-Base", &content_base)
            .add_header("Content-Type", "application/sdp")
            .with_body(sdp_body);
        conn.write_all(response.serialize().as_bytes())
    }

    fn on_setup<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
        streamer: Option<&mut (dyn Streamer + '_)>,
    ) -> Result<()> {
        if self.state == SessionState::Playing {
            tracing::warn!(session_id = self.id, "SETUP while playing rejected");
            let response = RtspResponse::method_not_valid().add_header("CSeq", &request.cseq);
            return conn.write_all(response.serialize().as_bytes());
        }

        let Some(streamer) = streamer else {
            // Fail safely: no streamer means no response, but the control
            // connection survives and the process keeps serving.
            tracing::error!(session_id = self.id, "SETUP with no streamer available");
            return Ok(());
        };

        let spec = TransportSpec::from_request(request);
        let peer_ip = conn
            .peer_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        if let Err(e) = streamer.init_transport(
            peer_ip,
            request.client_rtp_port,
            request.client_rtcp_port,
            spec.is_tcp(),
        ) {
            tracing::error!(session_id = self.id, error = %e, "transport init failed");
            let response =
                RtspResponse::new(500, "Internal Server Error").add_header("CSeq", &request.cseq);
            return conn.write_all(response.serialize().as_bytes());
        }

        self.transport = Some(spec);
        self.state = SessionState::Ready;
        tracing::info!(session_id = self.id, transport = ?spec, "transport configured");

        let transport_header =
            spec.header_value(streamer.rtp_server_port(), streamer.rtcp_server_port());
        let response = RtspResponse::ok()
            .add_header("CSeq", &request.cseq)
            .add_header("Transport", &transport_header)
            .add_header("Session", &self.session_header());
        conn.write_all(response.serialize().as_bytes())
    }

    fn on_play<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
    ) -> Result<()> {
        match self.state {
            SessionState::Idle => {
                tracing::warn!(session_id = self.id, "PLAY before SETUP rejected");
                let response = RtspResponse::method_not_valid().add_header("CSeq", &request.cseq);
                conn.write_all(response.serialize().as_bytes())
            }
            SessionState::Ready | SessionState::Playing => {
                let host = if request.host_port.is_empty() {
                    "0.0.0.0"
                } else {
                    request.host_port.as_str()
                };
                let stream_path = self.stream_id.map(StreamId::path).unwrap_or("mjpeg/1");
                // seq/rtptime are always zero: this server does not seek.
                let rtp_info =
                    format!("url=rtsp://{}/{}/track1;seq=0;rtptime=0", host, stream_path);

                let response = RtspResponse::ok()
                    .add_header("CSeq", &request.cseq)
                    .add_header("Range", "npt=0.000-")
                    .add_header("Session", &self.session_header())
                    .add_header("RTP-Info", &rtp_info);
                conn.write_all(response.serialize().as_bytes())?;

                // Only after the response is on the wire may the scheduler
                // start pushing frames.
                self.state = SessionState::Playing;
                tracing::info!(session_id = self.id, "session playing");
                Ok(())
            }
            SessionState::Stopped => Ok(()),
        }
    }

    fn on_teardown<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
    ) -> Result<()> {
        let response = RtspResponse::ok()
            .add_header("CSeq", &request.cseq)
            .add_header("Session", &self.session_header());
        let result = conn.write_all(response.serialize().as_bytes());

        // Terminal regardless of whether the acknowledgment got through.
        self.state = SessionState::Stopped;
        tracing::info!(session_id = self.id, "session terminated via TEARDOWN");
        result
    }

    /// GET_PARAMETER is a keep-alive ping; no request body is required
    /// (RFC 2326 §10.8).
    fn on_get_parameter<C: ClientConnection>(
        &mut self,
        request: &ParsedRequest,
        conn: &mut C,
    ) -> Result<()> {
        tracing::trace!(session_id = self.id, "GET_PARAMETER keepalive");
        let response = RtspResponse::ok()
            .add_header("CSeq", &request.cseq)
            .add_header("Session", &self.id.to_string());
        conn.write_all(response.serialize().as_bytes())
    }
}
