//! Single-session connection scheduler.
//!
//! The device serves one RTSP client at a time — the board has memory for
//! exactly one session's buffers and one streamer's sockets. The scheduler
//! owns that session's whole lifecycle from a cooperative
//! [`tick`](ConnectionScheduler::tick) the host process calls at high
//! frequency, interleaved with its other duties (ONVIF replies, web UI,
//! watchdog).
//!
//! Per tick:
//!
//! 1. No active session → non-blocking accept; lazily construct the
//!    streamer; a failed construction closes the new connection on the
//!    spot.
//! 2. Active session → poll one request (bounded timeout), then push a
//!    frame if the session is playing and the frame interval elapsed, then
//!    enforce the idle deadline, then destroy the session if it went
//!    terminal.
//!
//! A frame is never pushed after the same tick's poll marked the session
//! terminal. The tick never blocks beyond the configured read timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::net::AcceptSource;
use crate::session::{DEFAULT_SESSION_TIMEOUT_SECS, RtspSession};
use crate::streamer::Streamer;

/// Constructs the streamer on first accept. Failure is survivable: the
/// pending connection is dropped and the next accept retries.
pub type StreamerFactory = Box<dyn FnMut() -> Result<Box<dyn Streamer>> + Send>;

/// Scheduling parameters.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between frame pushes — a rate ceiling, independent
    /// of actual camera frame production. 50 ms matches a 20 fps MJPEG
    /// sensor; H.264 builds typically configure `1000 / fps`.
    pub frame_interval_ms: u64,
    /// Inactivity window advertised in `Session:` headers and enforced
    /// against `last_activity`.
    pub session_timeout_secs: u64,
    /// Read timeout per poll. Zero keeps the tick a pure poll.
    pub read_timeout: Duration,
    /// Frame dimensions advertised in the MJPEG SDP.
    pub video_size: (u16, u16),
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            read_timeout: Duration::ZERO,
            video_size: (640, 480),
        }
    }
}

struct ActiveSession<C> {
    session: RtspSession,
    conn: C,
}

/// Owns the listener, the lazily-built streamer and at most one session.
///
/// Session and streamer state are only ever touched from within
/// [`tick`](Self::tick)'s synchronous call chain, so the whole core needs
/// no locking.
pub struct ConnectionScheduler<L: AcceptSource> {
    listener: L,
    factory: StreamerFactory,
    streamer: Option<Box<dyn Streamer>>,
    active: Option<ActiveSession<L::Conn>>,
    config: SchedulerConfig,
    last_frame_ms: u64,
}

impl<L: AcceptSource> ConnectionScheduler<L> {
    pub fn new(listener: L, factory: StreamerFactory, config: SchedulerConfig) -> Self {
        Self {
            listener,
            factory,
            streamer: None,
            active: None,
            config,
            last_frame_ms: 0,
        }
    }

    pub fn has_active_session(&self) -> bool {
        self.active.is_some()
    }

    /// One cooperative scheduling step. `now_ms` is the caller's
    /// monotonic millisecond clock; tests inject a synthetic one.
    pub fn tick(&mut self, now_ms: u64) {
        if self.active.is_some() {
            self.tick_active(now_ms);
        } else {
            self.tick_accept(now_ms);
        }
    }

    fn tick_accept(&mut self, now_ms: u64) {
        let conn = match self.listener.accept_if_pending() {
            Ok(Some(conn)) => conn,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                return;
            }
        };

        if self.streamer.is_none() {
            match (self.factory)() {
                Ok(streamer) => self.streamer = Some(streamer),
                Err(e) => {
                    // No streamer, no session: close the connection now
                    // rather than orphan it.
                    tracing::error!(error = %e, "streamer construction failed, dropping client");
                    drop(conn);
                    return;
                }
            }
        }

        let session = RtspSession::new(
            now_ms,
            self.config.video_size,
            self.config.session_timeout_secs,
        );
        tracing::info!(session_id = session.id(), "RTSP client connected");
        self.last_frame_ms = 0;
        self.active = Some(ActiveSession { session, conn });
    }

    fn tick_active(&mut self, now_ms: u64) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        active.session.poll_control(
            &mut active.conn,
            self.streamer.as_deref_mut(),
            now_ms,
            self.config.read_timeout,
        );

        // The terminal check here is what guarantees a teardown observed
        // above never gets a trailing frame in the same tick.
        if active.session.is_streaming()
            && !active.session.is_stopped()
            && now_ms.saturating_sub(self.last_frame_ms) >= self.config.frame_interval_ms
        {
            if let Some(streamer) = self.streamer.as_deref_mut() {
                if let Err(e) = streamer.push_frame(now_ms, &mut active.conn) {
                    tracing::warn!(
                        session_id = active.session.id(),
                        error = %e,
                        "frame push failed, dropping session"
                    );
                    active.session.mark_stopped();
                }
            }
            self.last_frame_ms = now_ms;
        }

        if !active.session.is_stopped() && active.session.idle_deadline_exceeded(now_ms) {
            tracing::info!(session_id = active.session.id(), "idle session timed out");
            active.session.mark_stopped();
        }

        if active.session.is_stopped() {
            tracing::info!(session_id = active.session.id(), "RTSP client disconnected");
            // Dropping the connection releases the socket exactly once.
            self.active = None;
        }
    }

    /// Drive the tick loop against the real clock until `running` clears.
    /// `pace` bounds the busy-wait between ticks.
    pub fn run(&mut self, running: &AtomicBool, pace: Duration) {
        let start = Instant::now();
        while running.load(Ordering::SeqCst) {
            self.tick(start.elapsed().as_millis() as u64);
            thread::sleep(pace);
        }
        tracing::debug!("scheduler loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RtspError;
    use crate::testutil::{MockConnection, MockListener, MockStreamer, StreamerLog};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const SETUP_UDP: &str = "SETUP rtsp://cam/mjpeg/1 RTSP/1.0\r\nCSeq: 1\r\n\
         Transport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n";
    const PLAY: &str = "PLAY rtsp://cam/mjpeg/1 RTSP/1.0\r\nCSeq: 2\r\n\r\n";
    const TEARDOWN: &str = "TEARDOWN rtsp://cam/mjpeg/1 RTSP/1.0\r\nCSeq: 3\r\n\r\n";

    fn scheduler_with(
        conn: MockConnection,
        config: SchedulerConfig,
    ) -> (ConnectionScheduler<MockListener>, Arc<Mutex<StreamerLog>>) {
        let mut listener = MockListener::new();
        listener.queue_connection(conn);
        let (streamer, log) = MockStreamer::new();
        let mut slot = Some(streamer);
        let factory: StreamerFactory = Box::new(move || {
            slot.take()
                .map(|s| Box::new(s) as Box<dyn Streamer>)
                .ok_or(RtspError::StreamerUnavailable)
        });
        (ConnectionScheduler::new(listener, factory, config), log)
    }

    #[test]
    fn accept_creates_session() {
        let (mut sched, _log) = scheduler_with(MockConnection::new(), SchedulerConfig::default());
        assert!(!sched.has_active_session());
        sched.tick(0);
        assert!(sched.has_active_session());
    }

    #[test]
    fn failed_streamer_construction_drops_connection() {
        let mut listener = MockListener::new();
        listener.queue_connection(MockConnection::new());
        let factory: StreamerFactory = Box::new(|| Err(RtspError::StreamerUnavailable));
        let mut sched = ConnectionScheduler::new(listener, factory, SchedulerConfig::default());

        sched.tick(0);
        assert!(!sched.has_active_session());
    }

    #[test]
    fn frame_pushes_rate_limited() {
        let mut conn = MockConnection::with_requests(&[SETUP_UDP, PLAY]);
        conn.queue_nodata(); // keep the script explicit about silence
        let (mut sched, log) = scheduler_with(conn, SchedulerConfig::default());

        // Fast synthetic clock: tick every 10 ms over a 1 s window.
        for now_ms in (0..=1000).step_by(10) {
            sched.tick(now_ms);
        }

        let times = log.lock().push_times.clone();
        assert!(!times.is_empty(), "playing session must receive frames");
        assert!(
            times.len() <= 21,
            "50 ms interval allows at most 21 pushes in 1 s, got {}",
            times.len()
        );
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= 50, "pushes too close: {:?}", pair);
        }
    }

    #[test]
    fn no_frames_before_play() {
        let conn = MockConnection::with_requests(&[SETUP_UDP]);
        let (mut sched, log) = scheduler_with(conn, SchedulerConfig::default());

        for now_ms in (0..=500).step_by(10) {
            sched.tick(now_ms);
        }
        assert!(log.lock().push_times.is_empty());
    }

    #[test]
    fn no_frame_push_after_teardown_in_same_tick() {
        let mut conn = MockConnection::with_requests(&[SETUP_UDP, PLAY]);
        // One quiet poll, then TEARDOWN lands exactly when a frame is due.
        conn.queue_nodata();
        conn.queue_request(TEARDOWN);
        let log_handle = conn.written_log();
        let (mut sched, log) = scheduler_with(conn, SchedulerConfig::default());

        for now_ms in [0, 10, 60, 120, 180] {
            sched.tick(now_ms);
        }

        let times = log.lock().push_times.clone();
        // PLAY at t=10; frames at t=60 and t=120; TEARDOWN observed at
        // t=180 must suppress that tick's push.
        assert_eq!(times, vec![60, 120]);
        assert!(!sched.has_active_session());
        assert!(log_handle.text().contains("CSeq: 3\r\n"));
    }

    #[test]
    fn peer_close_frees_the_slot() {
        let mut conn = MockConnection::new();
        conn.queue_closed();
        let (mut sched, _log) = scheduler_with(conn, SchedulerConfig::default());

        sched.tick(0);
        assert!(sched.has_active_session());
        sched.tick(10);
        assert!(!sched.has_active_session());
    }

    #[test]
    fn idle_session_expires() {
        let conn = MockConnection::with_requests(&[SETUP_UDP]);
        let (mut sched, _log) = scheduler_with(conn, SchedulerConfig::default());

        sched.tick(0); // accept
        sched.tick(1); // SETUP
        assert!(sched.has_active_session());

        // Just under the deadline: still alive.
        sched.tick(60_000);
        assert!(sched.has_active_session());
        // Past it (deadline measured from the SETUP activity at t=1).
        sched.tick(60_001);
        assert!(!sched.has_active_session());
    }

    #[test]
    fn new_client_gets_fresh_session_after_teardown() {
        let first = MockConnection::with_requests(&[TEARDOWN]);
        let second = MockConnection::new();

        let mut listener = MockListener::new();
        listener.queue_connection(first);
        listener.queue_connection(second);
        let (streamer, _log) = MockStreamer::new();
        let mut slot = Some(streamer);
        let factory: StreamerFactory = Box::new(move || {
            slot.take()
                .map(|s| Box::new(s) as Box<dyn Streamer>)
                .ok_or(RtspError::StreamerUnavailable)
        });
        let mut sched =
            ConnectionScheduler::new(listener, factory, SchedulerConfig::default());

        sched.tick(0); // accept first
        sched.tick(1); // TEARDOWN → terminal → destroyed
        assert!(!sched.has_active_session());
        sched.tick(2); // second client admitted
        assert!(sched.has_active_session());
    }
}
