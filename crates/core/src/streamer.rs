//! The streamer capability consumed by the session and scheduler.
//!
//! A [`Streamer`] owns media delivery for the single active session: it
//! binds transport during SETUP, reports its server-side ports for the
//! `Transport:` response, and pushes the current frame when the scheduler
//! asks. The session never knows which codec backs it.
//!
//! [`RtpStreamer`] is the concrete implementation, generic over a
//! [`Packetizer`]: `RtpStreamer<MjpegPacketizer>` and
//! `RtpStreamer<H264Packetizer>` are the two build-time codec choices.
//!
//! Frames reach the streamer through a [`FrameSource`] — a latest-frame
//! slot shared with the producer (camera driver or simulator thread). The
//! streamer always delivers the newest frame and never queues: on a
//! constrained device, a stale backlog is worse than a dropped frame.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::h264::H264Packetizer;
use crate::media::mjpeg::MjpegPacketizer;
use crate::media::{Frame, Packetizer};
use crate::net::{ClientConnection, RTP_CHANNEL};
use crate::stream::CodecFamily;

/// Media-delivery collaborator driven by the session (SETUP) and the
/// scheduler (per-tick frame push).
pub trait Streamer {
    /// Bind the negotiated transport. For UDP, `client_rtp_port` and
    /// `client_rtcp_port` are the parsed client ports and `peer` is the
    /// control connection's address; for interleaved TCP both ports are
    /// ignored.
    fn init_transport(
        &mut self,
        peer: IpAddr,
        client_rtp_port: u16,
        client_rtcp_port: u16,
        interleaved: bool,
    ) -> Result<()>;

    /// Server-side RTP port, 0 until a UDP transport is bound.
    fn rtp_server_port(&self) -> u16;

    /// Server-side RTCP port, 0 until a UDP transport is bound.
    fn rtcp_server_port(&self) -> u16;

    /// Deliver the current frame to the client. `sink` is the control
    /// connection, used only by interleaved transports.
    fn push_frame(&mut self, now_ms: u64, sink: &mut dyn ClientConnection) -> Result<()>;
}

/// Latest-frame slot shared between the frame producer and the scheduler
/// tick. Cloning shares the slot.
#[derive(Clone, Default)]
pub struct FrameSource {
    latest: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl FrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame. Called from the producer thread.
    pub fn publish(&self, frame: Frame) {
        *self.latest.lock() = Some(Arc::new(frame));
    }

    /// The most recently published frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.lock().clone()
    }
}

/// Where RTP packets go after SETUP.
enum Delivery {
    /// SETUP has not run yet.
    Unbound,
    /// Bound UDP socket pair; RTCP socket is held for symmetry and port
    /// reporting even though this server originates no RTCP.
    Udp {
        rtp: UdpSocket,
        #[allow(dead_code)]
        rtcp: UdpSocket,
        dest: SocketAddr,
    },
    /// RTP records ride the control connection on channel 0.
    Interleaved,
}

/// First RTP port tried when binding the server-side UDP pair.
const UDP_PORT_BASE: u16 = 50000;
/// Even/odd pairs probed before giving up.
const UDP_PORT_ATTEMPTS: u16 = 64;

/// [`Streamer`] delivering frames from a [`FrameSource`] as RTP, over UDP
/// or interleaved on the control connection.
pub struct RtpStreamer<P: Packetizer> {
    packetizer: P,
    source: FrameSource,
    delivery: Delivery,
    timestamp_increment: u32,
}

impl RtpStreamer<MjpegPacketizer> {
    pub fn mjpeg(source: FrameSource) -> Self {
        Self::new(MjpegPacketizer::with_random_ssrc(), source, CodecFamily::Mjpeg)
    }
}

impl RtpStreamer<H264Packetizer> {
    pub fn h264(source: FrameSource) -> Self {
        Self::new(H264Packetizer::with_random_ssrc(), source, CodecFamily::H264)
    }
}

impl<P: Packetizer> RtpStreamer<P> {
    pub fn new(packetizer: P, source: FrameSource, codec: CodecFamily) -> Self {
        Self {
            packetizer,
            source,
            delivery: Delivery::Unbound,
            timestamp_increment: codec.clock_rate() / codec.framerate(),
        }
    }

    /// Bind an adjacent even/odd UDP port pair for RTP/RTCP (RFC 3550 §11).
    fn bind_udp_pair() -> Result<(UdpSocket, UdpSocket)> {
        for i in 0..UDP_PORT_ATTEMPTS {
            let rtp_port = UDP_PORT_BASE + i * 2;
            let Ok(rtp) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, rtp_port)) else {
                continue;
            };
            if let Ok(rtcp) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, rtp_port + 1)) {
                return Ok((rtp, rtcp));
            }
        }
        Err(RtspError::NoUdpPortPair)
    }
}

impl<P: Packetizer> Streamer for RtpStreamer<P> {
    fn init_transport(
        &mut self,
        peer: IpAddr,
        client_rtp_port: u16,
        _client_rtcp_port: u16,
        interleaved: bool,
    ) -> Result<()> {
        if interleaved {
            tracing::info!(codec = self.packetizer.codec_name(), "interleaved TCP transport");
            self.delivery = Delivery::Interleaved;
            return Ok(());
        }

        let (rtp, rtcp) = Self::bind_udp_pair()?;
        let dest = SocketAddr::new(peer, client_rtp_port);
        tracing::info!(
            codec = self.packetizer.codec_name(),
            %dest,
            server_rtp_port = rtp.local_addr()?.port(),
            "UDP transport bound"
        );
        self.delivery = Delivery::Udp { rtp, rtcp, dest };
        Ok(())
    }

    fn rtp_server_port(&self) -> u16 {
        match &self.delivery {
            Delivery::Udp { rtp, .. } => rtp.local_addr().map(|a| a.port()).unwrap_or(0),
            _ => 0,
        }
    }

    fn rtcp_server_port(&self) -> u16 {
        match &self.delivery {
            Delivery::Udp { rtcp, .. } => rtcp.local_addr().map(|a| a.port()).unwrap_or(0),
            _ => 0,
        }
    }

    fn push_frame(&mut self, now_ms: u64, sink: &mut dyn ClientConnection) -> Result<()> {
        let Some(frame) = self.source.latest() else {
            // Producer has not delivered a frame yet; nothing to send.
            return Ok(());
        };

        let packets = self.packetizer.packetize(&frame, self.timestamp_increment);

        match &self.delivery {
            Delivery::Unbound => return Err(RtspError::TransportNotConfigured),
            Delivery::Udp { rtp, dest, .. } => {
                for packet in &packets {
                    rtp.send_to(packet, *dest)?;
                }
            }
            Delivery::Interleaved => {
                for packet in &packets {
                    sink.send_interleaved(RTP_CHANNEL, packet)?;
                }
            }
        }

        tracing::trace!(now_ms, packets = packets.len(), "frame pushed");
        Ok(())
    }
}
