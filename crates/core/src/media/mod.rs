//! Media frames and RTP packetization.
//!
//! This module provides the [`Packetizer`] trait and the codec-specific
//! implementations that convert encoded camera frames into RTP packets.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame is split into one or more RTP packets. Every
//! RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping) — for reordering and loss detection.
//! - **Timestamp** (32-bit) — 90 kHz media clock for video.
//! - **SSRC** (32-bit) — randomly chosen to identify the sender.
//! - **Marker bit** — set on the last packet of a frame.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | MJPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) |
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |

pub mod h264;
pub mod mjpeg;
pub mod rtp;

/// One encoded video frame handed from the camera (or simulator) to the
/// streamer. Dimensions ride along because the MJPEG payload header
/// carries them per packet (RFC 2435 §3.1).
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u16,
    pub height: u16,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u16, height: u16) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// Codec-specific RTP packetizer.
///
/// Each returned `Vec<u8>` is a complete RTP packet: 12-byte header
/// (RFC 3550 §5.1) followed by the codec-specific payload.
/// `timestamp_increment` advances the RTP timestamp after the frame,
/// typically `clock_rate / fps` (e.g. 4500 for 20 fps at 90 kHz).
pub trait Packetizer: Send {
    fn packetize(&mut self, frame: &Frame, timestamp_increment: u32) -> Vec<Vec<u8>>;

    /// Codec name for logs (e.g. `"JPEG"`, `"H264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;
}
