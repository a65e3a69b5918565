//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses. One `m=` section
//! per response — a camera stream is a single video track:
//!
//! ```text
//! v=0                                  ← protocol version
//! o=- <origin-id> 1 IN IP4 <host>      ← origin, session-unique id
//! s=<session-name>
//! i=<session-info>
//! t=0 0                                ← timing (live stream)
//! a=tool:camrtsp
//! a=type:broadcast
//! a=control:*
//! a=range:npt=0-                       ← live, no seeking
//! m=video 0 RTP/AVP <payload-type>     ← 26 (JPEG) or 96 (H.264 dynamic)
//! c=IN IP4 0.0.0.0
//! b=AS:<kbps>
//! a=rtpmap:<pt> <codec>/90000
//! a=fmtp:<pt> ...                      ← codec parameters
//! a=framerate:<fps>
//! a=control:track1
//! ```

use crate::stream::{CodecFamily, StreamId};

/// Generate the SDP session description for one logical stream.
///
/// `origin_id` is the session-unique numeric identifier for the `o=` line.
/// `origin_host` is the address part only (no port); callers strip the port
/// from the request's host:port. `(width, height)` feed the MJPEG `a=fmtp`
/// dimensions hint.
pub fn describe_sdp(
    stream: StreamId,
    origin_id: u32,
    origin_host: &str,
    width: u16,
    height: u16,
) -> String {
    let codec = stream.codec();
    let pt = codec.payload_type();
    let host = if origin_host.is_empty() {
        "0.0.0.0"
    } else {
        origin_host
    };

    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!("o=- {} 1 IN IP4 {}", origin_id, host));
    match codec {
        CodecFamily::Mjpeg => {
            sdp.push("s=Camera MJPEG Stream".to_string());
            sdp.push("i=Live MJPEG video feed".to_string());
        }
        CodecFamily::H264 => {
            sdp.push("s=Camera H.264 Stream".to_string());
            sdp.push("i=Live H.264 video feed".to_string());
        }
    }
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:camrtsp".to_string());
    sdp.push("a=type:broadcast".to_string());
    sdp.push("a=control:*".to_string());
    sdp.push("a=range:npt=0-".to_string());
    sdp.push(format!("m=video 0 RTP/AVP {}", pt));
    sdp.push("c=IN IP4 0.0.0.0".to_string());
    sdp.push(format!("b=AS:{}", codec.bandwidth_kbps()));
    sdp.push(format!(
        "a=rtpmap:{} {}/{}",
        pt,
        codec.encoding_name(),
        codec.clock_rate()
    ));
    match codec {
        CodecFamily::Mjpeg => {
            sdp.push(format!(
                "a=fmtp:{} width={};height={};quality=10",
                pt, width, height
            ));
        }
        CodecFamily::H264 => {
            sdp.push(format!(
                "a=fmtp:{} packetization-mode=1;profile-level-id=42E01F",
                pt
            ));
        }
    }
    sdp.push(format!("a=framerate:{}", codec.framerate()));
    sdp.push("a=control:track1".to_string());

    tracing::trace!(stream = stream.index(), "SDP generated");

    format!("{}\r\n", sdp.join("\r\n"))
}
