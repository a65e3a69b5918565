use super::rtp::RtpHeader;
use super::{Frame, Packetizer};

const DEFAULT_MTU: usize = 1400;

/// JPEG payload header length (RFC 2435 §3.1).
const JPEG_HEADER_LEN: usize = 8;

/// Q factor advertised to receivers; kept in step with the `quality=`
/// hint in the SDP fmtp line. Values below 128 select the standard
/// quantization tables scaled by Q (RFC 2435 §4.2).
const JPEG_Q: u8 = 10;

/// MJPEG RTP packetizer (RFC 2435).
///
/// Simpler than H.264 — there is no NAL concept; each JPEG frame is
/// fragmented directly. Every RTP payload starts with an 8-byte JPEG
/// header:
///
/// ```text
/// 0               1               2               3
/// +---------------+---------------+---------------+---------------+
/// | Type-specific |             Fragment Offset                  |
/// +---------------+---------------+---------------+---------------+
/// |     Type      |       Q       |     Width     |    Height     |
/// +---------------+---------------+---------------+---------------+
/// ```
///
/// - **Fragment offset**: byte offset of this fragment within the frame,
///   24-bit big-endian.
/// - **Type**: 1 (4:2:0 chroma subsampling, the camera sensor's output).
/// - **Width/Height**: frame dimensions divided by 8.
///
/// The frame payload is carried as produced by the camera; quantization
/// table handling beyond the Q factor is the producer's concern.
///
/// Uses static payload type 26 (`a=rtpmap:26 JPEG/90000`, RFC 3551).
#[derive(Debug)]
pub struct MjpegPacketizer {
    header: RtpHeader,
    mtu: usize,
}

impl MjpegPacketizer {
    pub fn new(ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(26, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc() -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(26),
            mtu: DEFAULT_MTU,
        }
    }

    fn jpeg_payload_header(frame: &Frame, offset: usize) -> [u8; JPEG_HEADER_LEN] {
        let off = (offset as u32).to_be_bytes();
        [
            0, // type-specific
            off[1],
            off[2],
            off[3],
            1, // type: 4:2:0
            JPEG_Q,
            (frame.width / 8).min(255) as u8,
            (frame.height / 8).min(255) as u8,
        ]
    }
}

impl Packetizer for MjpegPacketizer {
    fn packetize(&mut self, frame: &Frame, timestamp_increment: u32) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        if frame.data.is_empty() {
            return packets;
        }

        let max_fragment = self.mtu - JPEG_HEADER_LEN;
        let mut offset = 0usize;

        while offset < frame.data.len() {
            let remaining = frame.data.len() - offset;
            let chunk_size = remaining.min(max_fragment);
            let last = remaining <= max_fragment;

            let rtp = self.header.write(last);
            let jpeg = Self::jpeg_payload_header(frame, offset);

            let mut packet = Vec::with_capacity(12 + JPEG_HEADER_LEN + chunk_size);
            packet.extend_from_slice(&rtp);
            packet.extend_from_slice(&jpeg);
            packet.extend_from_slice(&frame.data[offset..offset + chunk_size]);
            packets.push(packet);

            offset += chunk_size;
        }

        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            frame_bytes = frame.data.len(),
            rtp_packets = packets.len(),
            seq = self.header.sequence(),
            "JPEG frame packetized"
        );

        packets
    }

    fn codec_name(&self) -> &'static str {
        "JPEG"
    }

    fn payload_type(&self) -> u8 {
        26
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(len: usize) -> Frame {
        Frame::new(vec![0x5A; len], 640, 480)
    }

    #[test]
    fn small_frame_single_packet_with_marker() {
        let mut p = MjpegPacketizer::new(0x11223344);
        let packets = p.packetize(&frame(100), 4500);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 12 + JPEG_HEADER_LEN + 100);
        assert_eq!(packets[0][1] & 0x80, 0x80); // marker on last fragment
        assert_eq!(packets[0][1] & 0x7f, 26);
    }

    #[test]
    fn fragment_offsets_cover_frame() {
        let mut p = MjpegPacketizer::new(0x11223344);
        let max_fragment = DEFAULT_MTU - JPEG_HEADER_LEN;
        let packets = p.packetize(&frame(3 * max_fragment + 10), 4500);
        assert_eq!(packets.len(), 4);

        for (i, packet) in packets.iter().enumerate() {
            let offset =
                u32::from_be_bytes([0, packet[13], packet[14], packet[15]]) as usize;
            assert_eq!(offset, i * max_fragment);
        }

        // Marker only on the final fragment.
        for packet in &packets[..3] {
            assert_eq!(packet[1] & 0x80, 0);
        }
        assert_eq!(packets[3][1] & 0x80, 0x80);
    }

    #[test]
    fn dimensions_encoded_in_eighths() {
        let mut p = MjpegPacketizer::new(1);
        let packets = p.packetize(&Frame::new(vec![1, 2, 3], 640, 480), 4500);
        assert_eq!(packets[0][18], 80); // 640 / 8
        assert_eq!(packets[0][19], 60); // 480 / 8
    }

    #[test]
    fn empty_frame_no_packets() {
        let mut p = MjpegPacketizer::new(1);
        assert!(p.packetize(&Frame::new(Vec::new(), 640, 480), 4500).is_empty());
    }

    #[test]
    fn timestamp_advances_per_frame_not_per_packet() {
        let mut p = MjpegPacketizer::new(1);
        let big = frame(5000);
        p.packetize(&big, 4500);
        let packets = p.packetize(&big, 4500);
        // Second frame carries the advanced timestamp in every fragment.
        let ts = u32::from_be_bytes([packets[0][4], packets[0][5], packets[0][6], packets[0][7]]);
        assert_eq!(ts, 4500);
        let ts_last = {
            let last = packets.last().unwrap();
            u32::from_be_bytes([last[4], last[5], last[6], last[7]])
        };
        assert_eq!(ts_last, 4500);
    }

    #[test]
    fn sequence_continuous_across_frames() {
        let mut p = MjpegPacketizer::new(1);
        let first = p.packetize(&frame(100), 4500);
        let second = p.packetize(&frame(100), 4500);
        let seq0 = u16::from_be_bytes([first[0][2], first[0][3]]);
        let seq1 = u16::from_be_bytes([second[0][2], second[0][3]]);
        assert_eq!(seq1, seq0 + 1);
    }
}
