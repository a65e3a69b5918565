use super::rtp::RtpHeader;
use super::{Frame, Packetizer};

const DEFAULT_MTU: usize = 1400;

/// H.264 RTP packetizer (RFC 6184).
///
/// Converts H.264 Annex B frames into RTP packets using two packetization
/// modes:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within the MTU are sent
///   as-is in one RTP packet.
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across packets,
///   each carrying a 2-byte FU prefix before the fragment:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   ```
///
/// Annex B start codes (4-byte `00 00 00 01` and 3-byte `00 00 01`) are
/// both recognized when extracting NAL units.
///
/// The RTP marker bit is set on the last packet of an access unit
/// (RFC 6184 §5.1). Uses dynamic payload type 96.
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    mtu: usize,
}

impl H264Packetizer {
    pub fn new(ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(96, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc() -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(96),
            mtu: DEFAULT_MTU,
        }
    }

    /// Split an Annex B bitstream into NAL units, excluding start codes.
    ///
    /// Start code length is tracked per NAL so boundaries stay correct when
    /// 3-byte and 4-byte codes are mixed in one frame.
    pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
        // (nal_start, start_code_len)
        let mut starts: Vec<(usize, usize)> = Vec::new();
        let mut i = 0usize;
        while i < data.len() {
            if data[i..].starts_with(&[0, 0, 0, 1]) {
                starts.push((i + 4, 4));
                i += 4;
            } else if data[i..].starts_with(&[0, 0, 1]) {
                starts.push((i + 3, 3));
                i += 3;
            } else {
                i += 1;
            }
        }

        let mut nals = Vec::with_capacity(starts.len());
        for (idx, &(start, _)) in starts.iter().enumerate() {
            let end = match starts.get(idx + 1) {
                Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
                None => data.len(),
            };
            if start < end {
                nals.push(&data[start..end]);
            }
        }
        nals
    }

    /// Packetize one NAL unit: Single NAL mode when it fits the MTU,
    /// FU-A fragmentation otherwise.
    fn packetize_nal(&mut self, nal: &[u8], is_last_nal: bool, out: &mut Vec<Vec<u8>>) {
        if nal.is_empty() {
            return;
        }

        if nal.len() <= self.mtu {
            let hdr = self.header.write(is_last_nal);
            let mut packet = Vec::with_capacity(12 + nal.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(nal);
            out.push(packet);
            return;
        }

        let nal_type = nal[0] & 0x1f;
        let nri = nal[0] & 0x60;
        let fu_indicator = nri | 28;
        let payload = &nal[1..];

        let max_fragment = self.mtu - 2;
        let mut offset = 0usize;
        let mut first = true;
        let mut fragments = 0usize;

        while offset < payload.len() {
            let remaining = payload.len() - offset;
            let last_fragment = remaining <= max_fragment;
            let chunk = &payload[offset..offset + remaining.min(max_fragment)];

            let start_bit = if first { 0x80 } else { 0x00 };
            let end_bit = if last_fragment { 0x40 } else { 0x00 };
            let hdr = self.header.write(is_last_nal && last_fragment);

            let mut packet = Vec::with_capacity(12 + 2 + chunk.len());
            packet.extend_from_slice(&hdr);
            packet.push(fu_indicator);
            packet.push(start_bit | end_bit | nal_type);
            packet.extend_from_slice(chunk);
            out.push(packet);

            offset += chunk.len();
            first = false;
            fragments += 1;
        }

        tracing::trace!(nal_type, nal_size = nal.len(), fragments, "FU-A fragmented NAL");
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, frame: &Frame, timestamp_increment: u32) -> Vec<Vec<u8>> {
        let nal_units = Self::extract_nal_units(&frame.data);
        let mut packets = Vec::new();

        for (i, nal) in nal_units.iter().enumerate() {
            let is_last = i == nal_units.len() - 1;
            self.packetize_nal(nal, is_last, &mut packets);
        }

        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            frame_bytes = frame.data.len(),
            "H.264 frame packetized"
        );

        packets
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    fn payload_type(&self) -> u8 {
        96
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>) -> Frame {
        Frame::new(data, 640, 480)
    }

    #[test]
    fn extract_single_nal_4byte_sc() {
        let data = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
        let nals = H264Packetizer::extract_nal_units(&data);
        assert_eq!(nals, vec![&[0x65, 0xAA, 0xBB][..]]);
    }

    #[test]
    fn extract_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals = H264Packetizer::extract_nal_units(&data);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0], &[0x67, 0x42][..]);
        assert_eq!(nals[1], &[0x68, 0xCE][..]);
    }

    #[test]
    fn extract_no_start_code() {
        assert!(H264Packetizer::extract_nal_units(&[0xFF, 0xFE]).is_empty());
        assert!(H264Packetizer::extract_nal_units(&[]).is_empty());
    }

    #[test]
    fn small_nal_single_packet() {
        let mut p = H264Packetizer::new(0xAABBCCDD);
        let packets = p.packetize(&frame(vec![0, 0, 0, 1, 0x65, 0xAA, 0xBB, 0xCC]), 3600);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 12 + 4);
        assert_eq!(packets[0][1] & 0x80, 0x80); // marker: last NAL of the frame
    }

    #[test]
    fn large_nal_fragmented_fu_a() {
        let mut p = H264Packetizer::new(0x11223344);
        let mut data = vec![0, 0, 0, 1, 0x65];
        data.extend(vec![0xAA; DEFAULT_MTU + 500]);
        let packets = p.packetize(&frame(data), 3600);
        assert!(packets.len() > 1);

        assert_eq!(packets[0][12] & 0x1f, 28); // FU-A indicator type
        assert_eq!(packets[0][13] & 0x80, 0x80); // start bit
        assert_eq!(packets[0][13] & 0x1f, 0x05); // original NAL type

        let last = packets.last().unwrap();
        assert_eq!(last[13] & 0x40, 0x40); // end bit
        assert_eq!(last[1] & 0x80, 0x80); // marker
        for packet in &packets[..packets.len() - 1] {
            assert_eq!(packet[1] & 0x80, 0);
        }
    }

    #[test]
    fn marker_only_on_last_nal() {
        let mut p = H264Packetizer::new(1);
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e];
        data.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x38, 0x80]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x00]);
        let packets = p.packetize(&frame(data), 3600);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0][1] & 0x80, 0);
        assert_eq!(packets[1][1] & 0x80, 0);
        assert_eq!(packets[2][1] & 0x80, 0x80);
    }

    #[test]
    fn codec_metadata() {
        let p = H264Packetizer::new(1);
        assert_eq!(p.codec_name(), "H264");
        assert_eq!(p.payload_type(), 96);
    }
}
