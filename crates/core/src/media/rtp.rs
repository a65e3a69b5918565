use rand::RngExt;

/// RTP fixed-header state shared by all packetizers (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The sequence number advances on every written packet; the timestamp
/// advances once per frame via [`advance_timestamp`](Self::advance_timestamp).
/// Version is always 2; padding, extension and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

const RTP_VERSION: u8 = 2;

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC, chosen per RFC 3550 §8.1 to minimize
    /// collisions between independent senders.
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::rng().random::<u32>())
    }

    /// Sequence number the next written packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current RTP timestamp.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Serialize a 12-byte fixed header and advance the sequence number.
    ///
    /// `marker` signals the last packet of a frame (RFC 3550 §5.1).
    pub fn write(&mut self, marker: bool) -> [u8; 12] {
        let mut header = [0u8; 12];
        header[0] = RTP_VERSION << 6;
        header[1] = ((marker as u8) << 7) | self.pt;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Advance the timestamp by one frame's worth of 90 kHz ticks
    /// (e.g. 4500 for 20 fps, 3600 for 25 fps).
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> RtpHeader {
        RtpHeader::new(26, 0xAABBCCDD)
    }

    #[test]
    fn version_and_payload_type() {
        let mut h = make_header();
        let buf = h.write(false);
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf[1] & 0x7f, 26);
    }

    #[test]
    fn marker_bit() {
        let mut h = make_header();
        assert_eq!(h.write(false)[1] & 0x80, 0);
        assert_eq!(h.write(true)[1] & 0x80, 0x80);
    }

    #[test]
    fn sequence_increments_and_wraps() {
        let mut h = make_header();
        let b1 = h.write(false);
        let b2 = h.write(false);
        assert_eq!(
            u16::from_be_bytes([b2[2], b2[3]]),
            u16::from_be_bytes([b1[2], b1[3]]) + 1
        );

        h.sequence = u16::MAX;
        h.write(false);
        assert_eq!(h.sequence(), 0);
    }

    #[test]
    fn timestamp_only_advances_explicitly() {
        let mut h = make_header();
        h.write(false);
        h.write(false);
        assert_eq!(h.timestamp(), 0);
        h.advance_timestamp(4500);
        assert_eq!(h.timestamp(), 4500);
    }

    #[test]
    fn timestamp_wraps() {
        let mut h = make_header();
        h.timestamp = u32::MAX;
        h.advance_timestamp(2);
        assert_eq!(h.timestamp(), 1);
    }

    #[test]
    fn ssrc_written_big_endian() {
        let mut h = make_header();
        let buf = h.write(false);
        assert_eq!(
            u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            0xAABBCCDD
        );
    }

    #[test]
    fn random_ssrc_differs() {
        assert_ne!(
            RtpHeader::with_random_ssrc(26).ssrc,
            RtpHeader::with_random_ssrc(26).ssrc
        );
    }
}
