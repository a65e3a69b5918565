use crate::protocol::ParsedRequest;

/// Negotiated media transport for one session (RFC 2326 §12.39).
///
/// Chosen during SETUP from the client's `Transport` header:
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=5000-5001
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=5000-5001;server_port=50000-50001
/// ```
///
/// or, for interleaved delivery on the control connection itself:
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// Server → Client:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSpec {
    /// Separate UDP sockets; the client receives RTP on `client_rtp_port`
    /// and RTCP on `client_rtcp_port` (always RTP+1).
    Udp {
        client_rtp_port: u16,
        client_rtcp_port: u16,
    },
    /// RTP on interleave channel 0, RTCP on channel 1, multiplexed on the
    /// control connection.
    TcpInterleaved,
}

impl TransportSpec {
    /// Build from a parsed SETUP request.
    pub fn from_request(req: &ParsedRequest) -> TransportSpec {
        if req.transport_is_tcp {
            TransportSpec::TcpInterleaved
        } else {
            TransportSpec::Udp {
                client_rtp_port: req.client_rtp_port,
                client_rtcp_port: req.client_rtcp_port,
            }
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, TransportSpec::TcpInterleaved)
    }

    /// `Transport:` response header value. UDP echoes the client port pair
    /// and reports the server's, queried from the streamer.
    pub fn header_value(&self, server_rtp_port: u16, server_rtcp_port: u16) -> String {
        match self {
            TransportSpec::TcpInterleaved => {
                "RTP/AVP/TCP;unicast;interleaved=0-1".to_string()
            }
            TransportSpec::Udp {
                client_rtp_port,
                client_rtcp_port,
            } => format!(
                "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
                client_rtp_port, client_rtcp_port, server_rtp_port, server_rtcp_port
            ),
        }
    }
}
