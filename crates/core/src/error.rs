//! Error types for the RTSP camera core.

use std::fmt;

/// Errors that can occur in the RTSP camera core.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP requests.
/// - **Transport**: [`Io`](Self::Io) — socket/network failures,
///   [`NoUdpPortPair`](Self::NoUdpPortPair) — RTP/RTCP port allocation.
/// - **Streamer**: [`StreamerUnavailable`](Self::StreamerUnavailable),
///   [`TransportNotConfigured`](Self::TransportNotConfigured).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The streamer collaborator has not been constructed yet.
    #[error("streamer not available")]
    StreamerUnavailable,

    /// No adjacent UDP port pair could be bound for RTP/RTCP delivery.
    #[error("no free UDP port pair for RTP/RTCP")]
    NoUdpPortPair,

    /// Media delivery requested before SETUP negotiated a transport.
    #[error("media transport not configured")]
    TransportNotConfigured,
}

/// Specific kind of RTSP parse failure.
///
/// A parse failure is recoverable: the request is dropped and the control
/// connection stays open for the next one.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No space/tab terminated the command verb.
    MissingVerb,
    /// The `RTSP/` version marker that follows the URL was not found.
    MissingVersionMarker,
    /// The mandatory `CSeq:` header was absent.
    MissingCSeq,
    /// An extracted field exceeded its fixed capacity.
    FieldTooLong,
    /// The request exceeded the bounded scratch size.
    RequestTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVerb => write!(f, "missing command verb"),
            Self::MissingVersionMarker => write!(f, "missing RTSP/ version marker"),
            Self::MissingCSeq => write!(f, "missing CSeq header"),
            Self::FieldTooLong => write!(f, "field exceeds capacity"),
            Self::RequestTooLarge => write!(f, "request exceeds buffer size"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
