//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol — parsing
//! requests, building responses, and generating SDP. Method routing lives
//! with the session state machine in [`crate::session`].
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://cam:554/mjpeg/1 RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! The parser here is deliberately not a grammar-based one: the device
//! recognizes a small fixed set of request lines and headers and tolerates
//! noise on the control socket (NVRs occasionally probe with other
//! protocols). See [`request::ParsedRequest::parse`] for the exact scan
//! order and tolerance envelope.
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport (UDP ports or interleaved TCP) |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Destroy session |
//! | GET_PARAMETER | §10.8 | Keepalive ping |

pub mod request;
pub mod response;
pub mod sdp;

pub use request::{Method, ParsedRequest};
pub use response::RtspResponse;
