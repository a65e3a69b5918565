use crate::error::{ParseErrorKind, Result, RtspError};

/// Upper bound on a single request the parser will scan.
///
/// Requests arrive in one fixed-size receive buffer; anything larger is a
/// checked error, never a truncated scan.
pub const MAX_REQUEST_BYTES: usize = 4096;

/// Upper bound for any single extracted field (host:port, CSeq, URL parts).
pub const MAX_FIELD_BYTES: usize = 255;

/// RTSP method verb, classified by substring match against the six known
/// names. Anything else parses as [`Unknown`](Method::Unknown) without
/// aborting — the rest of the request is still scanned, matching how NVR
/// clients expect lenient servers to behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Teardown,
    GetParameter,
    Unknown,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::Unknown => "UNKNOWN",
        }
    }

    fn classify(verb: &[u8]) -> Method {
        // Substring match, not equality — tolerates leading junk the way
        // the device firmware always has.
        if find(verb, b"OPTIONS").is_some() {
            Method::Options
        } else if find(verb, b"DESCRIBE").is_some() {
            Method::Describe
        } else if find(verb, b"SETUP").is_some() {
            Method::Setup
        } else if find(verb, b"PLAY").is_some() {
            Method::Play
        } else if find(verb, b"TEARDOWN").is_some() {
            Method::Teardown
        } else if find(verb, b"GET_PARAMETER").is_some() {
            Method::GetParameter
        } else {
            Method::Unknown
        }
    }
}

/// One RTSP request reduced to the fields this server acts on.
///
/// Produced by [`ParsedRequest::parse`], a pure function over an immutable
/// byte slice. The parser never scans past the slice and every extracted
/// field has a fixed capacity ([`MAX_FIELD_BYTES`]); overflow is a checked
/// error rather than silent truncation.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    /// URL path before the last `/` (e.g. `mjpeg` in `/mjpeg/1`).
    pub url_prefix: String,
    /// URL path after the last `/` (e.g. `1` in `/mjpeg/1`).
    pub url_suffix: String,
    /// `host:port` from an absolute `rtsp://` URL, empty otherwise.
    pub host_port: String,
    /// Echoed verbatim into the response; opaque, never parsed as a number.
    pub cseq: String,
    /// Advisory only — no request body is consumed by this server.
    pub content_length: Option<usize>,
    /// Client RTP port from `client_port=<a>-<b>`; 0 when absent.
    pub client_rtp_port: u16,
    /// Always `client_rtp_port + 1`. The server never trusts a distinct
    /// RTCP value from the client.
    pub client_rtcp_port: u16,
    /// `RTP/AVP/TCP` present in a SETUP request selects interleaved delivery.
    pub transport_is_tcp: bool,
}

impl ParsedRequest {
    /// Parse one RTSP request from a byte buffer.
    ///
    /// The steps run in a fixed order; CSeq and a verb terminator are
    /// mandatory, the URL host, transport parameters and Content-Length are
    /// optional. See the module tests for the exact tolerance envelope.
    pub fn parse(buf: &[u8]) -> Result<ParsedRequest> {
        if buf.len() > MAX_REQUEST_BYTES {
            return parse_err(ParseErrorKind::RequestTooLarge);
        }

        // 1. Transport port sniff: `client_port=<rtp>-<rtcp>` anywhere in
        // the buffer. RTCP is forced to RTP+1 regardless of what the client
        // sent after the dash.
        let (client_rtp_port, client_rtcp_port) = sniff_client_ports(buf);

        // 2. Verb: everything up to the first space or tab.
        let verb_end = buf
            .iter()
            .take(MAX_FIELD_BYTES)
            .position(|&c| c == b' ' || c == b'\t')
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::MissingVerb,
            })?;
        let method = Method::classify(&buf[..verb_end]);

        // 3. Transport type is only meaningful on SETUP.
        let transport_is_tcp = method == Method::Setup && find(buf, b"RTP/AVP/TCP").is_some();

        // 4. URL: optional absolute-URL host capture, then the path segment
        // that precedes the `RTSP/` version marker.
        let mut pos = verb_end;
        while pos < buf.len() && (buf[pos] == b' ' || buf[pos] == b'\t') {
            pos += 1;
        }

        let mut host_port = String::new();
        let mut path_start = pos;
        if starts_with_ignore_case(&buf[pos..], b"rtsp:/") {
            if buf.get(pos + 6) == Some(&b'/') {
                // "rtsp://" — capture host:port up to the next '/' or space.
                let host_start = pos + 7;
                let mut k = host_start;
                while k < buf.len() && buf[k] != b'/' && buf[k] != b' ' {
                    k += 1;
                }
                host_port = field_to_string(&buf[host_start..k])?;
                path_start = k;
            } else {
                // "rtsp:/" with a single slash — the path begins at that slash.
                path_start = pos + 5;
            }
        }

        let marker = find(&buf[path_start..], b"RTSP/")
            .map(|m| m + path_start)
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::MissingVersionMarker,
            })?;

        let mut path = &buf[path_start..marker];
        while let [b' ' | b'\t', rest @ ..] = path {
            path = rest;
        }
        while let [rest @ .., b' ' | b'\t'] = path {
            path = rest;
        }
        if let [b'/', rest @ ..] = path {
            path = rest;
        }
        let (url_prefix, url_suffix) = match path.iter().rposition(|&c| c == b'/') {
            Some(slash) => (
                field_to_string(&path[..slash])?,
                field_to_string(&path[slash + 1..])?,
            ),
            None => (String::new(), field_to_string(path)?),
        };

        // 5. CSeq (exact case, mandatory): skip whitespace after the colon,
        // read up to the line end.
        let cseq = match find(&buf[marker..], b"CSeq:") {
            Some(at) => read_header_value(&buf[marker + at + 5..])?,
            None => {
                return parse_err(ParseErrorKind::MissingCSeq);
            }
        };

        // 6. Content-Length (optional). Only the 'L' is case-insensitive,
        // matching the envelope of clients seen in the field.
        let content_length = find_content_length(&buf[marker..])
            .map(|at| read_decimal(&buf[marker + at..]))
            .unwrap_or(None);

        Ok(ParsedRequest {
            method,
            url_prefix,
            url_suffix,
            host_port,
            cseq,
            content_length,
            client_rtp_port,
            client_rtcp_port,
            transport_is_tcp,
        })
    }
}

fn parse_err<T>(kind: ParseErrorKind) -> Result<T> {
    Err(RtspError::Parse { kind })
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len()
        && haystack
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Bounded copy of a raw field into an owned string.
fn field_to_string(bytes: &[u8]) -> Result<String> {
    if bytes.len() > MAX_FIELD_BYTES {
        return parse_err(ParseErrorKind::FieldTooLong);
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Skip spaces/tabs, then read up to `\r` or `\n`. The terminator must
/// appear within the field capacity.
fn read_header_value(bytes: &[u8]) -> Result<String> {
    let mut start = 0;
    while start < bytes.len() && (bytes[start] == b' ' || bytes[start] == b'\t') {
        start += 1;
    }
    let rest = &bytes[start..];
    let end = rest
        .iter()
        .take(MAX_FIELD_BYTES + 1)
        .position(|&c| c == b'\r' || c == b'\n')
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::FieldTooLong,
        })?;
    field_to_string(&rest[..end])
}

/// Leading decimal integer after optional spaces/tabs; `None` if the first
/// non-blank byte is not a digit.
fn read_decimal(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    let digits_end = bytes[i..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(bytes.len(), |p| i + p);
    if digits_end == i {
        return None;
    }
    std::str::from_utf8(&bytes[i..digits_end]).ok()?.parse().ok()
}

/// Step 1: `client_port=<rtp>-...` anywhere in the buffer. Returns (0, 0)
/// when absent or malformed — the sniff is optional.
fn sniff_client_ports(buf: &[u8]) -> (u16, u16) {
    let Some(at) = find(buf, b"client_port") else {
        return (0, 0);
    };
    let after = &buf[at + b"client_port".len()..];
    let Some(eq) = after.iter().position(|&c| c == b'=') else {
        return (0, 0);
    };
    let mut i = eq + 1;
    let digits_start = i;
    while i < after.len() && after[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start || after.get(i) != Some(&b'-') {
        return (0, 0);
    }
    match std::str::from_utf8(&after[digits_start..i])
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
    {
        Some(rtp) => (rtp, rtp.wrapping_add(1)),
        None => (0, 0),
    }
}

/// `Content-Length:` matcher, case-insensitive on the `L` only. Returns the
/// offset just past the colon.
fn find_content_length(buf: &[u8]) -> Option<usize> {
    const HEAD: &[u8] = b"Content-";
    const TAIL: &[u8] = b"ength:";
    let total = HEAD.len() + 1 + TAIL.len();
    if buf.len() < total {
        return None;
    }
    (0..=buf.len() - total).find_map(|j| {
        let w = &buf[j..j + total];
        if w.starts_with(HEAD)
            && (w[HEAD.len()] == b'L' || w[HEAD.len()] == b'l')
            && w[HEAD.len() + 1..] == *TAIL
        {
            Some(j + total)
        } else {
            None
        }
    })
}
