//! Protocol sniffing on the opening bytes of a connection.
//!
//! Classification is a pure function of the bytes seen so far; the caller
//! keeps reading and re-classifying while the answer is [`Sniff::NeedMore`].
//!
//! # Rules (evaluated in order)
//! 1. HTTP/2 client preface followed by a HEADERS block whose `content-type`
//!    starts with `application/grpc` → [`ConnectionClass::RpcFramed`]
//! 2. A well-known HTTP/1 method followed by a space → [`ConnectionClass::PlainHttp`]
//! 3. A syntactically valid HTTP/1 request line → [`ConnectionClass::PlainHttp`]
//! 4. Anything else is rejected

use bytes::BytesMut;

use crate::net::connection::ConnectionClass;

/// The fixed HTTP/2 client connection preface.
pub const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Content-type prefix that marks an RPC call.
pub const RPC_CONTENT_TYPE: &[u8] = b"application/grpc";

const FRAME_HEADER_LEN: usize = 9;

/// An empty server SETTINGS frame, for clients that wait for one before
/// sending their first request.
pub const SERVER_SETTINGS: [u8; FRAME_HEADER_LEN] = [0, 0, 0, FRAME_SETTINGS, 0, 0, 0, 0, 0];

const FRAME_HEADERS: u8 = 0x1;
const FRAME_PRIORITY: u8 = 0x2;
const FRAME_SETTINGS: u8 = 0x4;
const FRAME_PING: u8 = 0x6;
const FRAME_WINDOW_UPDATE: u8 = 0x8;
const FRAME_CONTINUATION: u8 = 0x9;

const FLAG_ACK: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;
const FLAG_PADDED: u8 = 0x8;
const FLAG_PRIORITY: u8 = 0x20;

/// Longest HTTP method token accepted before a space must appear.
const MAX_METHOD_LEN: usize = 32;

const KNOWN_METHODS: &[&[u8]] = &[
    b"GET", b"POST", b"PUT", b"DELETE", b"HEAD", b"OPTIONS", b"PATCH", b"CONNECT", b"TRACE",
];

/// Outcome of inspecting a connection's opening bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    Matched(ConnectionClass),
    NeedMore,
    Reject(&'static str),
}

/// Classify a connection from the bytes read so far.
pub fn classify(buf: &[u8]) -> Sniff {
    if buf.is_empty() {
        return Sniff::NeedMore;
    }

    let n = buf.len().min(HTTP2_PREFACE.len());
    if buf[..n] == HTTP2_PREFACE[..n] {
        if buf.len() < HTTP2_PREFACE.len() {
            return Sniff::NeedMore;
        }
        return classify_http2(&buf[HTTP2_PREFACE.len()..]);
    }

    classify_http1(buf)
}

fn classify_http2(frames: &[u8]) -> Sniff {
    let mut offset = 0;
    let mut block: Option<Vec<u8>> = None;

    loop {
        if frames.len() < offset + FRAME_HEADER_LEN {
            return Sniff::NeedMore;
        }
        let header = &frames[offset..offset + FRAME_HEADER_LEN];
        let len = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
        let kind = header[3];
        let flags = header[4];

        let end = offset + FRAME_HEADER_LEN + len;
        if frames.len() < end {
            return Sniff::NeedMore;
        }
        let payload = &frames[offset + FRAME_HEADER_LEN..end];
        offset = end;

        if let Some(acc) = block.as_mut() {
            if kind != FRAME_CONTINUATION {
                return Sniff::Reject("frame interleaved with header block");
            }
            acc.extend_from_slice(payload);
            if flags & FLAG_END_HEADERS != 0 {
                return match_headers(acc);
            }
            continue;
        }

        match kind {
            FRAME_HEADERS => {
                let Some(fragment) = header_fragment(payload, flags) else {
                    return Sniff::Reject("malformed HEADERS frame");
                };
                if flags & FLAG_END_HEADERS != 0 {
                    return match_headers(fragment);
                }
                block = Some(fragment.to_vec());
            }
            FRAME_SETTINGS | FRAME_WINDOW_UPDATE | FRAME_PING | FRAME_PRIORITY => {}
            _ => return Sniff::Reject("unexpected frame before HEADERS"),
        }
    }
}

/// Strip padding and priority fields from a HEADERS payload.
fn header_fragment(payload: &[u8], flags: u8) -> Option<&[u8]> {
    let mut start = 0;
    let mut end = payload.len();
    if flags & FLAG_PADDED != 0 {
        let pad = *payload.first()? as usize;
        start = 1;
        end = end.checked_sub(pad)?;
    }
    if flags & FLAG_PRIORITY != 0 {
        start += 5;
    }
    if start > end {
        return None;
    }
    Some(&payload[start..end])
}

fn match_headers(block: &[u8]) -> Sniff {
    let mut decoder = hpack::Decoder::new();
    match decoder.decode(block) {
        Ok(headers) => {
            let is_rpc = headers.iter().any(|(name, value)| {
                name.eq_ignore_ascii_case(b"content-type") && value.starts_with(RPC_CONTENT_TYPE)
            });
            if is_rpc {
                Sniff::Matched(ConnectionClass::RpcFramed)
            } else {
                Sniff::Reject("HTTP/2 without RPC content-type")
            }
        }
        Err(_) => Sniff::Reject("undecodable header block"),
    }
}

/// Remove the first complete SETTINGS acknowledgement that follows the
/// preface. Returns `false` while none is buffered.
///
/// Used after [`SERVER_SETTINGS`] was written during sniffing: the client's
/// acknowledgement of it must not reach the server, which never sent it.
pub fn strip_settings_ack(buf: &mut BytesMut) -> bool {
    if !buf.starts_with(HTTP2_PREFACE) {
        return false;
    }

    let mut offset = HTTP2_PREFACE.len();
    while buf.len() >= offset + FRAME_HEADER_LEN {
        let header = &buf[offset..offset + FRAME_HEADER_LEN];
        let len = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
        if header[3] == FRAME_SETTINGS && header[4] & FLAG_ACK != 0 && len == 0 {
            let rest = buf.split_off(offset);
            buf.extend_from_slice(&rest[FRAME_HEADER_LEN..]);
            return true;
        }
        offset += FRAME_HEADER_LEN + len;
    }
    false
}

fn classify_http1(buf: &[u8]) -> Sniff {
    // Long request targets are left to the HTTP server to refuse.
    let known = KNOWN_METHODS.iter().any(|method| {
        buf.len() > method.len() && buf.starts_with(method) && buf[method.len()] == b' '
    });
    if known {
        return Sniff::Matched(ConnectionClass::PlainHttp);
    }

    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        return if plausible_request_prefix(buf) {
            Sniff::NeedMore
        } else {
            Sniff::Reject("not an HTTP/1 request")
        };
    };

    let line = &buf[..newline];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if is_request_line(line) {
        Sniff::Matched(ConnectionClass::PlainHttp)
    } else {
        Sniff::Reject("invalid HTTP/1 request line")
    }
}

fn plausible_request_prefix(buf: &[u8]) -> bool {
    let method_end = buf.iter().position(|&b| b == b' ').unwrap_or(buf.len());
    let method = &buf[..method_end];
    if method.len() > MAX_METHOD_LEN || !method.iter().all(|&b| is_tchar(b)) {
        return false;
    }
    // A space must follow a non-empty method.
    !(method.is_empty() && method_end < buf.len())
}

fn is_request_line(line: &[u8]) -> bool {
    let mut parts = line.split(|&b| b == b' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    !method.is_empty()
        && method.len() <= MAX_METHOD_LEN
        && method.iter().all(|&b| is_tchar(b))
        && !target.is_empty()
        && target.iter().all(|&b| b > 0x20 && b != 0x7f)
        && (version == b"HTTP/1.1" || version == b"HTTP/1.0")
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u8, flags: u8, stream: u32, payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u32;
        let mut out = vec![(len >> 16) as u8, (len >> 8) as u8, len as u8, kind, flags];
        out.extend_from_slice(&stream.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn header_block(content_type: &[u8]) -> Vec<u8> {
        let mut encoder = hpack::Encoder::new();
        encoder.encode(vec![
            (&b":method"[..], &b"POST"[..]),
            (&b":scheme"[..], &b"http"[..]),
            (&b":path"[..], &b"/ping.v1.PingService/Ping"[..]),
            (&b"content-type"[..], content_type),
        ])
    }

    fn h2_connection(content_type: &[u8]) -> Vec<u8> {
        let mut buf = HTTP2_PREFACE.to_vec();
        buf.extend(frame(FRAME_SETTINGS, 0, 0, &[]));
        buf.extend(frame(FRAME_WINDOW_UPDATE, 0, 0, &[0, 0, 0xff, 0xff]));
        buf.extend(frame(FRAME_HEADERS, FLAG_END_HEADERS, 1, &header_block(content_type)));
        buf
    }

    #[test]
    fn rpc_connection_is_matched() {
        let buf = h2_connection(b"application/grpc+json");
        assert_eq!(classify(&buf), Sniff::Matched(ConnectionClass::RpcFramed));
    }

    #[test]
    fn every_strict_prefix_of_rpc_connection_needs_more() {
        let buf = h2_connection(b"application/grpc");
        for end in 1..buf.len() {
            assert_eq!(classify(&buf[..end]), Sniff::NeedMore, "prefix of {} bytes", end);
        }
    }

    #[test]
    fn h2_without_rpc_content_type_is_rejected() {
        let buf = h2_connection(b"application/json");
        assert!(matches!(classify(&buf), Sniff::Reject(_)));
    }

    #[test]
    fn header_block_split_across_continuation() {
        let block = header_block(b"application/grpc");
        let (first, rest) = block.split_at(block.len() / 2);

        let mut buf = HTTP2_PREFACE.to_vec();
        buf.extend(frame(FRAME_SETTINGS, 0, 0, &[]));
        buf.extend(frame(FRAME_HEADERS, 0, 1, first));
        buf.extend(frame(FRAME_CONTINUATION, FLAG_END_HEADERS, 1, rest));
        assert_eq!(classify(&buf), Sniff::Matched(ConnectionClass::RpcFramed));
    }

    #[test]
    fn padded_headers_frame() {
        let block = header_block(b"application/grpc");
        let mut payload = vec![3u8];
        payload.extend_from_slice(&block);
        payload.extend_from_slice(&[0, 0, 0]);

        let mut buf = HTTP2_PREFACE.to_vec();
        buf.extend(frame(FRAME_HEADERS, FLAG_END_HEADERS | FLAG_PADDED, 1, &payload));
        assert_eq!(classify(&buf), Sniff::Matched(ConnectionClass::RpcFramed));
    }

    #[test]
    fn data_frame_before_headers_is_rejected() {
        let mut buf = HTTP2_PREFACE.to_vec();
        buf.extend(frame(0x0, 0, 1, b"x"));
        assert!(matches!(classify(&buf), Sniff::Reject(_)));
    }

    #[test]
    fn http1_request_line_is_matched() {
        assert_eq!(
            classify(b"GET /ping/v1 HTTP/1.1\r\nHost: x\r\n\r\n"),
            Sniff::Matched(ConnectionClass::PlainHttp)
        );
        assert_eq!(
            classify(b"POST /grpc/v1/ping?x=1 HTTP/1.0\n"),
            Sniff::Matched(ConnectionClass::PlainHttp)
        );
    }

    #[test]
    fn known_method_matches_before_the_line_ends() {
        assert_eq!(classify(b"GET /ping"), Sniff::Matched(ConnectionClass::PlainHttp));
        assert_eq!(classify(b"PUT /x HTTP/1.1"), Sniff::Matched(ConnectionClass::PlainHttp));

        let mut long = b"GET /".to_vec();
        long.extend(std::iter::repeat(b'a').take(64 * 1024));
        assert_eq!(classify(&long), Sniff::Matched(ConnectionClass::PlainHttp));
    }

    #[test]
    fn partial_http1_needs_more() {
        assert_eq!(classify(b"GE"), Sniff::NeedMore);
        assert_eq!(classify(b"GET"), Sniff::NeedMore);
        // "P" and "PR" are also prefixes of the HTTP/2 preface.
        assert_eq!(classify(b"P"), Sniff::NeedMore);
        assert_eq!(classify(b"BREW /pot"), Sniff::NeedMore);
    }

    #[test]
    fn junk_is_rejected() {
        assert!(matches!(classify(b"\x16\x03\x01\x02\x00"), Sniff::Reject(_)));
        assert!(matches!(classify(b"BREW /x SPDY/3\r\n"), Sniff::Reject(_)));
        assert!(matches!(classify(b"FOO  /x HTTP/1.1\r\n"), Sniff::Reject(_)));
        assert!(matches!(classify(b" GET"), Sniff::Reject(_)));
        assert!(matches!(classify(b"hello world\r\n"), Sniff::Reject(_)));
    }

    #[test]
    fn settings_ack_is_stripped_once() {
        let mut bytes = HTTP2_PREFACE.to_vec();
        bytes.extend(frame(FRAME_SETTINGS, 0, 0, &[0, 3, 0, 0, 0, 100]));
        bytes.extend(frame(FRAME_SETTINGS, FLAG_ACK, 0, &[]));
        let headers = frame(FRAME_HEADERS, FLAG_END_HEADERS, 1, &header_block(b"application/grpc"));
        bytes.extend(&headers);
        bytes.extend(frame(FRAME_SETTINGS, FLAG_ACK, 0, &[]));

        let mut buf = BytesMut::from(&bytes[..]);
        assert!(strip_settings_ack(&mut buf));
        assert_eq!(buf.len(), bytes.len() - FRAME_HEADER_LEN);

        let mut expected = HTTP2_PREFACE.to_vec();
        expected.extend(frame(FRAME_SETTINGS, 0, 0, &[0, 3, 0, 0, 0, 100]));
        expected.extend(&headers);
        expected.extend(frame(FRAME_SETTINGS, FLAG_ACK, 0, &[]));
        assert_eq!(&buf[..], &expected[..]);
        assert_eq!(classify(&buf), Sniff::Matched(ConnectionClass::RpcFramed));
    }

    #[test]
    fn settings_ack_not_yet_buffered() {
        let mut bytes = HTTP2_PREFACE.to_vec();
        bytes.extend(frame(FRAME_SETTINGS, 0, 0, &[]));
        let ack = frame(FRAME_SETTINGS, FLAG_ACK, 0, &[]);
        bytes.extend(&ack[..4]);

        let mut buf = BytesMut::from(&bytes[..]);
        assert!(!strip_settings_ack(&mut buf));
        assert_eq!(&buf[..], &bytes[..]);

        let mut http1 = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        assert!(!strip_settings_ack(&mut http1));
    }
}
