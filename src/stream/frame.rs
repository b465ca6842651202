//! Server-sent event frames.
//!
//! Frames are written verbatim. Control frames use the `events:` field name,
//! which SSE clients treat as an unknown field and ignore; only `data:`
//! frames reach the client's message handler.

pub const PING: &str = ": ping\n\n";
pub const OPENED: &str = "events: stream opened\n\n";
pub const TIMEOUT: &str = "events: stream timeout\n\n";
pub const EOF: &str = "events: error\ndata: eof\n\n";
pub const CLOSED: &str = "events: stream closed";

/// A `data:` frame carrying one serialized value.
pub fn data(json: &str) -> String {
    format!("data: {json}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_layout() {
        assert_eq!(data(r#"{"n":1}"#), "data: {\"n\":1}\n\n");
    }
}
