//! Server-sent event framing for the HTTP stream.
//!
//! Each event becomes exactly two text lines plus a blank line:
//!
//! ```text
//! event: step_complete\n
//! data: {"type":"step_complete",...}\n
//! \n
//! ```
//!
//! The payload JSON is single-line; the framing is the standard
//! `text/event-stream` format so off-the-shelf SSE clients parse it.

use super::event::ProgressEvent;

/// Content type of the streaming response body.
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Render one event as an SSE frame.
///
/// Falls back to an inline serialization-failure payload rather than
/// breaking the stream; `ProgressEvent` serialization is infallible in
/// practice.
#[must_use]
pub fn sse_frame(event: &ProgressEvent) -> String {
    let data = event
        .to_json_string()
        .unwrap_or_else(|e| format!("{{\"type\":\"workflow_error\",\"error\":\"{e}\"}}"));
    format!("event: {}\ndata: {}\n\n", event.kind.as_str(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_has_event_data_blank_shape() {
        let event = ProgressEvent::workflow_paused("hotel_o2c", json!({"pending_approval": true}));
        let frame = sse_frame(&event);

        assert!(frame.starts_with("event: workflow_paused\ndata: {"));
        assert!(frame.ends_with("}\n\n"));
        assert_eq!(frame.matches('\n').count(), 3);
    }
}
