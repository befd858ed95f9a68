//! Server-sent-event framing.
//!
//! Every frame is `data: <payload>\n\n`, where the payload is the event's
//! JSON or the literal `[DONE]`. A turn's frame sequence always ends with
//! exactly one [`Frame::Done`].

use std::pin::Pin;

use futures::Stream;
use tracing::error;

use crate::events::StreamEvent;

/// Payload of the terminal frame.
pub const DONE_DATA: &str = "[DONE]";

/// The literal terminal frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Headers that keep proxies from buffering the stream.
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
];

const ENCODE_FAILED: &str = r#"{"type":"error","error":"failed to encode event"}"#;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(StreamEvent),
    Done,
}

impl Frame {
    /// The `data:` payload without SSE framing.
    pub fn data(&self) -> String {
        match self {
            Self::Event(event) => serde_json::to_string(event).unwrap_or_else(|e| {
                error!(kind = event.kind(), error = %e, "failed to encode stream event");
                ENCODE_FAILED.to_string()
            }),
            Self::Done => DONE_DATA.to_string(),
        }
    }

    /// The complete wire frame, for writers that are not an SSE response.
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.data())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl From<StreamEvent> for Frame {
    fn from(event: StreamEvent) -> Self {
        Self::Event(event)
    }
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// The short-circuit response: one error frame, then the terminal frame.
pub fn error_frames(error: impl Into<String>, message: Option<String>) -> [Frame; 2] {
    [
        Frame::Event(StreamEvent::Error {
            error: error.into(),
            message,
        }),
        Frame::Done,
    ]
}

pub fn error_stream(error: impl Into<String>, message: Option<String>) -> FrameStream {
    Box::pin(futures::stream::iter(error_frames(error, message)))
}
