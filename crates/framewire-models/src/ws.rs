//! WebSocket event types.
//!
//! Every text frame on the socket is an envelope `{"event": <name>, "data": <payload>}`.
//! Inbound `frame` events carry a base64 image; the server answers each one with
//! either a `bboxes` or an `error` event.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::DetectionBatch;

/// Payload of an inbound `frame` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FramePayload {
    /// Base64 encoded image, optionally with a `data:<mime>;base64,` prefix
    #[serde(default)]
    pub image: Option<String>,
}

impl FramePayload {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
        }
    }

    /// The image data, if present and non-blank.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Error parsing an inbound envelope.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("Invalid event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("Invalid payload for '{event}' event: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

/// Events sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A frame to run detection on
    Frame(FramePayload),
    /// Application-level keepalive
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientEvent {
    /// Parse a client envelope from a text frame.
    ///
    /// A `frame` event without `data` parses as a payload with no image, so the
    /// caller can answer it with a regular `error` event.
    pub fn from_json(text: &str) -> Result<Self, EventParseError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(EventParseError::Envelope)?;

        match envelope.event.as_str() {
            "frame" => {
                if envelope.data.is_null() {
                    return Ok(ClientEvent::Frame(FramePayload::default()));
                }
                serde_json::from_value(envelope.data)
                    .map(ClientEvent::Frame)
                    .map_err(|source| EventParseError::Payload {
                        event: envelope.event,
                        source,
                    })
            }
            "ping" => Ok(ClientEvent::Ping),
            _ => Err(EventParseError::UnknownEvent(envelope.event)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Frame(_) => "frame",
            ClientEvent::Ping => "ping",
        }
    }
}

/// Payload of an outbound `bboxes` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BboxesPayload {
    pub boxes: DetectionBatch,
}

/// Payload of an outbound `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorPayload {
    pub message: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Detections for the last frame
    Bboxes(BboxesPayload),
    /// The last frame (or message) could not be handled
    Error(ErrorPayload),
    /// Reply to a client `ping`
    Pong,
}

impl ServerEvent {
    /// Create a `bboxes` event.
    pub fn bboxes(boxes: DetectionBatch) -> Self {
        ServerEvent::Bboxes(BboxesPayload { boxes })
    }

    /// Create an `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Bboxes(_) => "bboxes",
            ServerEvent::Error(_) => "error",
            ServerEvent::Pong => "pong",
        }
    }
}
