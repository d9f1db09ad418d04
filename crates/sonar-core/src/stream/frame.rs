//! Decoded generation-stream frames

use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

/// What kind of message a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    /// Generated text delta
    #[default]
    Text,
    /// Server-side task/progress notice
    Task,
    /// Error notice delivered in-band
    Error,
}

impl FrameKind {
    fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("task") => Self::Task,
            Some("error") => Self::Error,
            _ => Self::Text,
        }
    }
}

/// One decoded protocol message from a generation stream
///
/// Immutable once produced; ownership moves to whichever callback consumes
/// it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Text appended by this frame (may be empty on final/task frames)
    pub delta: String,
    /// True when no meaningful frames follow
    pub is_final: bool,
    pub kind: FrameKind,
    /// Binary payload shipped alongside the text, already base64-decoded
    pub attachment: Option<Bytes>,
    pub received_at: DateTime<Utc>,
}

impl Frame {
    /// Synthetic frame produced for the `[DONE]` termination sentinel
    pub(crate) fn sentinel() -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            kind: FrameKind::Text,
            attachment: None,
            received_at: Utc::now(),
        }
    }
}

/// Wire shape of one `data:` payload
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    content: String,
    #[serde(default)]
    done: bool,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    attachment: Option<String>,
}

/// Parse one `data:` payload into a frame
///
/// Returns `None` when the payload is not the JSON shape this client
/// understands; callers drop such units.
pub(crate) fn parse_payload(payload: &str) -> Option<Frame> {
    let wire: WireFrame = match serde_json::from_str(payload) {
        Ok(wire) => wire,
        Err(e) => {
            debug!("Dropping undecodable stream payload: {}", e);
            return None;
        }
    };

    let attachment = wire.attachment.and_then(|encoded| {
        match base64::engine::general_purpose::STANDARD.decode(&encoded) {
            Ok(raw) => Some(Bytes::from(raw)),
            Err(e) => {
                debug!("Dropping undecodable frame attachment: {}", e);
                None
            }
        }
    });

    Some(Frame {
        delta: wire.content,
        is_final: wire.done,
        kind: FrameKind::from_label(wire.kind.as_deref()),
        attachment,
        received_at: Utc::now(),
    })
}
