//! Incremental frame decoding
//!
//! Turns a raw, arbitrarily fragmented byte channel into discrete frames.
//! The wire is newline-delimited: meaningful lines carry a `data:` prefix
//! and a JSON payload, the literal payload `[DONE]` ends the stream, and
//! everything else (comments, keep-alives) is ignorable.

use bytes::BytesMut;
use tracing::{debug, warn};

use super::frame::{parse_payload, Frame};

/// Event line prefix on the wire
const DATA_PREFIX: &str = "data:";
/// Payload signalling that no further frames will arrive
const DONE_SENTINEL: &str = "[DONE]";
/// Default ceiling on a single unit's size
const DEFAULT_MAX_UNIT_BYTES: usize = 256 * 1024;

/// Incremental decoder over a fragmented byte stream
///
/// Bytes accumulate until a full line is available; splitting happens at
/// `\n` positions before any UTF-8 decoding, so a multi-byte character torn
/// across chunk boundaries stays buffered until its bytes complete.
/// No unit buffers past `max_unit_bytes`: an oversized unit is dropped
/// whole and decoding resumes at the next delimiter.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: BytesMut,
    max_unit_bytes: usize,
    /// Inside a dropped unit whose delimiter has not arrived yet
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_unit_bytes(DEFAULT_MAX_UNIT_BYTES)
    }

    /// Decoder with a custom ceiling on one unit's size
    pub fn with_max_unit_bytes(max_unit_bytes: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            max_unit_bytes,
            discarding: false,
        }
    }

    /// Feed one transport chunk; returns every frame the chunk completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut chunk = chunk;
        if self.discarding {
            // The rest of a dropped unit is not data
            let Some(pos) = chunk.iter().position(|b| *b == b'\n') else {
                return Vec::new();
            };
            self.discarding = false;
            chunk = &chunk[pos + 1..];
        }
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(pos + 1);
            if pos > self.max_unit_bytes {
                warn!(
                    "Dropping oversized stream unit ({} bytes, cap {})",
                    pos, self.max_unit_bytes
                );
                continue;
            }
            decode_line(&line[..pos], &mut frames);
        }
        if self.pending.len() > self.max_unit_bytes {
            warn!(
                "Dropping stream unit still unterminated at {} bytes (cap {})",
                self.pending.len(),
                self.max_unit_bytes
            );
            self.pending.clear();
            self.discarding = true;
        }
        frames
    }

    /// Decode whatever is recoverable from an unterminated tail
    ///
    /// Called when the channel closes without a trailing newline.
    pub fn flush(&mut self) -> Vec<Frame> {
        if self.discarding {
            // The dropped unit never completed; nothing recoverable remains
            self.discarding = false;
            return Vec::new();
        }
        if self.pending.is_empty() {
            return Vec::new();
        }
        let tail = self.pending.split();
        let text = String::from_utf8_lossy(&tail);
        let mut frames = Vec::new();
        classify_line(&text, &mut frames);
        frames
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(raw: &[u8], frames: &mut Vec<Frame>) {
    match std::str::from_utf8(raw) {
        Ok(line) => classify_line(line, frames),
        Err(e) => warn!("Dropping non-UTF-8 stream line: {}", e),
    }
}

fn classify_line(line: &str, frames: &mut Vec<Frame>) {
    let line = line.trim();
    // Empty lines and comments are expected between events
    if line.is_empty() || line.starts_with(':') {
        return;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        // Keep-alive or a field this client does not track (event:, retry:, ...)
        debug!("Ignoring non-data stream line: {}", line);
        return;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload == DONE_SENTINEL {
        frames.push(Frame::sentinel());
        return;
    }
    if let Some(frame) = parse_payload(payload) {
        frames.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::frame::FrameKind;

    #[test]
    fn test_single_chunk_two_frames() {
        let mut decoder = FrameDecoder::new();
        let frames =
            decoder.feed(b"data:{\"content\":\"Hi\",\"done\":false}\ndata:{\"content\":\"\",\"done\":true}\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].delta, "Hi");
        assert!(!frames[0].is_final);
        assert_eq!(frames[1].delta, "");
        assert!(frames[1].is_final);
    }

    #[test]
    fn test_every_split_offset_yields_identical_frames() {
        let payload =
            "data:{\"content\":\"你好\",\"done\":false}\ndata: {\"content\":\"!\",\"done\":true}\n"
                .as_bytes();
        let mut reference = FrameDecoder::new();
        let expected: Vec<(String, bool)> = reference
            .feed(payload)
            .into_iter()
            .map(|f| (f.delta, f.is_final))
            .collect();
        assert_eq!(expected.len(), 2);

        for split in 0..=payload.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.feed(&payload[..split]);
            frames.extend(decoder.feed(&payload[split..]));
            let got: Vec<(String, bool)> =
                frames.into_iter().map(|f| (f.delta, f.is_final)).collect();
            assert_eq!(got, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_every_two_cut_fragmentation_is_lossless() {
        let payload: &[u8] = b"data:{\"content\":\"Hi\",\"done\":false}\ndata:{\"content\":\"\",\"done\":true}\n";
        for first in 0..=payload.len() {
            for second in first..=payload.len() {
                let mut decoder = FrameDecoder::new();
                let mut frames = decoder.feed(&payload[..first]);
                frames.extend(decoder.feed(&payload[first..second]));
                frames.extend(decoder.feed(&payload[second..]));
                assert_eq!(frames.len(), 2, "cuts at {first}/{second}");
                assert_eq!(frames[0].delta, "Hi");
                assert!(!frames[0].is_final);
                assert!(frames[1].delta.is_empty());
                assert!(frames[1].is_final);
            }
        }
    }

    #[test]
    fn test_partial_multibyte_stays_buffered() {
        let text = "data:{\"content\":\"héllo\"}\n";
        let bytes = text.as_bytes();
        // Cut inside the two-byte 'é'
        let mid = text.find('é').unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&bytes[..mid]).is_empty());
        let frames = decoder.feed(&bytes[mid..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delta, "héllo");
    }

    #[test]
    fn test_done_sentinel_becomes_final_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: [DONE]\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_final);
        assert!(frames[0].delta.is_empty());
    }

    #[test]
    fn test_keepalives_comments_and_garbage_are_dropped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b": keep-alive\n\nevent: ping\nretry: 3000\ndata: not json at all\ndata:{\"content\":\"ok\"}\n",
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delta, "ok");
    }

    #[test]
    fn test_crlf_lines_decode_cleanly() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data:{\"content\":\"a\"}\r\ndata: [DONE]\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].delta, "a");
        assert!(frames[1].is_final);
    }

    #[test]
    fn test_flush_recovers_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder
            .feed(b"data:{\"content\":\"tail\",\"done\":true}")
            .is_empty());
        let frames = decoder.flush();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delta, "tail");
        assert!(frames[0].is_final);
    }

    #[test]
    fn test_flush_on_empty_buffer_yields_nothing() {
        assert!(FrameDecoder::new().flush().is_empty());
    }

    #[test]
    fn test_kind_and_attachment_reach_the_frame() {
        let mut decoder = FrameDecoder::new();
        let frames =
            decoder.feed(b"data:{\"content\":\"\",\"type\":\"task\",\"attachment\":\"aGk=\"}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Task);
        assert_eq!(frames[0].attachment.as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn test_unit_growing_past_the_cap_is_dropped() {
        let mut decoder = FrameDecoder::with_max_unit_bytes(64);
        assert!(decoder.feed(&[b'x'; 80]).is_empty());
        // The rest of the runaway unit is discarded, not buffered
        assert!(decoder.feed(&[b'y'; 200]).is_empty());
        let frames = decoder.feed(b"tail\ndata:{\"content\":\"ok\"}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delta, "ok");
    }

    #[test]
    fn test_complete_line_past_the_cap_is_dropped() {
        let mut decoder = FrameDecoder::with_max_unit_bytes(32);
        let mut input = format!("data:{{\"content\":\"{}\"}}\n", "a".repeat(64)).into_bytes();
        input.extend_from_slice(b"data:{\"content\":\"ok\"}\n");
        let frames = decoder.feed(&input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delta, "ok");
    }

    #[test]
    fn test_flush_inside_a_dropped_unit_recovers_nothing() {
        let mut decoder = FrameDecoder::with_max_unit_bytes(16);
        assert!(decoder.feed(&[b'x'; 32]).is_empty());
        assert!(decoder.flush().is_empty());
        // Flushing ends the dropped unit; the decoder starts clean again
        let frames = decoder.feed(b"data: [DONE]\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_final);
    }
}
