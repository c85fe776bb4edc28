//! Server-Sent Events framing for broadcast frames.
//!
//! A frame travels as a single `data:` line holding a JSON object, terminated by a
//! blank line:
//!
//! ```text
//! data: {"type":"message","content":"hello"}
//!
//! ```

use serde::{Deserialize, Serialize};

/// Media type of the stream
pub const EVENT_STREAM: &str = "text/event-stream";

/// Errors raised while decoding a frame off the wire
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("event block has no data field")]
    MissingData,

    #[error("frame payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Kind tag of a frame. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Message,
    /// Never holds `"message"`; build it with [`FrameKind::from_tag`]
    #[serde(untagged)]
    Other(String),
}

impl FrameKind {
    /// Kind for a wire tag, mapping `"message"` to [`FrameKind::Message`]
    pub fn from_tag(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if tag == "message" {
            FrameKind::Message
        } else {
            FrameKind::Other(tag)
        }
    }
}

/// The unit placed on the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub content: String,
}

impl BroadcastFrame {
    /// Build a `message` frame
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Message,
            content: content.into(),
        }
    }

    pub fn is_message(&self) -> bool {
        self.kind == FrameKind::Message
    }
}

/// Encode a frame as one complete SSE event.
pub fn encode(frame: &BroadcastFrame) -> String {
    // Serializing a struct of strings cannot fail; fall back to an empty object to stay total.
    let json = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

/// Decode one SSE event block (with or without its trailing blank line).
pub fn decode(block: &str) -> Result<BroadcastFrame, FrameError> {
    let mut data: Option<String> = None;

    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let data = data.ok_or(FrameError::MissingData)?;
    Ok(serde_json::from_str(&data)?)
}

/// Incremental splitter turning a byte stream into complete event blocks.
///
/// Bytes are buffered until a blank line terminates the event, so a block is only
/// yielded once it is whole even if it arrived across several network chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a terminator
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event block it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // A terminator may straddle the old end by up to three bytes
        let mut from = self.scanned.saturating_sub(3);
        self.buffer.extend_from_slice(chunk);

        let mut blocks = Vec::new();
        while let Some((end, terminator)) = find_event_end(&self.buffer, from) {
            let rest = self.buffer.split_off(end + terminator);
            let mut block = std::mem::replace(&mut self.buffer, rest);
            block.truncate(end);
            blocks.push(String::from_utf8_lossy(&block).into_owned());
            from = 0;
        }
        self.scanned = self.buffer.len();
        blocks
    }

    /// Bytes received but not yet part of a complete block
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Position of the first blank-line terminator at or after `from`, and its length
fn find_event_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    for i in from..buffer.len() {
        if buffer[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buffer[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_message_frame() {
        let encoded = encode(&BroadcastFrame::message("hello"));
        assert_eq!(
            encoded,
            "data: {\"type\":\"message\",\"content\":\"hello\"}\n\n"
        );
    }

    #[test]
    fn test_round_trip() {
        for content in ["hi", "multi\nline\r\ncontent", "emoji 🦀", "data: nested\n\n"] {
            let frame = BroadcastFrame::message(content);
            assert_eq!(decode(&encode(&frame)).unwrap(), frame);
        }

        let other = BroadcastFrame {
            kind: FrameKind::from_tag("presence"),
            content: "x".to_string(),
        };
        assert_eq!(decode(&encode(&other)).unwrap(), other);
    }

    #[test]
    fn test_message_tag_normalizes_to_message_kind() {
        assert_eq!(FrameKind::from_tag("message"), FrameKind::Message);
        assert_eq!(
            FrameKind::from_tag("typing"),
            FrameKind::Other("typing".to_string())
        );

        let frame = BroadcastFrame {
            kind: FrameKind::from_tag("message"),
            content: "x".to_string(),
        };
        assert_eq!(decode(&encode(&frame)).unwrap(), frame);
    }

    #[test]
    fn test_encoded_frame_is_single_data_line() {
        let encoded = encode(&BroadcastFrame::message("a\n\nb"));
        assert_eq!(encoded.matches("\n\n").count(), 1);
        assert!(encoded.ends_with("\n\n"));
    }

    #[test]
    fn test_decode_ignores_comments_and_other_fields() {
        let block = ": keep-alive\r\nevent: message\r\nid: 7\r\ndata: {\"type\":\"message\",\"content\":\"ok\"}\r\n";
        assert_eq!(decode(block).unwrap(), BroadcastFrame::message("ok"));
    }

    #[test]
    fn test_decode_joins_multiple_data_lines() {
        let block = "data: {\"type\":\"message\",\ndata: \"content\":\"joined\"}";
        assert_eq!(decode(block).unwrap(), BroadcastFrame::message("joined"));
    }

    #[test]
    fn test_decode_unknown_kind_preserved() {
        let frame = decode("data: {\"type\":\"typing\",\"content\":\"\"}").unwrap();
        assert_eq!(frame.kind, FrameKind::Other("typing".to_string()));
        assert!(!frame.is_message());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(": only a comment"), Err(FrameError::MissingData)));
        assert!(matches!(decode("data: not json"), Err(FrameError::Payload(_))));
        assert!(matches!(
            decode("data: {\"type\":\"message\"}"),
            Err(FrameError::Payload(_))
        ));
    }

    #[test]
    fn test_decoder_waits_for_terminator() {
        let mut decoder = FrameDecoder::new();
        let encoded = encode(&BroadcastFrame::message("split"));
        let (head, tail) = encoded.split_at(10);

        assert!(decoder.push(head.as_bytes()).is_empty());
        assert_eq!(decoder.pending(), 10);

        let blocks = decoder.push(tail.as_bytes());
        assert_eq!(blocks.len(), 1);
        assert_eq!(decode(&blocks[0]).unwrap(), BroadcastFrame::message("split"));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_handles_split_utf8_and_batches() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = encode(&BroadcastFrame::message("héllo")).into_bytes();
        bytes.extend(encode(&BroadcastFrame::message("second")).into_bytes());

        // Split inside the two-byte 'é'
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&bytes[..split]).is_empty());

        let blocks = decoder.push(&bytes[split..]);
        let frames: Vec<_> = blocks.iter().map(|b| decode(b).unwrap()).collect();
        assert_eq!(
            frames,
            vec![
                BroadcastFrame::message("héllo"),
                BroadcastFrame::message("second")
            ]
        );
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = encode(&BroadcastFrame::message("first")).into_bytes();
        bytes.extend_from_slice(b"data: {\"type\":\"message\",\"content\":\"second\"}\r\n\r\n");

        let mut blocks = Vec::new();
        for byte in &bytes {
            blocks.extend(decoder.push(std::slice::from_ref(byte)));
        }
        let frames: Vec<_> = blocks.iter().map(|b| decode(b).unwrap()).collect();
        assert_eq!(
            frames,
            vec![
                BroadcastFrame::message("first"),
                BroadcastFrame::message("second")
            ]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_finds_crlf_terminator_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder
            .push(b"data: {\"type\":\"message\",\"content\":\"a\"}\r\n\r")
            .is_empty());
        let blocks = decoder.push(b"\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(decode(&blocks[0]).unwrap(), BroadcastFrame::message("a"));
    }

    #[test]
    fn test_decoder_accepts_crlf_terminator() {
        let mut decoder = FrameDecoder::new();
        let blocks =
            decoder.push(b"data: {\"type\":\"message\",\"content\":\"crlf\"}\r\n\r\nretry: 10");
        assert_eq!(blocks.len(), 1);
        assert_eq!(decode(&blocks[0]).unwrap(), BroadcastFrame::message("crlf"));
        assert_eq!(decoder.pending(), "retry: 10".len());
    }
}
