//! Line framing and parsing for `/chat/stream`.
//!
//! The body is a sequence of `data: <payload>` lines.  [`LineBuffer`] turns
//! arbitrary byte chunks into complete lines, and [`parse_line`] classifies
//! each line without ever failing the whole stream.

use crate::transport::types::StreamRecord;

/// What a single stream line means to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Not a `data:` line; nothing to do.
    Ignore,
    /// `[DONE]` or an empty payload: stop without a fragment.
    End,
    /// A decoded record.  `done` ends the stream after `chunk`.
    Record { chunk: Option<String>, done: bool },
    /// The payload could not be decoded; the line is skipped.
    Malformed { reason: String },
}

/// Classify one line of the stream body.
pub fn parse_line(line: &str) -> LineEvent {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix("data: ") else {
        tracing::trace!(line, "ignoring non-data stream line");
        return LineEvent::Ignore;
    };

    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return LineEvent::End;
    }

    match serde_json::from_str::<StreamRecord>(payload) {
        Ok(record) => LineEvent::Record {
            chunk: record.chunk,
            done: record.done,
        },
        Err(e) => LineEvent::Malformed {
            reason: e.to_string(),
        },
    }
}

/// Reassembles newline-terminated lines from byte chunks.
///
/// Bytes are buffered raw so a multi-byte character split across two chunks
/// is decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let raw = std::mem::replace(&mut self.pending, rest);
            lines.push(String::from_utf8_lossy(&raw[..pos]).into_owned());
        }
        lines
    }

    /// Return the unterminated tail, if any, once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_data_lines_are_ignored() {
        assert_eq!(parse_line(""), LineEvent::Ignore);
        assert_eq!(parse_line(": keepalive"), LineEvent::Ignore);
        assert_eq!(parse_line("event: message"), LineEvent::Ignore);
        assert_eq!(parse_line("data:{\"chunk\":\"x\"}"), LineEvent::Ignore);
    }

    #[test]
    fn done_marker_and_empty_payload_end_the_stream() {
        assert_eq!(parse_line("data: [DONE]"), LineEvent::End);
        assert_eq!(parse_line("data: "), LineEvent::End);
        assert_eq!(parse_line("data: [DONE]\r"), LineEvent::End);
    }

    #[test]
    fn records_are_decoded() {
        assert_eq!(
            parse_line(r#"data: {"chunk":"Hel","done":false}"#),
            LineEvent::Record {
                chunk: Some("Hel".into()),
                done: false
            }
        );
        assert_eq!(
            parse_line(r#"data: {"done":true}"#),
            LineEvent::Record {
                chunk: None,
                done: true
            }
        );
    }

    #[test]
    fn undecodable_payload_is_malformed_not_fatal() {
        assert!(matches!(
            parse_line("data: {not json"),
            LineEvent::Malformed { .. }
        ));
    }

    #[test]
    fn line_buffer_joins_split_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"chu").is_empty());
        let lines = buf.push(b"nk\":\"a\"}\ndata: [DO");
        assert_eq!(lines, vec![r#"data: {"chunk":"a"}"#.to_owned()]);
        let lines = buf.push(b"NE]\n");
        assert_eq!(lines, vec!["data: [DONE]".to_owned()]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let text = "data: {\"chunk\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut buf = LineBuffer::new();
        assert!(buf.push(&text[..split]).is_empty());
        let lines = buf.push(&text[split..]);
        assert_eq!(lines, vec!["data: {\"chunk\":\"héllo\"}".to_owned()]);
    }

    #[test]
    fn line_buffer_returns_unterminated_tail() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: [DONE]").is_empty());
        assert_eq!(buf.finish().as_deref(), Some("data: [DONE]"));
    }
}
