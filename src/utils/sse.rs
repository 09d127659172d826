use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SseEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> SseEvent {
        SseEvent {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Event with an explicit `event:` name line, the framing Claude streams use.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> SseEvent {
        SseEvent {
            event: Some(event.into()),
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buffer = BytesMut::new();
        if let Some(id) = &self.id {
            buffer.put_slice(b"id: ");
            buffer.put_slice(id.as_bytes());
            buffer.put_u8(b'\n');
        }
        if let Some(event) = &self.event {
            buffer.put_slice(b"event: ");
            buffer.put_slice(event.as_bytes());
            buffer.put_u8(b'\n');
        }
        if let Some(retry) = self.retry {
            buffer.put_slice(b"retry: ");
            buffer.put_slice(retry.to_string().as_bytes());
            buffer.put_u8(b'\n');
        }
        if !self.data.is_empty() {
            for line in self.data.split('\n') {
                buffer.put_slice(b"data: ");
                buffer.put_slice(line.as_bytes());
                buffer.put_u8(b'\n');
            }
        }
        buffer.put_u8(b'\n');
        buffer
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty() && self.event.is_none() && self.id.is_none() && self.retry.is_none()
    }
}

/// Incremental Server-Sent-Events parser. Chunks may split events, lines, or
/// even UTF-8 sequences anywhere; state is carried between `process` calls.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    pending: SseEvent,
    bom_checked: bool,
}

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        if !self.bom_checked {
            if self.buffer.len() < UTF8_BOM.len() {
                // Could still be a partial BOM; wait for more bytes.
                if self.buffer == UTF8_BOM[..self.buffer.len()] {
                    return Vec::new();
                }
                self.bom_checked = true;
            } else {
                if self.buffer[..3] == UTF8_BOM {
                    self.buffer.drain(..3);
                }
                self.bom_checked = true;
            }
        }

        let mut events = Vec::new();
        while let Some((end, skip)) = self.next_line_boundary() {
            let line_bytes: Vec<u8> = self.buffer.drain(..end + skip).take(end).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            if line.is_empty() {
                if !self.pending.is_empty() {
                    events.push(std::mem::take(&mut self.pending));
                }
            } else {
                self.feed_line(&line);
            }
        }
        events
    }

    /// Finds the next line terminator, handling \n, \r and \r\n. Returns the
    /// line end offset and how many terminator bytes to skip, or None when the
    /// buffer holds no complete line (a trailing \r waits for a possible \n).
    fn next_line_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.iter().position(|&b| b == b'\n');
        let cr = self.buffer.iter().position(|&b| b == b'\r');
        match (lf, cr) {
            (Some(lf), Some(cr)) => {
                if lf < cr {
                    Some((lf, 1))
                } else if lf == cr + 1 {
                    Some((cr, 2))
                } else {
                    Some((cr, 1))
                }
            }
            (Some(lf), None) => Some((lf, 1)),
            (None, Some(cr)) if cr + 1 < self.buffer.len() => Some((cr, 1)),
            _ => None,
        }
    }

    fn feed_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => {
                if !self.pending.data.is_empty() {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
            }
            "id" => {
                if !value.contains('\0') {
                    self.pending.id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(retry) = value.trim().parse::<u32>() {
                    self.pending.retry = Some(retry);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_event() {
        let mut parser = SseParser::new();
        let events = parser.process(b"data: hello world\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello world");
    }

    #[test]
    fn parses_named_event_with_fields() {
        let mut parser = SseParser::new();
        let events = parser.process(b"id: 7\nevent: message_delta\nretry: 250\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].event.as_deref(), Some("message_delta"));
        assert_eq!(events[0].retry, Some(250));
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.process(b"data: hel").is_empty());
        let events = parser.process(b"lo\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn multiline_data_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.process(b"data: line1\ndata: line2\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn comments_are_skipped() {
        let mut parser = SseParser::new();
        let events = parser.process(b": keepalive\n\ndata: real\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn handles_mixed_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.process(b"data: a\r\ndata: b\r\n\r\ndata: c\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[1].data, "c");
    }

    #[test]
    fn trailing_cr_waits_for_possible_lf() {
        let mut parser = SseParser::new();
        assert!(parser.process(b"data: test\r").is_empty());
        let events = parser.process(b"\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "test");
    }

    #[test]
    fn byte_by_byte_delivery() {
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for b in b"event: ping\ndata: {}\n\n" {
            events.extend(parser.process(&[*b]));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("ping"));
    }

    #[test]
    fn utf8_split_across_chunks() {
        let mut parser = SseParser::new();
        // Four-byte scalar split in the middle.
        let bytes = "data: \u{1F680}\n\n".as_bytes();
        let mut events = parser.process(&bytes[..8]);
        events.extend(parser.process(&bytes[8..]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "\u{1F680}");
    }

    #[test]
    fn leading_bom_is_dropped_even_when_split() {
        let mut parser = SseParser::new();
        assert!(parser.process(&[0xEF]).is_empty());
        assert!(parser.process(&[0xBB]).is_empty());
        assert!(parser.process(&[0xBF]).is_empty());
        let events = parser.process(b"data: hi\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = SseEvent {
            id: Some("1".to_string()),
            event: Some("message".to_string()),
            data: "a\nb".to_string(),
            retry: Some(99),
        };
        assert_eq!(
            event.to_bytes(),
            "id: 1\nevent: message\nretry: 99\ndata: a\ndata: b\n\n".as_bytes()
        );
    }
}
