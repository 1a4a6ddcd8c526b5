//! Server-Sent Events framing
//!
//! Turns the raw byte stream of a `text/event-stream` response into frames:
//! - `event:`, `data:`, `id:` and `retry:` fields
//! - multi-line `data:` joined with `\n`
//! - LF, CR and CRLF line endings, lines split across network chunks
//! - `:` comment lines ignored
//! - an unterminated frame at end of stream is dropped, as browsers do

use std::collections::VecDeque;

/// Frame type used when the server sends no `event:` field
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseFrame {
    /// Frames delivered to `onmessage` in a browser
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

/// Line-level SSE field parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator); a blank line dispatches
    pub fn decode_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
        None
    }

    /// Forget the frame being built; returns true if it carried data
    pub fn discard_pending(&mut self) -> bool {
        self.event = None;
        let had_data = !self.data.is_empty();
        self.data.clear();
        had_data
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
            // id and retry persist across frames
            id: self.last_id.clone(),
            retry: self.retry,
        })
    }
}

/// Splits a byte stream into lines, buffering partial lines across chunks
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
    // last terminator was CR, so a leading LF belongs to it
    after_cr: bool,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            let after_cr = std::mem::take(&mut self.after_cr);
            match byte {
                b'\n' if after_cr => {}
                b'\n' => lines.push(self.take_line()),
                b'\r' => {
                    lines.push(self.take_line());
                    self.after_cr = true;
                }
                _ => self.buffer.push(byte),
            }
        }
        lines
    }

    fn take_line(&mut self) -> String {
        let line = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&line).into_owned()
    }

    /// Drop an unterminated line; returns true if there was one
    fn discard(&mut self) -> bool {
        self.after_cr = false;
        let had_line = !self.buffer.is_empty();
        self.buffer.clear();
        had_line
    }
}

/// Byte-level SSE stream: push network chunks, pop frames
#[derive(Debug, Default)]
pub struct SseStream {
    lines: LineBuffer,
    decoder: SseDecoder,
    frames: VecDeque<SseFrame>,
}

impl SseStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for line in self.lines.push(bytes) {
            if let Some(frame) = self.decoder.decode_line(&line) {
                self.frames.push_back(frame);
            }
        }
    }

    pub fn next_frame(&mut self) -> Option<SseFrame> {
        self.frames.pop_front()
    }

    /// End of stream: complete frames stay queued, anything unterminated is
    /// dropped. Returns true if a partial line or frame was discarded.
    pub fn finish(&mut self) -> bool {
        let partial_line = self.lines.discard();
        let partial_frame = self.decoder.discard_pending();
        partial_line || partial_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_simple_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode_line("data: hello").is_none());
        let frame = decoder.decode_line("").unwrap();
        assert_eq!(frame.event, "message");
        assert_eq!(frame.data, "hello");
        assert!(frame.is_message());
    }

    #[test]
    fn test_decoder_named_event_and_multiline() {
        let mut decoder = SseDecoder::new();
        decoder.decode_line("event: status");
        decoder.decode_line("data: line1");
        decoder.decode_line("data:line2");
        let frame = decoder.decode_line("").unwrap();
        assert_eq!(frame.event, "status");
        assert_eq!(frame.data, "line1\nline2");
        assert!(!frame.is_message());
    }

    #[test]
    fn test_decoder_comment_and_blank_without_data() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode_line(": keep-alive").is_none());
        assert!(decoder.decode_line("").is_none());
        decoder.decode_line("event: ignored");
        assert!(decoder.decode_line("").is_none());
        decoder.decode_line("data: x");
        assert_eq!(decoder.decode_line("").unwrap().event, "message");
    }

    #[test]
    fn test_decoder_id_and_retry_persist() {
        let mut decoder = SseDecoder::new();
        decoder.decode_line("id: 7");
        decoder.decode_line("retry: 2500");
        decoder.decode_line("data: a");
        let first = decoder.decode_line("").unwrap();
        decoder.decode_line("data: b");
        let second = decoder.decode_line("").unwrap();
        assert_eq!(first.id.as_deref(), Some("7"));
        assert_eq!(second.id.as_deref(), Some("7"));
        assert_eq!(second.retry, Some(2500));
    }

    #[test]
    fn test_stream_split_across_chunks() {
        let mut stream = SseStream::new();
        stream.push(b"data: {\"type\":\"mess");
        assert!(stream.next_frame().is_none());
        stream.push(b"age_chunk\"}\r\n\r\ndata: second\n");
        let frame = stream.next_frame().unwrap();
        assert_eq!(frame.data, r#"{"type":"message_chunk"}"#);
        assert!(stream.next_frame().is_none());
        stream.push(b"\n");
        assert_eq!(stream.next_frame().unwrap().data, "second");
    }

    #[test]
    fn test_stream_finish_drops_unterminated_frame() {
        let mut stream = SseStream::new();
        stream.push(b"data: {\"type\":\"message_chunk\",\"messageId\":\"m1\"}\n");
        assert!(stream.finish());
        assert!(stream.next_frame().is_none());

        let mut stream = SseStream::new();
        stream.push(b"data: done\n\ndata: tai");
        assert!(stream.finish());
        assert_eq!(stream.next_frame().unwrap().data, "done");
        assert!(stream.next_frame().is_none());

        // nothing pending after a clean frame boundary
        let mut stream = SseStream::new();
        stream.push(b"data: done\n\n");
        assert!(!stream.finish());
        assert_eq!(stream.next_frame().unwrap().data, "done");
    }

    #[test]
    fn test_stream_line_terminators() {
        let mut stream = SseStream::new();
        stream.push(b"data: cr\r\rdata: lf\n\ndata: crlf\r\n\r\n");
        assert_eq!(stream.next_frame().unwrap().data, "cr");
        assert_eq!(stream.next_frame().unwrap().data, "lf");
        assert_eq!(stream.next_frame().unwrap().data, "crlf");
        assert!(stream.next_frame().is_none());
    }

    #[test]
    fn test_stream_crlf_split_across_chunks() {
        let mut stream = SseStream::new();
        stream.push(b"data: a\r");
        stream.push(b"\ndata: b\r");
        stream.push(b"\n\r");
        let frame = stream.next_frame().unwrap();
        assert_eq!(frame.data, "a\nb");
        assert!(stream.next_frame().is_none());
        assert!(!stream.finish());
    }

    #[test]
    fn test_multibyte_split() {
        let bytes = "data: 你好\n\n".as_bytes();
        let mut stream = SseStream::new();
        stream.push(&bytes[..8]);
        stream.push(&bytes[8..]);
        assert_eq!(stream.next_frame().unwrap().data, "你好");
    }
}
