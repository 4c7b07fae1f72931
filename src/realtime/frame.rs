//! Splits the realtime body into frames.
//!
//! The stream is `text/event-stream`: each frame is one or more `data:` lines
//! terminated by a blank line. Chunks may end anywhere, including inside a
//! multi-byte character, so bytes are buffered until a full line arrives.

use bytes::{Buf, BytesMut};

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.split_to(newline);
            self.buffer.advance(1);
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.accept_line(line.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.accept_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn accept_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_frame();
        }
        // Comments (":keepalive") and other fields like `id:` carry no payload.
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    fn take_frame(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let frame = self.data.join("\n");
        self.data.clear();
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::FrameDecoder;

    #[test]
    fn splits_frames_across_chunk_boundaries() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\r\n").is_empty());
        let frames = decoder.push(b"\r\ndata: {\"b\":2}\n\ndata: x");
        assert_eq!(frames, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert_eq!(decoder.finish().as_deref(), Some("x"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn joins_multi_line_data_and_ignores_comments() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b":keepalive\n\nid: 7\ndata: one\ndata:two\n\n");
        assert_eq!(frames, vec!["one\ntwo"]);
    }

    #[test]
    fn reassembles_split_utf8() {
        let mut decoder = FrameDecoder::new();
        let bytes = "data: é\n\n".as_bytes();
        assert!(decoder.push(&bytes[..7]).is_empty());
        assert_eq!(decoder.push(&bytes[7..]), vec!["é"]);
    }
}
