//! Incremental decoding of newline-delimited event streams.
//!
//! Providers differ only in the line prefix, where the text sits inside the
//! JSON envelope, and whether an explicit end marker is sent. One
//! [`StreamDecoder`] per provider captures those three facts.

use serde_json::Value;

/// Per-provider stream envelope description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDecoder {
    /// Prefix of a data record, e.g. `data: `.
    pub line_prefix: &'static str,
    /// JSON pointer to the text fragment inside one record.
    pub text_pointer: &'static str,
    /// Payload that ends the stream, e.g. `[DONE]`.
    pub done_sentinel: Option<&'static str>,
}

/// What one line of the stream means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Text(String),
    Done,
    /// Comments, other event kinds, records without text, malformed JSON.
    Skip,
}

impl StreamDecoder {
    /// OpenAI-compatible chat completion chunks.
    pub const CHAT_COMPLETIONS: StreamDecoder = StreamDecoder {
        line_prefix: "data: ",
        text_pointer: "/choices/0/delta/content",
        done_sentinel: Some("[DONE]"),
    };

    /// Anthropic messages stream (`content_block_delta` events).
    pub const ANTHROPIC_MESSAGES: StreamDecoder = StreamDecoder {
        line_prefix: "data: ",
        text_pointer: "/delta/text",
        done_sentinel: None,
    };

    /// Fragments re-emitted by this service's own streaming routes.
    pub const CONTENT_CHUNKS: StreamDecoder = StreamDecoder {
        line_prefix: "data: ",
        text_pointer: "/content",
        done_sentinel: Some("[DONE]"),
    };

    pub fn decode_line(&self, line: &str) -> LineEvent {
        let line = line.trim_end_matches('\r');
        let Some(payload) = line.strip_prefix(self.line_prefix) else {
            return LineEvent::Skip;
        };
        let payload = payload.trim();
        if self.done_sentinel == Some(payload) {
            return LineEvent::Done;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(v) => match v.pointer(self.text_pointer).and_then(Value::as_str) {
                Some(text) if !text.is_empty() => LineEvent::Text(text.to_string()),
                _ => LineEvent::Skip,
            },
            Err(_) => LineEvent::Skip,
        }
    }
}

/// Reassembles lines from arbitrarily split network chunks.
///
/// Splitting happens on raw bytes, so a multi-byte character cut in half by
/// the transport is decoded only once its line is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Returns the unterminated tail once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).into_owned())
    }
}

/// Accumulates decoded text until the stream ends.
#[derive(Debug)]
pub struct StreamAccumulator {
    decoder: StreamDecoder,
    lines: LineBuffer,
    text: String,
    done: bool,
}

impl StreamAccumulator {
    pub fn new(decoder: StreamDecoder) -> Self {
        Self {
            decoder,
            lines: LineBuffer::new(),
            text: String::new(),
            done: false,
        }
    }

    /// Feeds one network chunk; returns the fragments it contained in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let lines = self.lines.push(chunk);
        self.consume(lines)
    }

    /// Flushes an unterminated last line.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = self.lines.finish().into_iter().collect();
        self.consume(tail)
    }

    /// True once the end sentinel was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn consume(&mut self, lines: Vec<String>) -> Vec<String> {
        let mut fragments = Vec::new();
        for line in lines {
            if self.done {
                break;
            }
            match self.decoder.decode_line(&line) {
                LineEvent::Text(t) => {
                    self.text.push_str(&t);
                    fragments.push(t);
                }
                LineEvent::Done => self.done = true,
                LineEvent::Skip => {}
            }
        }
        fragments
    }
}
