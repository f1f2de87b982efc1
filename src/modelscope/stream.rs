use serde_json::Value;

const DONE_SENTINEL: &str = "[DONE]";

/// Splits a byte stream into text lines.
///
/// Bytes stay buffered until a `\n` arrives, so a multi-byte character cut in
/// half by a network read is only decoded once both halves are present.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Whatever is left after the last newline, once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = decode_line(&self.buffer);
        self.buffer.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Text carried by one event line, if any.
///
/// Blank lines, the `[DONE]` sentinel and anything that is not valid JSON all
/// yield `None`.
pub fn parse_event_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.trim(),
        None => trimmed,
    };
    if payload == DONE_SENTINEL {
        return None;
    }

    let value: Value = serde_json::from_str(payload).ok()?;
    let piece = extract_content(&value, "delta")?;
    (!piece.is_empty()).then(|| piece.to_string())
}

/// Reply text from a completion payload, looking in `choices[0].<primary>.content`
/// first and then the other shapes providers use.
pub fn extract_content<'a>(value: &'a Value, primary: &str) -> Option<&'a str> {
    let choice = &value["choices"][0];
    choice[primary]["content"]
        .as_str()
        .or_else(|| choice["message"]["content"].as_str())
        .or_else(|| value["output_text"].as_str())
        .or_else(|| value["text"].as_str())
}
