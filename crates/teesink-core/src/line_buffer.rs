//! Line accumulation for relayed output.
//!
//! Bytes are collected until the last byte of the line terminator is seen.
//! Only that single byte is compared, not the whole terminator sequence, so
//! with `"\r\n"` a bare `'\n'` in the middle of content also completes a line.
//!
//! Draining never splits a multi-byte UTF-8 character: an incomplete trailing
//! sequence stays buffered until its remaining bytes arrive. Invalid bytes are
//! decoded lossily.

/// Platform line separator.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";

/// Platform line separator.
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Growable byte buffer that reports line completion.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    bytes: Vec<u8>,
    terminator: u8,
}

impl LineBuffer {
    /// Create a buffer using the platform [`LINE_SEPARATOR`].
    pub fn new() -> Self {
        Self::with_terminator(LINE_SEPARATOR)
    }

    /// Create a buffer that completes lines on the last byte of `terminator`.
    ///
    /// An empty terminator falls back to `'\n'`.
    pub fn with_terminator(terminator: &str) -> Self {
        Self {
            bytes: Vec::new(),
            terminator: terminator.as_bytes().last().copied().unwrap_or(b'\n'),
        }
    }

    /// Append one byte. Returns `true` if it completes a line.
    pub fn append(&mut self, byte: u8) -> bool {
        self.bytes.push(byte);
        byte == self.terminator
    }

    /// Append one character. Returns `true` if it completes a line.
    pub fn append_char(&mut self, c: char) -> bool {
        let mut encoded = [0u8; 4];
        let encoded = c.encode_utf8(&mut encoded).as_bytes();
        self.bytes.extend_from_slice(encoded);
        encoded.len() == 1 && encoded[0] == self.terminator
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Take the buffered text and install a fresh buffer.
    ///
    /// An incomplete UTF-8 sequence at the end is carried over into the new
    /// buffer rather than returned.
    pub fn drain_and_reset(&mut self) -> String {
        let bytes = std::mem::take(&mut self.bytes);
        let (text, carry) = decode_complete(&bytes);
        self.bytes = carry;
        text
    }

    /// Take everything that is buffered, including an incomplete trailing
    /// sequence (decoded lossily). Used for the final flush on close.
    pub fn finish(&mut self) -> String {
        let bytes = std::mem::take(&mut self.bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode `bytes`, returning the text and any incomplete trailing sequence.
fn decode_complete(bytes: &[u8]) -> (String, Vec<u8>) {
    let mut text = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                return (text, Vec::new());
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None => return (text, after.to_vec()),
                }
            }
        }
    }
}
