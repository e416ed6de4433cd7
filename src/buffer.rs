//! Bounded output accumulation.
//!
//! The buffer is append-only with tail truncation: once the ceiling is hit,
//! the oldest characters are dropped so memory stays bounded no matter how
//! chatty the child process is. Some calibration tools print a status table
//! every few tens of milliseconds, which adds up fast without a cap.

use crate::types::TRUNCATION_MARKER;

/// UTF-8 text accumulator with a hard character ceiling.
///
/// Mutated only by the owning session's reader; read by snapshot requests.
/// Callers serialize access through the session's buffer lock.
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    chars: usize,
    max_chars: usize,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            max_chars,
        }
    }

    /// Append a chunk, dropping the oldest characters if the ceiling is
    /// exceeded. Truncation cuts on a character boundary.
    pub fn append(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);
        self.chars += chunk.chars().count();
        if self.chars > self.max_chars {
            let excess = self.chars - self.max_chars;
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map(|(i, _)| i)
                .unwrap_or(self.text.len());
            self.text.replace_range(..cut, "");
            self.chars = self.max_chars;
        }
    }

    pub fn contents(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.chars
    }
}

/// The trailing `cap` characters of `text`, prefixed with the truncation
/// marker when the cap cuts anything. Below the cap, `text` verbatim.
pub fn capped_tail(text: &str, cap: usize) -> String {
    let chars = text.chars().count();
    if chars <= cap {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(chars - cap)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("{}{}", TRUNCATION_MARKER, &text[cut..])
}

/// Longest prefix of `bytes` that can be decoded without guessing at an
/// unfinished trailing sequence.
///
/// Invalid bytes in the middle are passed through (the caller decodes
/// lossily); only a genuinely incomplete final character is held back, and
/// that is at most three bytes.
pub fn utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => bytes.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_ceiling_keeps_everything() {
        let mut buf = OutputBuffer::new(100);
        buf.append("hello ");
        buf.append("world");
        assert_eq!(buf.contents(), "hello world");
        assert_eq!(buf.char_len(), 11);
    }

    #[test]
    fn ceiling_keeps_trailing_window() {
        // Synthetic producer: write far more than the cap and verify the
        // retained suffix matches the tail of everything ever appended.
        let mut buf = OutputBuffer::new(50);
        let mut all = String::new();
        for i in 0..40 {
            let chunk = format!("chunk-{i:02};");
            all.push_str(&chunk);
            buf.append(&chunk);
        }
        assert_eq!(buf.char_len(), 50);
        let expected: String = {
            let skip = all.chars().count() - 50;
            all.chars().skip(skip).collect()
        };
        assert_eq!(buf.contents(), expected);
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        let mut buf = OutputBuffer::new(4);
        buf.append("日本語です"); // five chars, three bytes each
        assert_eq!(buf.contents(), "本語です");
        assert_eq!(buf.char_len(), 4);
    }

    #[test]
    fn single_oversized_append() {
        let mut buf = OutputBuffer::new(10);
        buf.append(&"x".repeat(35));
        assert_eq!(buf.contents(), "x".repeat(10));
    }

    #[test]
    fn capped_tail_below_cap_is_verbatim() {
        assert_eq!(capped_tail("short", 30), "short");
        assert!(!capped_tail("short", 30).contains(TRUNCATION_MARKER));
    }

    #[test]
    fn capped_tail_marks_truncation() {
        let text = "a".repeat(40);
        let out = capped_tail(&text, 10);
        assert_eq!(out, format!("{}{}", TRUNCATION_MARKER, "a".repeat(10)));
    }

    #[test]
    fn capped_tail_multibyte() {
        let text = "é".repeat(20);
        let out = capped_tail(&text, 5);
        assert_eq!(out, format!("{}{}", TRUNCATION_MARKER, "é".repeat(5)));
    }

    #[test]
    fn utf8_boundary_complete_input() {
        assert_eq!(utf8_boundary("héllo".as_bytes()), "héllo".len());
    }

    #[test]
    fn utf8_boundary_holds_back_incomplete_tail() {
        let mut bytes = b"ready ".to_vec();
        let multi = "語".as_bytes();
        bytes.extend_from_slice(&multi[..2]); // first two of three bytes
        assert_eq!(utf8_boundary(&bytes), b"ready ".len());
    }

    #[test]
    fn utf8_boundary_passes_through_garbage() {
        // 0xFF can never start a sequence; nothing to wait for.
        let bytes = [b'o', b'k', 0xFF, b'!'];
        assert_eq!(utf8_boundary(&bytes), bytes.len());
    }
}
