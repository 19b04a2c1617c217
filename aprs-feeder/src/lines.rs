//! Split the feed's byte stream into accepted TNC2 lines.

/// A partial line longer than this without a terminator is discarded.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Accumulates socket reads and yields complete lines.
///
/// Lines end at `\n`; a preceding `\r` is stripped. Blank lines and
/// server comments (`#`) are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Inside an oversized line: skip bytes until the next `\n`.
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=end).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if let Some(line) = clean_line(&raw) {
                lines.push(line);
            }
        }

        if self.buf.len() > MAX_LINE_BYTES {
            tracing::trace!(bytes = self.buf.len(), "discarding oversized partial line");
            self.buf.clear();
            self.discarding = true;
        }
        lines
    }

    /// Bytes held for an incomplete line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Decode and trim one raw line. `None` for blank lines and `#` comments.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn clean_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_lf_and_crlf() {
        let mut lb = LineBuffer::new();
        let lines = lb.push(b"A>APRS:one\r\nB>APRS:two\nC>AP");
        assert_eq!(lines, vec!["A>APRS:one", "B>APRS:two"]);
        assert_eq!(lb.buffered(), 4);

        let lines = lb.push(b"RS:three\r\n");
        assert_eq!(lines, vec!["C>APRS:three"]);
        assert_eq!(lb.buffered(), 0);
    }

    #[test]
    fn test_drops_blank_and_comment_lines() {
        let mut lb = LineBuffer::new();
        let lines = lb.push(b"# aprsc 2.1.14\r\n\r\n   \nA>APRS:x\n# logresp N0CALL unverified\n");
        assert_eq!(lines, vec!["A>APRS:x"]);
    }

    #[test]
    fn test_terminator_split_across_reads() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"A>APRS:x\r").is_empty());
        assert_eq!(lb.push(b"\n"), vec!["A>APRS:x"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut lb = LineBuffer::new();
        let lines = lb.push(b"A>APRS:caf\xe9\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("A>APRS:caf"));
    }

    #[test]
    fn test_oversized_line_discarded() {
        let mut lb = LineBuffer::new();
        let junk = vec![b'x'; MAX_LINE_BYTES + 1];
        assert!(lb.push(&junk).is_empty());
        assert_eq!(lb.buffered(), 0);

        // The tail of the oversized line is skipped, the next line survives
        let lines = lb.push(b"more junk\nA>APRS:ok\n");
        assert_eq!(lines, vec!["A>APRS:ok"]);
    }
}
