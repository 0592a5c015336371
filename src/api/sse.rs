//! Minimal server-sent-events line parser
//!
//! The backend streams `data: <json>` lines. Chunks arrive on arbitrary
//! byte boundaries, so the parser buffers the trailing incomplete line
//! between pushes and yields complete data payloads in order.

/// Incremental SSE payload extractor
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a decoded chunk; returns the data payloads completed by it
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data: ") {
                if !data.trim().is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines_yield_payloads() {
        let mut parser = SseParser::new();
        let payloads = parser.push("data: {\"a\":1}\ndata: {\"b\":2}\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_partial_line_is_buffered_across_pushes() {
        let mut parser = SseParser::new();
        assert!(parser.push("data: {\"par").is_empty());
        assert_eq!(parser.push("tial\":true}\n"), vec!["{\"partial\":true}"]);
    }

    #[test]
    fn test_non_data_lines_and_keepalives_are_skipped() {
        let mut parser = SseParser::new();
        let payloads = parser.push("event: ping\n\ndata: \ndata: {\"x\":1}\n");
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }

    #[test]
    fn test_crlf_lines_are_handled() {
        let mut parser = SseParser::new();
        assert_eq!(parser.push("data: {\"y\":2}\r\n"), vec!["{\"y\":2}"]);
    }
}
