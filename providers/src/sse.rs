use serde_json::Value;

use crate::adapter::ProviderAdapter;
use crate::types::Usage;

/// One decoded `data:` line from an SSE stream, plus usage opportunistically
/// extracted from it by the owning provider's adapter.
pub struct SseChunk {
    pub raw: Vec<u8>,
    pub usage: Option<Usage>,
    pub is_done: bool,
}

/// Splits a byte stream on SSE event boundaries (`\n\n`) and, for each
/// `data:` line that parses as JSON, asks the adapter whether it carries
/// usage. Bytes are forwarded to the agent unchanged; this never rewrites
/// the stream, it only watches it.
pub struct SseUsageScanner<'a> {
    adapter: &'a dyn ProviderAdapter,
    buf: Vec<u8>,
}

impl<'a> SseUsageScanner<'a> {
    pub fn new(adapter: &'a dyn ProviderAdapter) -> Self {
        Self { adapter, buf: Vec::new() }
    }

    /// Feeds one chunk of upstream bytes, returning the complete SSE events
    /// found (each still containing its original bytes) that are now ready
    /// to forward, along with any usage found in them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseChunk> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let Some(pos) = find_double_newline(&self.buf) else { break };
            let event: Vec<u8> = self.buf.drain(..pos + 2).collect();
            let (usage, is_done) = self.inspect(&event);
            out.push(SseChunk { raw: event, usage, is_done });
        }

        out
    }

    fn inspect(&self, event: &[u8]) -> (Option<Usage>, bool) {
        let text = String::from_utf8_lossy(event);
        for line in text.lines() {
            let Some(data) = line.strip_prefix("data:") else { continue };
            let data = data.trim();
            if data == "[DONE]" {
                return (None, true);
            }
            if let Ok(payload) = serde_json::from_str::<Value>(data) {
                if let Some(usage) = self.adapter.usage_from_sse_payload(&payload) {
                    return (Some(usage), false);
                }
            }
        }
        (None, false)
    }
}

fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::OpenAiAdapter;

    #[test]
    fn feeds_partial_chunks_and_reassembles_events() {
        let adapter = OpenAiAdapter::default();
        let mut scanner = SseUsageScanner::new(&adapter);

        let mut chunks = scanner.feed(b"data: {\"choices\":[]}\n");
        assert!(chunks.is_empty());

        chunks = scanner.feed(b"\ndata: {\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2}}\n\n");
        assert_eq!(chunks.len(), 1);
        let usage = chunks[0].usage.unwrap();
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.output_tokens, 2);
    }

    #[test]
    fn done_sentinel_marks_stream_end() {
        let adapter = OpenAiAdapter::default();
        let mut scanner = SseUsageScanner::new(&adapter);
        let chunks = scanner.feed(b"data: [DONE]\n\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_done);
        assert!(chunks[0].usage.is_none());
    }

    #[test]
    fn non_json_data_line_is_forwarded_without_panicking() {
        let adapter = OpenAiAdapter::default();
        let mut scanner = SseUsageScanner::new(&adapter);
        let chunks = scanner.feed(b": keep-alive\n\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].usage.is_none());
    }
}
