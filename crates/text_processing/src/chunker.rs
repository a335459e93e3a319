//! Buffers an LLM token stream and splits it into prosodically-sized
//! chunks at an inline break marker (spec §4.7).

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub break_marker: String,
    pub max_buffer_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { break_marker: "||BREAK||".to_string(), max_buffer_size: 400 }
    }
}

pub struct SemanticChunker {
    config: ChunkerConfig,
    buffer: String,
}

impl SemanticChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config, buffer: String::new() }
    }

    /// Append a token to the buffer and return any chunks now ready for
    /// dispatch, in order.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);

        let mut chunks = Vec::new();
        if self.buffer.contains(&self.config.break_marker) {
            let mut segments: Vec<&str> = self.buffer.split(self.config.break_marker.as_str()).collect();
            // The last element is the trailing remainder that stays buffered.
            let remainder = segments.pop().unwrap_or("").to_string();
            for segment in segments {
                push_trimmed(&mut chunks, segment);
            }
            self.buffer = remainder;
        }

        if self.buffer.len() > self.config.max_buffer_size {
            tracing::warn!(
                buffer_len = self.buffer.len(),
                cap = self.config.max_buffer_size,
                "chunker: safety cap exceeded with no marker, forcing flush"
            );
            metrics::counter!("chunker_safety_cap_flushes_total").increment(1);
            let forced = std::mem::take(&mut self.buffer);
            push_trimmed(&mut chunks, &forced);
        }

        chunks
    }

    /// Flush the remainder at end of stream. Returns `None` if nothing
    /// is left after trimming.
    pub fn finish(mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buffer);
        let trimmed = remainder.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn push_trimmed(chunks: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> SemanticChunker {
        SemanticChunker::new(ChunkerConfig::default())
    }

    #[test]
    fn splits_on_marker_and_keeps_remainder_buffered() {
        let mut c = chunker();
        let chunks = c.push("Hi! ||BREAK|| How can I help?");
        assert_eq!(chunks, vec!["Hi!".to_string()]);
        let last = c.finish();
        assert_eq!(last, Some("How can I help?".to_string()));
    }

    #[test]
    fn multiple_markers_in_one_push_dispatch_all_complete_segments() {
        let mut c = chunker();
        let chunks = c.push("one ||BREAK|| two ||BREAK|| three");
        assert_eq!(chunks, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(c.finish(), Some("three".to_string()));
    }

    #[test]
    fn no_marker_ever_seen_flushes_whole_response_at_stream_end() {
        let mut c = chunker();
        assert!(c.push("no markers here at all").is_empty());
        assert_eq!(c.finish(), Some("no markers here at all".to_string()));
    }

    #[test]
    fn safety_cap_forces_flush_without_marker() {
        let mut c = SemanticChunker::new(ChunkerConfig { break_marker: "||BREAK||".into(), max_buffer_size: 10 });
        let chunks = c.push("this buffer is definitely longer than ten characters");
        assert_eq!(chunks.len(), 1);
        assert_eq!(c.finish(), None);
    }

    #[test]
    fn empty_segments_after_trim_are_discarded() {
        let mut c = chunker();
        let chunks = c.push("||BREAK||   ||BREAK|| real text");
        assert!(chunks.is_empty());
        assert_eq!(c.finish(), Some("real text".to_string()));
    }

    #[test]
    fn finish_with_empty_remainder_returns_none() {
        let mut c = chunker();
        let _ = c.push("all said ||BREAK||");
        assert_eq!(c.finish(), None);
    }
}
