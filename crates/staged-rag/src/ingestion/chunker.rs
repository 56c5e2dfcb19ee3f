//! Sentence-bounded text chunking with overlap

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;

/// Text chunker with configurable size and overlap
pub struct TextChunker {
    /// Target chunk size in bytes
    chunk_size: usize,
    /// Overlap carried into the next chunk
    overlap: usize,
    /// Chunks shorter than this are dropped
    min_size: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            min_size: 20,
        }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap).with_min_size(config.min_chunk_size)
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Split text into chunks; position in the result is the chunk index
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        // Bytes at the start of `current` repeated from the previous chunk
        let mut carried = 0;

        for piece in self.pieces(text) {
            if current.len() > carried && current.len() + piece.len() > self.chunk_size {
                self.push_chunk(&mut chunks, &current);
                current = self.overlap_text(&current);
                carried = current.len();
            }
            if current.len() + piece.len() > self.chunk_size {
                current.clear();
                carried = 0;
            }
            current.push_str(piece);
        }
        if current.len() > carried {
            self.push_chunk(&mut chunks, &current);
        }

        chunks
    }

    fn push_chunk(&self, chunks: &mut Vec<String>, text: &str) {
        let trimmed = text.trim();
        if trimmed.len() >= self.min_size {
            chunks.push(trimmed.to_string());
        }
    }

    /// Sentences, with any sentence longer than a chunk broken on word bounds
    fn pieces<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        for sentence in text.split_sentence_bounds() {
            if sentence.len() <= self.chunk_size {
                pieces.push(sentence);
                continue;
            }

            let mut start = 0;
            let mut end = 0;
            for (offset, word) in sentence.split_word_bound_indices() {
                if offset > start && offset + word.len() - start > self.chunk_size {
                    pieces.push(&sentence[start..end]);
                    start = offset;
                }
                end = offset + word.len();
            }
            if start < sentence.len() {
                pieces.push(&sentence[start..]);
            }
        }
        pieces
    }

    /// Tail of a chunk to repeat at the start of the next one
    fn overlap_text(&self, text: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        if text.len() <= self.overlap {
            return text.to_string();
        }

        let mut start = text.len() - self.overlap;
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
        let tail = &text[start..];

        // Prefer starting at a sentence, then at a word
        if let Some(pos) = tail.find(". ") {
            return tail[pos + 2..].to_string();
        }
        if let Some(pos) = tail.find(' ') {
            return tail[pos + 1..].to_string();
        }
        tail.to_string()
    }
}
