use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be at least 1 word");
        }
        if overlap >= chunk_size {
            bail!("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})");
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Overlapping word windows over `text`; the last window may be shorter than the chunk size.
pub fn chunk_words(text: &str, config: &ChunkConfig) -> Vec<String> {
    let words = text.split_whitespace().collect::<Vec<&str>>();
    let mut chunks = Vec::new();
    let mut offset = 0usize;

    while offset < words.len() {
        let end = (offset + config.chunk_size).min(words.len());
        chunks.push(words[offset..end].join(" "));
        offset += config.step();
    }

    chunks
}
