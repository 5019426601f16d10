use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    config::ChunkingConfig,
    pipeline::utils::{Tokenizer, compute_mdhash_id, token_windows},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub order: usize,
    pub token_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// Split on this delimiter first; oversized pieces are still windowed.
    pub split_by: Option<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkingConfig::default().into()
    }
}

impl From<ChunkingConfig> for ChunkConfig {
    fn from(config: ChunkingConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
            split_by: None,
        }
    }
}

pub trait Chunker: Send + Sync {
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<Chunk>>;
}

#[derive(Clone)]
pub struct TokenizerChunker {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenizerChunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    fn window_piece(&self, piece: &str, config: &ChunkConfig, out: &mut Vec<(usize, String)>) -> Result<()> {
        let tokens = self.tokenizer.encode(piece);
        if tokens.len() <= config.max_tokens {
            out.push((tokens.len(), piece.to_string()));
            return Ok(());
        }
        let mut covered = 0;
        for (start, end) in token_windows(tokens.len(), config.max_tokens, config.overlap_tokens)? {
            let (start, end) = self.align_to_chars(&tokens, start, end)?;
            // a widened window can swallow the next one whole
            if end <= covered {
                continue;
            }
            covered = end;
            let bytes = self.tokenizer.decode_bytes(&tokens[start..end])?;
            out.push((end - start, String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(())
    }

    /// Widens `[start, end)` until neither edge cuts through a multi-byte character.
    fn align_to_chars(
        &self,
        tokens: &[u32],
        mut start: usize,
        mut end: usize,
    ) -> Result<(usize, usize)> {
        while start > 0 && self.starts_mid_char(tokens[start])? {
            start -= 1;
        }
        while end < tokens.len() && self.ends_mid_char(&tokens[start..end])? {
            end += 1;
        }
        Ok((start, end))
    }

    fn starts_mid_char(&self, token: u32) -> Result<bool> {
        let bytes = self.tokenizer.decode_bytes(&[token])?;
        Ok(bytes.first().is_some_and(|b| b & 0xC0 == 0x80))
    }

    fn ends_mid_char(&self, window: &[u32]) -> Result<bool> {
        let bytes = self.tokenizer.decode_bytes(window)?;
        Ok(matches!(std::str::from_utf8(&bytes), Err(err) if err.error_len().is_none()))
    }
}

impl Chunker for TokenizerChunker {
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<Chunk>> {
        // validates the window parameters even for short input
        token_windows(0, config.max_tokens, config.overlap_tokens)?;

        let mut pieces = Vec::new();
        match config.split_by.as_deref().filter(|d| !d.is_empty()) {
            Some(delimiter) => {
                for piece in content.split(delimiter) {
                    self.window_piece(piece, config, &mut pieces)?;
                }
            }
            None => self.window_piece(content, config, &mut pieces)?,
        }

        let chunks = pieces
            .into_iter()
            .map(|(tokens, text)| (tokens, text.trim().to_string()))
            .filter(|(_, text)| !text.is_empty())
            .enumerate()
            .map(|(order, (token_count, content))| Chunk {
                id: compute_mdhash_id(&content, "chunk-"),
                content,
                order,
                token_count,
            })
            .collect();

        Ok(chunks)
    }
}
