use anyhow::{Result, anyhow};
use sha2::{Digest, Sha256};
use tiktoken_rs::{CoreBPE, o200k_base};

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    /// Raw bytes of `tokens`. A slice may end or start inside a multi-byte
    /// character, so the result is not necessarily valid UTF-8.
    fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>>;
}

pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = o200k_base()?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_with_special_tokens(text)
    }

    // Only ever called with ranks produced by `encode`, which are always in the vocabulary.
    fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>> {
        Ok(self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect())
    }
}

/// Stable content-addressed id: `prefix` + hex sha256 of `content`.
pub fn compute_mdhash_id(content: &str, prefix: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{prefix}{digest:x}")
}

/// Token spans `[start, end)` covering `len` tokens with the given overlap.
pub fn token_windows(len: usize, max_tokens: usize, overlap: usize) -> Result<Vec<(usize, usize)>> {
    if max_tokens == 0 {
        return Err(anyhow!("max_tokens must be greater than zero"));
    }
    if overlap >= max_tokens {
        return Err(anyhow!(
            "overlap_tokens ({overlap}) must be smaller than max_tokens ({max_tokens})"
        ));
    }

    let step = max_tokens - overlap;
    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < len {
        let end = (start + max_tokens).min(len);
        windows.push((start, end));
        if end == len {
            break;
        }
        start += step;
    }
    Ok(windows)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// One token per whitespace-separated word; decode joins with spaces.
    pub struct WordTokenizer {
        vocab: std::sync::Mutex<Vec<String>>,
    }

    impl WordTokenizer {
        pub fn new() -> Self {
            Self {
                vocab: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            let mut vocab = self.vocab.lock().unwrap();
            text.split_whitespace()
                .map(|word| {
                    let idx = vocab.iter().position(|w| w == word).unwrap_or_else(|| {
                        vocab.push(word.to_string());
                        vocab.len() - 1
                    });
                    idx as u32
                })
                .collect()
        }

        fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>> {
            let vocab = self.vocab.lock().unwrap();
            tokens
                .iter()
                .map(|t| {
                    vocab
                        .get(*t as usize)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown token {t}"))
                })
                .collect::<Result<Vec<_>>>()
                .map(|words| words.join(" ").into_bytes())
        }
    }

    /// One token per UTF-8 byte, so windows can land inside a character.
    pub struct ByteTokenizer;

    impl Tokenizer for ByteTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            text.bytes().map(u32::from).collect()
        }

        fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>> {
            tokens
                .iter()
                .map(|t| u8::try_from(*t).map_err(|_| anyhow!("token {t} is not a byte")))
                .collect()
        }
    }
}
