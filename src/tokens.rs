use std::slice::Chunks;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::{InsightsError, Result};

/// Token accounting used to size prompts against model context limits.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Splits `text` into consecutive windows of at most `chunk_size` tokens,
    /// each decoded back to text. Empty input yields no chunks.
    fn split_into_chunks(&self, text: &str, chunk_size: usize) -> Result<Vec<String>>;
}

/// Partitions a token sequence into contiguous windows; only the last may be short.
pub fn token_windows<T>(tokens: &[T], chunk_size: usize) -> Result<Chunks<'_, T>> {
    if chunk_size == 0 {
        return Err(InsightsError::InvalidInput(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    Ok(tokens.chunks(chunk_size))
}

/// cl100k_base byte-pair encoder.
#[derive(Clone)]
pub struct BpeTokenCounter {
    bpe: Arc<CoreBPE>,
}

impl BpeTokenCounter {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|err| {
            InsightsError::Internal(format!("failed to load cl100k_base tokenizer: {err}"))
        })?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    /// Decodes a window on its own. A window edge that cuts a multi-byte
    /// character yields U+FFFD instead of an error.
    pub fn decode_lossy(&self, tokens: &[u32]) -> String {
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    fn split_into_chunks(&self, text: &str, chunk_size: usize) -> Result<Vec<String>> {
        let tokens = self.encode(text);
        tracing::info!(
            "splitting {} tokens into chunks of {} tokens",
            tokens.len(),
            chunk_size
        );

        let mut chunks = Vec::new();
        for window in token_windows(&tokens, chunk_size)? {
            chunks.push(self.decode_lossy(window));
            tracing::debug!("created chunk {}: {} tokens", chunks.len(), window.len());
        }

        tracing::info!("total chunks created: {}", chunks.len());
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> BpeTokenCounter {
        BpeTokenCounter::cl100k().unwrap()
    }

    #[test]
    fn windows_cover_sequence_without_gaps_or_overlap() {
        let tokens: Vec<u32> = (0..1_037).collect();
        for size in [1usize, 7, 100, 1_036, 1_037, 5_000] {
            let windows: Vec<&[u32]> = token_windows(&tokens, size).unwrap().collect();
            assert_eq!(windows.len(), tokens.len().div_ceil(size));
            let (last, rest) = windows.split_last().unwrap();
            assert!(rest.iter().all(|w| w.len() == size));
            assert!(last.len() <= size && !last.is_empty());
            assert_eq!(windows.concat(), tokens);
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = token_windows(&[1u32, 2, 3], 0).unwrap_err();
        assert_eq!(err.category(), "invalid_input");
        assert!(counter().split_into_chunks("hello", 0).is_err());
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let counter = counter();
        assert_eq!(counter.count(""), 0);
        assert!(counter.split_into_chunks("", 10).unwrap().is_empty());
    }

    #[test]
    fn non_empty_text_yields_at_least_one_chunk() {
        let chunks = counter().split_into_chunks("hi", 50_000).unwrap();
        assert_eq!(chunks, vec!["hi".to_string()]);
    }

    #[test]
    fn chunk_token_sequences_reassemble_original() {
        let counter = counter();
        let text = "Suspect A called suspect B at 21:04 about the shipment. ".repeat(40);
        let tokens = counter.encode(&text);
        let chunks = counter.split_into_chunks(&text, 37).unwrap();

        assert_eq!(chunks.len(), tokens.len().div_ceil(37));
        assert_eq!(chunks.concat(), text);

        let rebuilt: Vec<u32> = token_windows(&tokens, 37)
            .unwrap()
            .flat_map(|w| w.iter().copied())
            .collect();
        assert_eq!(rebuilt, tokens);
    }

    #[test]
    fn count_is_stable_across_calls() {
        let counter = counter();
        let text = "Transfer 5,000 to the offshore account tonight.";
        assert_eq!(counter.count(text), counter.count(text));
        assert!(counter.count(text) > 0);
    }

    #[test]
    fn split_multibyte_characters_decode_lossily() {
        let counter = counter();
        let text = "证据链 🔒 證據";
        let chunks = counter.split_into_chunks(text, 1).unwrap();
        assert_eq!(chunks.len(), counter.count(text));
    }

    #[test]
    fn decode_window_that_cuts_a_character_is_lossy() {
        let counter = counter();
        let tokens = counter.encode("🔒 sealed");
        assert_eq!(counter.decode_lossy(&tokens), "🔒 sealed");

        let first = counter.decode_lossy(&tokens[..1]);
        if first != "🔒" {
            assert!(first.contains('\u{FFFD}'));
        }
    }
}
