// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token counting for budget decisions.

use std::sync::Arc;

use recollect_config::model::TokenizerKind;
use recollect_core::RecollectError;
use tiktoken_rs::CoreBPE;

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn name(&self) -> &'static str;
}

/// Exact counts with the `cl100k_base` encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn cl100k() -> Result<Self, RecollectError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RecollectError::Internal(format!("failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &'static str {
        "cl100k"
    }
}

/// Roughly four characters per token, never zero for non-empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

pub fn counter_for(kind: TokenizerKind) -> Result<Arc<dyn TokenCounter>, RecollectError> {
    Ok(match kind {
        TokenizerKind::Cl100k => Arc::new(TiktokenCounter::cl100k()?),
        TokenizerKind::Heuristic => Arc::new(HeuristicCounter),
    })
}

/// Longest prefix of `text` that costs at most `max_tokens`, with trailing
/// whitespace removed. Cuts only on char boundaries.
pub fn truncate_to_tokens<'a>(counter: &dyn TokenCounter, text: &'a str, max_tokens: usize) -> &'a str {
    if counter.count(text) <= max_tokens {
        return text;
    }
    if max_tokens == 0 {
        return "";
    }

    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    // boundaries[lo] always fits (the empty prefix); boundaries[hi] never does.
    let (mut lo, mut hi) = (0usize, boundaries.len());
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if counter.count(&text[..boundaries[mid]]) <= max_tokens {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    // BPE counts are not strictly monotone in prefix length.
    let mut end = lo;
    while end > 0 && counter.count(text[..boundaries[end]].trim_end()) > max_tokens {
        end -= 1;
    }
    text[..boundaries[end]].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_rounds_up() {
        let counter = HeuristicCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abc"), 1);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
        assert_eq!(counter.count("日本語です"), 2);
    }

    #[test]
    fn tiktoken_counts_words() {
        let counter = TiktokenCounter::cl100k().unwrap();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("hello world"), 2);
    }

    #[test]
    fn truncation_fits_and_respects_char_boundaries() {
        let counter = HeuristicCounter;
        let text = "héllo wörld, this is a longer sentence";
        let cut = truncate_to_tokens(&counter, text, 3);
        assert!(counter.count(cut) <= 3);
        assert!(text.starts_with(cut));
        assert!(!cut.is_empty());

        assert_eq!(truncate_to_tokens(&counter, text, 100), text);
        assert_eq!(truncate_to_tokens(&counter, text, 0), "");
    }

    #[test]
    fn tiktoken_truncation_fits() {
        let counter = TiktokenCounter::cl100k().unwrap();
        let text = "The user prefers oat milk in their coffee and dislikes sugar.";
        let cut = truncate_to_tokens(&counter, text, 5);
        assert!(counter.count(cut) <= 5);
        assert!(cut.len() < text.len());
    }
}
