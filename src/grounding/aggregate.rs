//! Token probabilities to word probabilities via per-character accounting.

use crate::error::{GroundingError, Result};
use crate::grounding::span::CharSpan;

/// Spread token probabilities over the characters of a caption.
///
/// Every character covered by a token's span takes that token's probability;
/// a later token overwrites an earlier one on shared characters. Tokens with
/// no span are skipped, and characters no token covers stay at 0. Spans
/// reaching past `caption_len` are clipped.
pub fn char_probabilities<F>(caption_len: usize, token_probs: &[f32], token_to_chars: F) -> Vec<f32>
where
    F: Fn(usize) -> Option<CharSpan>,
{
    let mut probs = vec![0.0; caption_len];
    for (token, &prob) in token_probs.iter().enumerate() {
        let Some(span) = token_to_chars(token) else {
            continue;
        };
        let end = span.end.min(caption_len);
        let start = span.start.min(end);
        probs[start..end].fill(prob);
    }
    probs
}

/// One probability per word: the maximum character probability over the
/// word's span.
///
/// Words are laid out back to back from character 0, each spanning its
/// length in characters. An empty word gets 0.
pub fn word_probabilities<F>(
    caption_len: usize,
    token_probs: &[f32],
    token_to_chars: F,
    word_lens: &[usize],
) -> Result<Vec<f32>>
where
    F: Fn(usize) -> Option<CharSpan>,
{
    let total: usize = word_lens.iter().sum();
    if total != caption_len {
        return Err(GroundingError::LengthMismatch {
            caption: caption_len,
            words: total,
        });
    }

    let char_probs = char_probabilities(caption_len, token_probs, token_to_chars);

    let mut span = CharSpan::default();
    Ok(word_lens
        .iter()
        .map(|&len| {
            span = CharSpan::new(span.end, span.end + len);
            char_probs[span.range()]
                .iter()
                .copied()
                .reduce(f32::max)
                .unwrap_or(0.0)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::span::TokenSpans;

    fn spans(raw: &[Option<(usize, usize)>]) -> TokenSpans {
        raw.iter()
            .map(|s| s.map(|(start, end)| CharSpan::new(start, end)))
            .collect()
    }

    #[test]
    fn test_abcde_scenario() {
        let table = spans(&[Some((0, 2)), Some((2, 4)), Some((4, 5))]);
        let probs = [0.9, 0.3, 0.1];

        let chars = char_probabilities(5, &probs, |t| table.token_to_chars(t));
        assert_eq!(chars, vec![0.9, 0.9, 0.3, 0.3, 0.1]);

        let words = word_probabilities(5, &probs, |t| table.token_to_chars(t), &[2, 3]).unwrap();
        assert_eq!(words, vec![0.9, 0.3]);
    }

    #[test]
    fn test_special_tokens_are_skipped() {
        let with_markers = spans(&[None, Some((0, 2)), Some((2, 5)), None]);
        let probs = [0.99, 0.4, 0.6, 0.99];
        let words =
            word_probabilities(5, &probs, |t| with_markers.token_to_chars(t), &[2, 3]).unwrap();
        assert_eq!(words, vec![0.4, 0.6]);
    }

    #[test]
    fn test_single_covering_token_reaches_every_word() {
        let table = spans(&[None, Some((0, 7)), None, None]);
        let probs = [0.1, 0.42, 0.8, 0.5];
        let words =
            word_probabilities(7, &probs, |t| table.token_to_chars(t), &[1, 4, 2]).unwrap();
        assert_eq!(words, vec![0.42, 0.42, 0.42]);
    }

    #[test]
    fn test_uncovered_word_is_zero() {
        let table = spans(&[Some((0, 2))]);
        let words = word_probabilities(5, &[0.7], |t| table.token_to_chars(t), &[2, 3]).unwrap();
        assert_eq!(words, vec![0.7, 0.0]);
    }

    #[test]
    fn test_last_write_wins_on_overlap() {
        let table = spans(&[Some((0, 4)), Some((2, 4))]);
        let chars = char_probabilities(4, &[0.8, 0.2], |t| table.token_to_chars(t));
        assert_eq!(chars, vec![0.8, 0.8, 0.2, 0.2]);
    }

    #[test]
    fn test_empty_word_is_zero() {
        let table = spans(&[Some((0, 3))]);
        let words = word_probabilities(3, &[0.5], |t| table.token_to_chars(t), &[0, 3]).unwrap();
        assert_eq!(words, vec![0.0, 0.5]);
    }

    #[test]
    fn test_span_past_caption_is_clipped() {
        let table = spans(&[Some((1, 10))]);
        let chars = char_probabilities(3, &[0.5], |t| table.token_to_chars(t));
        assert_eq!(chars, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = word_probabilities(5, &[], |_| None, &[2, 1]).unwrap_err();
        assert!(matches!(
            err,
            GroundingError::LengthMismatch {
                caption: 5,
                words: 3
            }
        ));
    }
}
