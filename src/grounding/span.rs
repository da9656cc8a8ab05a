use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{GroundingError, Result};

/// Half-open interval `[start, end)` of character indices in a caption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    /// Create a span; an `end` before `start` collapses to an empty span at `start`.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Character span of every token of an encoded caption.
///
/// Tokens without text (sequence markers, padding) have no span. Lookups
/// past the end of the table also yield `None`, since detector logits are
/// usually wider than the encoded caption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSpans(Vec<Option<CharSpan>>);

impl TokenSpans {
    pub fn new(spans: Vec<Option<CharSpan>>) -> Self {
        Self(spans)
    }

    /// Build the table from tokenizer byte offsets into `text`.
    ///
    /// Follows the Hugging Face tokenizers convention where `(0, 0)` marks a
    /// special token. Byte offsets are converted to character offsets.
    pub fn from_byte_offsets(text: &str, offsets: &[(usize, usize)]) -> Result<Self> {
        let mut char_at_byte = vec![None; text.len() + 1];
        let mut chars = 0;
        for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
            char_at_byte[byte_idx] = Some(char_idx);
            chars = char_idx + 1;
        }
        char_at_byte[text.len()] = Some(chars);

        let to_char = |offset: usize| {
            char_at_byte
                .get(offset)
                .copied()
                .flatten()
                .ok_or(GroundingError::InvalidTokenOffset { offset })
        };

        offsets
            .iter()
            .map(|&(start, end)| {
                if start == 0 && end == 0 {
                    return Ok(None);
                }
                Ok(Some(CharSpan::new(to_char(start)?, to_char(end)?)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Character span of token `token`, if it covers any text.
    #[inline]
    pub fn token_to_chars(&self, token: usize) -> Option<CharSpan> {
        self.0.get(token).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Option<CharSpan>> for TokenSpans {
    fn from_iter<T: IntoIterator<Item = Option<CharSpan>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_span_basics() {
        let span = CharSpan::new(2, 5);
        assert_eq!(span.len(), 3);
        assert_eq!(span.range(), 2..5);
        assert!(!span.is_empty());
        assert!(CharSpan::new(4, 1).is_empty());
    }

    #[test]
    fn test_lookup_out_of_range_is_none() {
        let spans = TokenSpans::new(vec![None, Some(CharSpan::new(0, 3)), None]);
        assert_eq!(spans.token_to_chars(0), None);
        assert_eq!(spans.token_to_chars(1), Some(CharSpan::new(0, 3)));
        assert_eq!(spans.token_to_chars(10), None);
    }

    #[test]
    fn test_from_byte_offsets_ascii() {
        let spans =
            TokenSpans::from_byte_offsets("an umbrella", &[(0, 0), (0, 2), (3, 11), (0, 0)])
                .unwrap();
        assert_eq!(spans.len(), 4);
        assert_eq!(spans.token_to_chars(0), None);
        assert_eq!(spans.token_to_chars(1), Some(CharSpan::new(0, 2)));
        assert_eq!(spans.token_to_chars(2), Some(CharSpan::new(3, 11)));
        assert_eq!(spans.token_to_chars(3), None);
    }

    #[test]
    fn test_from_byte_offsets_multibyte() {
        // "庭に" is 6 bytes, 2 characters
        let spans = TokenSpans::from_byte_offsets("庭に", &[(0, 3), (3, 6)]).unwrap();
        assert_eq!(spans.token_to_chars(0), Some(CharSpan::new(0, 1)));
        assert_eq!(spans.token_to_chars(1), Some(CharSpan::new(1, 2)));
    }

    #[test]
    fn test_from_byte_offsets_rejects_mid_character() {
        let err = TokenSpans::from_byte_offsets("庭に", &[(0, 2)]).unwrap_err();
        assert!(matches!(err, GroundingError::InvalidTokenOffset { offset: 2 }));
        let err = TokenSpans::from_byte_offsets("ab", &[(1, 9)]).unwrap_err();
        assert!(matches!(err, GroundingError::InvalidTokenOffset { offset: 9 }));
    }
}
