use serde::{Deserialize, Serialize};

use crate::error::{GroundingError, Result};
use crate::grounding::aggregate::word_probabilities;
use crate::grounding::span::TokenSpans;

/// A caption together with its segmentation into words.
///
/// Words are stored in caption order and concatenate to the caption text,
/// so word `i` covers the characters right after word `i - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    doc_id: String,
    text: String,
    words: Vec<String>,
}

impl Caption {
    /// Build a caption from its words; the text is their concatenation.
    pub fn new(doc_id: impl Into<String>, words: Vec<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: words.concat(),
            words,
        }
    }

    /// Segment raw text into alternating runs of whitespace and
    /// non-whitespace characters.
    ///
    /// Whitespace runs stay in the word list so the words still cover the
    /// whole caption.
    pub fn from_text(doc_id: impl Into<String>, text: &str) -> Self {
        let mut words: Vec<String> = Vec::new();
        let mut last_is_space = None;
        for c in text.chars() {
            let is_space = c.is_whitespace();
            if last_is_space == Some(is_space) {
                if let Some(word) = words.last_mut() {
                    word.push(c);
                }
            } else {
                words.push(c.to_string());
            }
            last_is_space = Some(is_space);
        }
        Self::new(doc_id, words)
    }

    /// Parse Juman++ analyzer output.
    ///
    /// Each morpheme line starts with its surface form. `EOS` closes a
    /// sentence, `@` lines are alternative analyses and are ignored, and the
    /// first `# S-ID:` comment names the document.
    pub fn from_jumanpp(input: &str) -> Result<Self> {
        let mut doc_id = None;
        let mut words = Vec::new();

        for line in input.lines() {
            if let Some(comment) = line.strip_prefix('#') {
                if doc_id.is_none() {
                    doc_id = parse_sentence_id(comment).map(document_id);
                }
                continue;
            }
            if line.is_empty() || line == "EOS" || is_alternative(line) {
                continue;
            }
            let surface = line.split(' ').next().unwrap_or_default();
            if surface.is_empty() {
                return Err(GroundingError::InvalidCaption(format!(
                    "morpheme line without surface form: {line:?}"
                )));
            }
            words.push(decode_surface(surface));
        }

        if words.is_empty() {
            return Err(GroundingError::InvalidCaption(
                "Juman++ input contains no morphemes".to_owned(),
            ));
        }
        Ok(Self::new(doc_id.unwrap_or_default(), words))
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Caption length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Length of each word in characters.
    pub fn word_lens(&self) -> Vec<usize> {
        self.words.iter().map(|w| w.chars().count()).collect()
    }

    /// Aggregate one candidate's token probabilities onto this caption's words.
    pub fn word_probabilities(&self, token_probs: &[f32], spans: &TokenSpans) -> Result<Vec<f32>> {
        word_probabilities(
            self.char_len(),
            token_probs,
            |token| spans.token_to_chars(token),
            &self.word_lens(),
        )
    }
}

// A morpheme line carries the numeric part-of-speech id in its fifth field.
// An alternative analysis is a whole morpheme line behind "@ ", which moves
// that id one field right; a plain "@" morpheme keeps it in place.
fn is_alternative(line: &str) -> bool {
    line.starts_with("@ ")
        && line
            .split(' ')
            .nth(4)
            .is_none_or(|field| field.parse::<u32>().is_err())
}

fn parse_sentence_id(comment: &str) -> Option<&str> {
    comment
        .split_whitespace()
        .find_map(|field| field.strip_prefix("S-ID:"))
}

// "w201106-0000060050-1" names sentence 1 of document "w201106-0000060050"
fn document_id(sentence_id: &str) -> String {
    match sentence_id.rsplit_once('-') {
        Some((doc, _)) => doc.to_owned(),
        None => sentence_id.to_owned(),
    }
}

fn decode_surface(surface: &str) -> String {
    match surface {
        "\\␣" => " ".to_owned(),
        _ => surface.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUMANPP: &str = "\
# S-ID:w201106-0000060050-1 JUMAN:2.0.0-rc3
庭 にわ 庭 名詞 6 普通名詞 1 * 0 * 0 \"代表表記:庭/にわ カテゴリ:場所-施設\"
に に に 助詞 9 格助詞 1 * 0 * 0 NIL
@ に に に 助詞 9 副助詞 2 * 0 * 0 NIL
\\␣ \\␣ \\␣ 特殊 1 空白 6 * 0 * 0 NIL
立つ たつ 立つ 動詞 2 * 0 子音動詞タ行 6 基本形 2 \"代表表記:立つ/たつ\"
EOS
";

    #[test]
    fn test_new_concatenates_words() {
        let caption = Caption::new("d1", vec!["AB".into(), "CDE".into()]);
        assert_eq!(caption.text(), "ABCDE");
        assert_eq!(caption.char_len(), 5);
        assert_eq!(caption.word_lens(), vec![2, 3]);
    }

    #[test]
    fn test_from_text_keeps_whitespace_runs() {
        let caption = Caption::from_text("", "5 people  each");
        assert_eq!(caption.words(), ["5", " ", "people", "  ", "each"]);
        assert_eq!(caption.text(), "5 people  each");
        assert_eq!(caption.word_lens().iter().sum::<usize>(), caption.char_len());
    }

    #[test]
    fn test_from_text_empty() {
        let caption = Caption::from_text("", "");
        assert!(caption.words().is_empty());
        assert_eq!(caption.char_len(), 0);
    }

    #[test]
    fn test_from_jumanpp() {
        let caption = Caption::from_jumanpp(JUMANPP).unwrap();
        assert_eq!(caption.doc_id(), "w201106-0000060050");
        assert_eq!(caption.words(), ["庭", "に", " ", "立つ"]);
        assert_eq!(caption.text(), "庭に 立つ");
        assert_eq!(caption.char_len(), 5);
    }

    #[test]
    fn test_from_jumanpp_keeps_at_sign_morpheme() {
        let input = "\
メール めーる メール 名詞 6 普通名詞 1 * 0 * 0 \"代表表記:メール/めーる カテゴリ:人工物-その他\"
@ @ @ 特殊 1 記号 5 * 0 * 0 NIL
@ @ @ @ 特殊 1 括弧始 3 * 0 * 0 NIL
例 れい 例 名詞 6 普通名詞 1 * 0 * 0 \"代表表記:例/れい カテゴリ:抽象物\"
EOS
";
        let caption = Caption::from_jumanpp(input).unwrap();
        assert_eq!(caption.words(), ["メール", "@", "例"]);
        assert_eq!(caption.text(), "メール@例");
    }

    #[test]
    fn test_from_jumanpp_without_sentence_id() {
        let caption = Caption::from_jumanpp("犬 いぬ 犬 名詞 6 普通名詞 1 * 0 * 0 NIL\nEOS\n").unwrap();
        assert_eq!(caption.doc_id(), "");
        assert_eq!(caption.words(), ["犬"]);
    }

    #[test]
    fn test_from_jumanpp_rejects_empty() {
        assert!(matches!(
            Caption::from_jumanpp("# S-ID:1\nEOS\n"),
            Err(GroundingError::InvalidCaption(_))
        ));
    }

    #[test]
    fn test_multibyte_word_probabilities() {
        let caption = Caption::new("", vec!["庭".into(), "に".into(), "立つ".into()]);
        let spans = TokenSpans::from_byte_offsets(
            caption.text(),
            &[(0, 0), (0, 3), (3, 6), (6, 9), (9, 12), (0, 0)],
        )
        .unwrap();
        let probs = caption
            .word_probabilities(&[0.0, 0.9, 0.05, 0.2, 0.6, 0.0], &spans)
            .unwrap();
        assert_eq!(probs, vec![0.9, 0.05, 0.6]);
    }
}
