use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fraction of the word at which the optimal recognition point sits
pub const ORP_FRACTION: f64 = 0.35;

/// How the focal region of a word is chosen
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HighlightStrategy {
    FirstLetter,
    FirstTwoLetters,
    FirstHalf,
    #[default]
    OptimalRecognitionPoint,
    NoHighlight,
}

impl HighlightStrategy {
    pub const ALL: [HighlightStrategy; 5] = [
        HighlightStrategy::FirstLetter,
        HighlightStrategy::FirstTwoLetters,
        HighlightStrategy::FirstHalf,
        HighlightStrategy::OptimalRecognitionPoint,
        HighlightStrategy::NoHighlight,
    ];

    /// Next strategy in display order, wrapping around
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Highlighted char range, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Focal region of one word plus the char the word is centered on.
///
/// `span` is `None` when nothing is highlighted; `align_index` is always a
/// valid char index into the word it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightRange {
    pub span: Option<Span>,
    pub align_index: usize,
}

impl HighlightRange {
    fn highlighted(start: usize, end: usize, align_index: usize) -> Self {
        Self {
            span: Some(Span { start, end }),
            align_index,
        }
    }
}

pub fn compute_highlight(word: &str, strategy: HighlightStrategy) -> Result<HighlightRange> {
    let len = word.chars().count();
    if len == 0 {
        return Err(Error::InvalidInput(
            "cannot compute a focal point for an empty word".to_string(),
        ));
    }

    let range = match strategy {
        HighlightStrategy::FirstLetter => HighlightRange::highlighted(0, 1, 0),
        HighlightStrategy::FirstTwoLetters => {
            let end = len.min(2);
            HighlightRange::highlighted(0, end, if end == 2 { 1 } else { 0 })
        }
        HighlightStrategy::FirstHalf => {
            let end = len.div_ceil(2);
            HighlightRange::highlighted(0, end, (end - 1) / 2)
        }
        HighlightStrategy::OptimalRecognitionPoint => {
            let idx = orp_index(len);
            HighlightRange::highlighted(idx, idx + 1, idx)
        }
        HighlightStrategy::NoHighlight => HighlightRange {
            span: None,
            align_index: len / 2,
        },
    };

    Ok(range)
}

/// Char index of the optimal recognition point for a word of `len` chars
pub fn orp_index(len: usize) -> usize {
    if len <= 1 {
        0
    } else {
        ((len as f64 * ORP_FRACTION).ceil() as usize).saturating_sub(1)
    }
}

/// Split a word into (before, focus, after) around its highlighted span.
///
/// Without a span the whole word lands in `before`.
pub fn split_word<'a>(word: &'a str, range: &HighlightRange) -> (&'a str, &'a str, &'a str) {
    let Some(span) = range.span else {
        return (word, "", "");
    };

    let start = byte_offset(word, span.start);
    let end = byte_offset(word, span.end);
    (&word[..start], &word[start..end], &word[end..])
}

fn byte_offset(word: &str, char_idx: usize) -> usize {
    word.char_indices()
        .nth(char_idx)
        .map_or(word.len(), |(offset, _)| offset)
}
