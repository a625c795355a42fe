use crate::error::{Error, Result};

/// Characters that make the reader linger on a word.
pub const PAUSE_PUNCTUATION: [char; 5] = ['.', ',', ';', '?', '!'];

/// One display unit: a whitespace-delimited run of the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub original_index: usize,
    pub has_trailing_punctuation: bool,
}

impl Token {
    pub fn new(text: impl Into<String>, original_index: usize) -> Self {
        let text = text.into();
        let has_trailing_punctuation = text
            .chars()
            .last()
            .is_some_and(|c| PAUSE_PUNCTUATION.contains(&c));

        Self {
            text,
            original_index,
            has_trailing_punctuation,
        }
    }

    /// Length in chars, which is what pacing and highlighting count
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split raw text into display tokens, keeping every character verbatim.
///
/// Fails with [`Error::EmptyInput`] when the text holds no words, so callers
/// never hand an empty sequence to the scheduler.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let tokens: Vec<Token> = text
        .split_whitespace()
        .enumerate()
        .map(|(idx, piece)| Token::new(piece, idx))
        .collect();

    if tokens.is_empty() {
        return Err(Error::EmptyInput);
    }

    Ok(tokens)
}
