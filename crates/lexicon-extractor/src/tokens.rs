//! Whitespace tokenizer shared by the normalizer and the gazetteer tagger

/// A whitespace-delimited token with surrounding punctuation trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token text as it appears in the source
    pub text: &'a str,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// Whether trimmed trailing punctuation ends a phrase (",", ";", ...)
    pub closes_phrase: bool,
}

impl Token<'_> {
    /// Case- and period-insensitive key used for rule matching
    pub fn key(&self) -> String {
        match_key(self.text)
    }

    /// Whether the token starts with an uppercase letter
    pub fn is_capitalized(&self) -> bool {
        self.text.chars().next().is_some_and(char::is_uppercase)
    }

    /// Whether the token overlaps the byte range `start..end`
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Normalize a token or pattern word for matching: lowercase, periods removed
pub fn match_key(word: &str) -> String {
    word.chars()
        .filter(|c| *c != '.')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split `source` on whitespace and trim punctuation from each piece
///
/// Internal punctuation is kept ("S.H", "Ph.D"). Pieces that are pure
/// punctuation produce no token.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    for piece in source.split_whitespace() {
        // split_whitespace yields pieces in order, so searching forward from
        // the previous end finds this piece's position.
        let Some(rel) = source[offset..].find(piece) else {
            continue;
        };
        let piece_start = offset + rel;
        offset = piece_start + piece.len();

        let trimmed_front = piece.trim_start_matches(|c: char| !c.is_alphanumeric());
        let lead = piece.len() - trimmed_front.len();
        let trimmed = trimmed_front.trim_end_matches(|c: char| !c.is_alphanumeric());
        if trimmed.is_empty() {
            continue;
        }

        let tail = &trimmed_front[trimmed.len()..];
        // Periods are ambiguous ("Dr." vs. a sentence end) and never close
        let closes_phrase = tail
            .chars()
            .any(|c| matches!(c, ',' | ';' | ':' | '!' | '?' | ')' | '"'));

        let start = piece_start + lead;
        tokens.push(Token {
            text: trimmed,
            start,
            end: start + trimmed.len(),
            closes_phrase,
        });
    }

    tokens
}
