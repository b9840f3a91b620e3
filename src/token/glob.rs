//! Separator-aware glob patterns for host and path scopes.
//!
//! Host patterns are segmented on `.`, path patterns on `/`. A `*` matches
//! any run of characters that does not cross a separator, `**` matches any
//! run including separators, and `?` matches exactly one non-separator
//! character. So `*.example.com` matches `a.example.com` but neither
//! `example.com` nor `a.b.example.com`, while `/**` matches every path
//! under root.

use crate::error::PatternError;

/// Patterns longer than this are rejected at compile time.
const MAX_PATTERN_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    Star,
    DoubleStar,
}

/// A compiled glob pattern bound to one separator character.
#[derive(Debug, Clone)]
pub struct Glob {
    tokens: Vec<Token>,
    separator: char,
}

impl Glob {
    /// Compile `pattern` with the given segment separator.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidPattern`] for empty patterns, runs of
    /// three or more `*`, or oversized patterns.
    pub fn compile(pattern: &str, separator: char) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(invalid(pattern, "pattern is empty"));
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(invalid(pattern, "pattern too long"));
        }

        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    let mut run = 1;
                    while chars.peek() == Some(&'*') {
                        chars.next();
                        run += 1;
                    }
                    match run {
                        1 => tokens.push(Token::Star),
                        2 => tokens.push(Token::DoubleStar),
                        _ => return Err(invalid(pattern, "more than two consecutive wildcards")),
                    }
                }
                '?' => tokens.push(Token::AnyChar),
                _ => tokens.push(Token::Literal(c)),
            }
        }

        Ok(Self { tokens, separator })
    }

    /// Whether `text` matches the pattern.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();
        self.match_from(0, &chars, 0)
    }

    fn match_from(&self, ti: usize, chars: &[char], ci: usize) -> bool {
        let Some(token) = self.tokens.get(ti) else {
            return ci == chars.len();
        };

        match token {
            Token::Literal(expected) => {
                chars.get(ci) == Some(expected) && self.match_from(ti + 1, chars, ci + 1)
            }
            Token::AnyChar => match chars.get(ci) {
                Some(c) if *c != self.separator => self.match_from(ti + 1, chars, ci + 1),
                _ => false,
            },
            Token::Star => {
                // Zero or more characters, stopping at the separator.
                let mut i = ci;
                loop {
                    if self.match_from(ti + 1, chars, i) {
                        return true;
                    }
                    match chars.get(i) {
                        Some(c) if *c != self.separator => i += 1,
                        _ => return false,
                    }
                }
            }
            Token::DoubleStar => {
                let mut i = ci;
                loop {
                    if self.match_from(ti + 1, chars, i) {
                        return true;
                    }
                    if i < chars.len() {
                        i += 1;
                    } else {
                        return false;
                    }
                }
            }
        }
    }
}

fn invalid(pattern: &str, reason: &str) -> PatternError {
    PatternError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}
