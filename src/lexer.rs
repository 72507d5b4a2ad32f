//! Splitting a command line into whitespace-delimited tokens.
//!
//! The lexer knows nothing about operators: `<`, `>` and `|` come out as
//! ordinary tokens when they are surrounded by whitespace, and it is up to
//! [`crate::redirect`] and [`crate::pipeline`] to give them meaning.

use crate::config::Limits;
use crate::error::ShellError;

pub(crate) fn is_delimiter(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n')
}

/// Returns true when the line has nothing to execute.
pub fn is_blank(line: &str) -> bool {
    line.trim_matches(is_delimiter).is_empty()
}

/// Iterator over the tokens of one line.
///
/// Yields owned, non-empty tokens in input order; `None` marks the end of
/// the line. Once a token trips the length limit the error is yielded and the
/// iterator is exhausted.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
    max_len: Option<usize>,
}

impl<'a> Tokens<'a> {
    pub fn new(line: &'a str, limits: &Limits) -> Self {
        Tokens {
            rest: line,
            max_len: limits.max_token_len,
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Result<String, ShellError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.rest.trim_start_matches(is_delimiter);
        if start.is_empty() {
            self.rest = start;
            return None;
        }

        let end = start.find(is_delimiter).unwrap_or(start.len());
        let (token, rest) = start.split_at(end);
        self.rest = rest;

        if let Some(max) = self.max_len {
            if token.len() > max {
                self.rest = "";
                return Some(Err(ShellError::TokenTooLong {
                    len: token.len(),
                    max,
                }));
            }
        }
        Some(Ok(token.to_string()))
    }
}

/// Collects every token of `line`, failing on the first oversized one.
///
/// An empty or all-whitespace line yields an empty vector.
pub fn tokenize(line: &str, limits: &Limits) -> Result<Vec<String>, ShellError> {
    Tokens::new(line, limits).collect()
}
