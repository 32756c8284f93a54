//! Quote- and escape-aware line splitting.

use std::ops::Range;

use chumsky::prelude::*;
use chumsky::BoxedParser;
use tracing::debug;

type Segment = BoxedParser<'static, char, String, Simple<char>>;

const BACKSPACE: char = '\x08';
const DELETE: char = '\x7f';

/// Splits raw lines into unquoted, unescaped tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    delimiters: String,
    quotes: String,
    escapes: String,
    keep_literal: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            delimiters: " \t\r\n\x0c".to_string(),
            quotes: "'\"".to_string(),
            escapes: "\\".to_string(),
            keep_literal: false,
        }
    }
}

impl Tokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delimiters(mut self, delimiters: &str) -> Self {
        self.delimiters = delimiters.to_string();
        self
    }

    #[must_use]
    pub fn with_quotes(mut self, quotes: &str) -> Self {
        self.quotes = quotes.to_string();
        self
    }

    #[must_use]
    pub fn with_escapes(mut self, escapes: &str) -> Self {
        self.escapes = escapes.to_string();
        self
    }

    /// Keep escape characters in the produced tokens.
    #[must_use]
    pub const fn keep_literal(mut self, keep: bool) -> Self {
        self.keep_literal = keep;
        self
    }

    /// The escape character used by [`escape`](Self::escape) and for line
    /// continuation.
    #[must_use]
    pub fn escape_char(&self) -> Option<char> {
        self.escapes.chars().next()
    }

    fn is_delimiter(&self, c: char) -> bool {
        self.delimiters.contains(c)
    }

    fn is_quote(&self, c: char) -> bool {
        self.quotes.contains(c)
    }

    fn is_escape(&self, c: char) -> bool {
        self.escapes.contains(c)
    }

    /// Splits `line` into tokens.
    ///
    /// Backspace and delete characters erase the character before them
    /// before any splitting happens. An unterminated quote runs to the end
    /// of the line.
    #[must_use]
    pub fn split(&self, line: &str) -> Vec<String> {
        let line = erase_controls(line);
        self.scan(&line).into_iter().map(|(_, word)| word).collect()
    }

    /// Prefixes every delimiter, quote and escape character with the escape
    /// character.
    #[must_use]
    pub fn escape(&self, s: &str) -> String {
        let Some(escape) = self.escape_char() else {
            return s.to_string();
        };
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if self.is_delimiter(c) || self.is_quote(c) || self.is_escape(c) {
                out.push(escape);
            }
            out.push(c);
        }
        out
    }

    /// Strips quotes and escapes without splitting.
    #[must_use]
    pub fn unescape(&self, s: &str) -> String {
        self.word(false)
            .or_not()
            .then_ignore(end())
            .parse(s)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Returns the byte offset where the last word of `line` starts and the
    /// word itself, unquoted and unescaped. An open quote makes the rest of
    /// the line one word.
    #[must_use]
    pub fn completion_word(&self, line: &str) -> (usize, String) {
        let chars = line.chars().count();
        match self.scan(line).pop() {
            Some((span, word)) if span.end == chars => {
                let start = line
                    .char_indices()
                    .nth(span.start)
                    .map_or(line.len(), |(i, _)| i);
                (start, word)
            }
            _ => (line.len(), String::new()),
        }
    }

    /// Every word of `line` with its span in characters.
    fn scan(&self, line: &str) -> Vec<(Range<usize>, String)> {
        let delimiters = || one_of(self.delimiters.clone()).repeated();
        delimiters()
            .ignore_then(
                self.word(true)
                    .map_with_span(|word, span| (span, word))
                    .then_ignore(delimiters())
                    .repeated(),
            )
            .then_ignore(end())
            .parse(line)
            .unwrap_or_else(|errors| {
                debug!(?errors, "line not tokenized");
                Vec::new()
            })
    }

    /// Adjacent escaped, quoted and bare segments form one word. Delimiters
    /// are ordinary characters unless `splitting`.
    fn word(&self, splitting: bool) -> Segment {
        let special = if splitting {
            format!("{}{}{}", self.delimiters, self.quotes, self.escapes)
        } else {
            format!("{}{}", self.quotes, self.escapes)
        };
        let bare = none_of(special).map(String::from);

        self.escaped()
            .or(self.quoted())
            .or(bare)
            .repeated()
            .at_least(1)
            .map(|parts: Vec<String>| parts.concat())
            .boxed()
    }

    /// An escape and the character after it. A dangling escape at the end of
    /// input stands for itself.
    fn escaped(&self) -> Segment {
        let keep = self.keep_literal;
        let pair = one_of(self.escapes.clone())
            .then(any())
            .map(move |(escape, c): (char, char)| {
                if keep {
                    format!("{escape}{c}")
                } else {
                    c.to_string()
                }
            });
        let dangling = one_of(self.escapes.clone())
            .then_ignore(end())
            .map(String::from);
        pair.or(dangling).boxed()
    }

    /// Text between a quote and the next copy of the same quote. Escapes
    /// still apply inside.
    fn quoted(&self) -> Segment {
        self.quotes
            .chars()
            .map(|quote| {
                just(quote)
                    .ignore_then(
                        self.escaped()
                            .or(filter(move |c: &char| *c != quote).map(String::from))
                            .repeated(),
                    )
                    .then_ignore(just(quote).ignored().or(end()))
                    .map(|parts: Vec<String>| parts.concat())
                    .boxed()
            })
            .reduce(|first, next| first.or(next).boxed())
            .unwrap_or_else(|| filter(|_: &char| false).map(String::from).boxed())
    }
}

/// Applies backspace and delete characters to the preceding text.
fn erase_controls(line: &str) -> String {
    if !line.contains([BACKSPACE, DELETE]) {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if c == BACKSPACE || c == DELETE {
            out.pop();
        } else {
            out.push(c);
        }
    }
    out
}
