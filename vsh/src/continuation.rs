//! Joining physical lines into logical statements.

use crate::invocation::{ClassifierOptions, Invocation};
use crate::tokenizer::Tokenizer;

/// Accumulates physical lines ending in an unescaped continuation marker.
#[derive(Debug, Clone)]
pub struct ContinuationBuffer {
    marker: char,
    pending: Option<String>,
}

impl Default for ContinuationBuffer {
    fn default() -> Self {
        Self::new('\\')
    }
}

impl ContinuationBuffer {
    #[must_use]
    pub const fn new(marker: char) -> Self {
        Self {
            marker,
            pending: None,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds one physical line. Returns the logical line once it is
    /// complete, or `None` while more input is needed.
    ///
    /// An odd number of trailing markers continues the line; an even number
    /// is a run of escaped markers.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        let trailing = line.chars().rev().take_while(|&c| c == self.marker).count();
        if trailing % 2 == 1 {
            let head = &line[..line.len() - self.marker.len_utf8()];
            self.pending.get_or_insert_with(String::new).push_str(head);
            return None;
        }

        let mut logical = self.pending.take().unwrap_or_default();
        logical.push_str(line);
        Some(logical)
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Tokenizer, classifier and continuation buffer for one engine.
#[derive(Debug, Clone)]
pub struct LineParser {
    tokenizer: Tokenizer,
    classifier: ClassifierOptions,
    buffer: ContinuationBuffer,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(Tokenizer::default(), ClassifierOptions::default())
    }
}

impl LineParser {
    #[must_use]
    pub fn new(tokenizer: Tokenizer, classifier: ClassifierOptions) -> Self {
        let buffer = ContinuationBuffer::new(tokenizer.escape_char().unwrap_or('\\'));
        Self {
            tokenizer,
            classifier,
            buffer,
        }
    }

    #[must_use]
    pub const fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.buffer.is_pending()
    }

    /// Drops any partially accumulated statement.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Parses one physical line. The result is empty while a continuation
    /// is pending.
    pub fn parse(&mut self, line: &str) -> Invocation {
        match self.buffer.feed(line) {
            Some(logical) => Invocation::classify(self.tokenizer.split(&logical), self.classifier),
            None => Invocation::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_continued_lines() {
        let mut buffer = ContinuationBuffer::default();
        assert_eq!(buffer.feed("foo \\"), None);
        assert!(buffer.is_pending());
        assert_eq!(buffer.feed("bar"), Some("foo bar".to_string()));
        assert!(!buffer.is_pending());
    }

    #[test]
    fn even_trailing_escapes_are_literal() {
        let mut buffer = ContinuationBuffer::default();
        assert_eq!(buffer.feed("foo \\\\"), Some("foo \\\\".to_string()));
        assert_eq!(buffer.feed("a\\\\\\"), None);
        assert_eq!(buffer.feed("b"), Some("a\\\\b".to_string()));
    }

    #[test]
    fn many_continuations() {
        let mut buffer = ContinuationBuffer::default();
        assert_eq!(buffer.feed("a\\"), None);
        assert_eq!(buffer.feed("b\\"), None);
        assert_eq!(buffer.feed("\\"), None);
        assert_eq!(buffer.feed("c"), Some("abc".to_string()));
    }

    #[test]
    fn parser_reports_not_ready() {
        let mut parser = LineParser::default();
        assert!(parser.parse("echo one \\").is_empty());
        let inv = parser.parse("two");
        assert_eq!(inv.command(), Some("echo"));
        assert_eq!(inv.arguments(), ["one", "two"]);
        assert!(!parser.is_pending());
    }

    #[test]
    fn parser_reset_drops_pending() {
        let mut parser = LineParser::default();
        assert!(parser.parse("echo lost \\").is_empty());
        parser.reset();
        let inv = parser.parse("pwd");
        assert_eq!(inv.command(), Some("pwd"));
        assert!(inv.arguments().is_empty());
    }

    #[test]
    fn escaped_trailing_backslash_reaches_tokenizer() {
        let mut parser = LineParser::default();
        let inv = parser.parse("echo a\\\\");
        assert_eq!(inv.arguments(), ["a\\"]);
    }
}
