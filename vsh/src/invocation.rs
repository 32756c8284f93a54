//! Classified tokens and the command-invocation record built from them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Command(String),
    /// A one-character name is a short flag (`-a`), longer names are long
    /// flags (`--all`).
    Flag(String),
    Option { name: String, value: String },
    Argument(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokenizer = Tokenizer::default();
        match self {
            Self::Command(name) => write!(f, "{}", tokenizer.escape(name)),
            Self::Flag(name) if name.chars().count() == 1 => write!(f, "-{name}"),
            Self::Flag(name) => write!(f, "--{name}"),
            Self::Option { name, value } => write!(f, "--{name}={}", tokenizer.escape(value)),
            Self::Argument(arg) if arg.is_empty() => write!(f, "''"),
            Self::Argument(arg) => write!(f, "{}", tokenizer.escape(arg)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierOptions {
    /// Treat `-abc` as the three flags `a`, `b` and `c` rather than one flag
    /// named `abc`.
    pub cluster_short_flags: bool,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            cluster_short_flags: true,
        }
    }
}

/// One parsed statement. An invocation without a command is empty: a blank
/// line, or a line still waiting for its continuation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    tokens: Vec<Token>,
    command: Option<String>,
    flags: BTreeSet<String>,
    /// Flags that were written as a word of their own, not inside a cluster.
    standalone: BTreeSet<String>,
    options: BTreeMap<String, String>,
    arguments: Vec<String>,
}

impl Invocation {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Classifies raw tokens. The first token is the command.
    #[must_use]
    pub fn classify(raw: Vec<String>, options: ClassifierOptions) -> Self {
        let mut invocation = Self::default();
        let mut raw = raw.into_iter();
        let Some(command) = raw.next() else {
            return invocation;
        };
        invocation.tokens.push(Token::Command(command.clone()));
        invocation.command = Some(command);

        for token in raw {
            invocation.push_classified(token, options);
        }
        invocation
    }

    fn push_classified(&mut self, token: String, options: ClassifierOptions) {
        if let Some(long) = token.strip_prefix("--") {
            if let Some((name, value)) = long.split_once('=') {
                if !name.is_empty() {
                    self.push_option(name.to_string(), value.to_string());
                    return;
                }
            } else if !long.is_empty() {
                self.push_flag(long.to_string(), true);
                return;
            }
        } else if let Some(short) = token.strip_prefix('-') {
            if !short.is_empty() {
                if options.cluster_short_flags {
                    let alone = short.chars().count() == 1;
                    for c in short.chars() {
                        self.push_flag(c.to_string(), alone);
                    }
                } else {
                    self.push_flag(short.to_string(), true);
                }
                return;
            }
        }
        self.push_argument(token);
    }

    fn push_flag(&mut self, name: String, standalone: bool) {
        if standalone {
            self.standalone.insert(name.clone());
        }
        self.flags.insert(name.clone());
        self.tokens.push(Token::Flag(name));
    }

    fn push_option(&mut self, name: String, value: String) {
        self.options.insert(name.clone(), value.clone());
        self.tokens.push(Token::Option { name, value });
    }

    fn push_argument(&mut self, arg: String) {
        self.arguments.push(arg.clone());
        self.tokens.push(Token::Argument(arg));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.command.is_none()
    }

    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[must_use]
    pub const fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    #[must_use]
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    /// True if `name` was given as its own word (`-h`, `--help`), not as
    /// part of a cluster such as `-lh`.
    #[must_use]
    pub fn has_standalone_flag(&self, name: &str) -> bool {
        self.standalone.contains(name)
    }

    /// True if any of `names` was given.
    #[must_use]
    pub fn has_any_flag(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.has_flag(name))
    }

    #[must_use]
    pub const fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(String::as_str)
    }

    /// A copy with the positional arguments replaced. Flags and options are
    /// kept.
    #[must_use]
    pub fn with_arguments(&self, arguments: Vec<String>) -> Self {
        let mut derived = self.clone();
        derived.arguments = arguments;
        derived.rebuild_tokens();
        derived
    }

    /// A copy addressed to another command.
    #[must_use]
    pub fn with_command(&self, command: &str) -> Self {
        let mut derived = self.clone();
        derived.command = Some(command.to_string());
        derived.rebuild_tokens();
        derived
    }

    fn rebuild_tokens(&mut self) {
        self.tokens.clear();
        if let Some(command) = &self.command {
            self.tokens.push(Token::Command(command.clone()));
        }
        self.tokens
            .extend(self.flags.iter().cloned().map(Token::Flag));
        self.tokens.extend(self.options.iter().map(|(name, value)| Token::Option {
            name: name.clone(),
            value: value.clone(),
        }));
        self.tokens
            .extend(self.arguments.iter().cloned().map(Token::Argument));
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> Invocation {
        let tokens = Tokenizer::default().split(line);
        Invocation::classify(tokens, ClassifierOptions::default())
    }

    #[test]
    fn empty_line_has_no_command() {
        let inv = classify("   ");
        assert!(inv.is_empty());
        assert!(inv.tokens().is_empty());
    }

    #[test]
    fn short_flags_cluster() {
        let inv = classify("ls -ab");
        assert_eq!(inv.command(), Some("ls"));
        assert!(inv.has_flag("a"));
        assert!(inv.has_flag("b"));
        assert_eq!(inv.flags().len(), 2);
    }

    #[test]
    fn clustered_flags_are_not_standalone() {
        let inv = classify("ls -lh -a --all");
        assert!(inv.has_flag("h"));
        assert!(!inv.has_standalone_flag("h"));
        assert!(!inv.has_standalone_flag("l"));
        assert!(inv.has_standalone_flag("a"));
        assert!(inv.has_standalone_flag("all"));
    }

    #[test]
    fn clustering_can_be_disabled() {
        let tokens = Tokenizer::default().split("ls -ab");
        let inv = Invocation::classify(
            tokens,
            ClassifierOptions {
                cluster_short_flags: false,
            },
        );
        assert!(inv.has_flag("ab"));
        assert!(!inv.has_flag("a"));
    }

    #[test]
    fn long_flags_and_options() {
        let inv = classify("open --layered --opt=1=2 --empty= file");
        assert!(inv.has_flag("layered"));
        assert_eq!(inv.option("opt"), Some("1=2"));
        assert_eq!(inv.option("empty"), Some(""));
        assert_eq!(inv.arguments(), ["file"]);
    }

    #[test]
    fn last_option_wins() {
        let inv = classify("cmd --x=1 --x=2");
        assert_eq!(inv.option("x"), Some("2"));
        assert_eq!(inv.tokens().len(), 3);
    }

    #[test]
    fn bare_dashes_are_arguments() {
        let inv = classify("cmd - -- --=v");
        assert!(inv.flags().is_empty());
        assert!(inv.options().is_empty());
        assert_eq!(inv.arguments(), ["-", "--", "--=v"]);
    }

    #[test]
    fn duplicate_flags_and_arguments() {
        let inv = classify("cmd a -x a -x");
        assert_eq!(inv.arguments(), ["a", "a"]);
        assert_eq!(inv.flags().len(), 1);
    }

    #[test]
    fn command_token_is_only_first() {
        let inv = classify("echo echo");
        assert_eq!(inv.tokens()[0], Token::Command("echo".to_string()));
        assert_eq!(inv.tokens()[1], Token::Argument("echo".to_string()));
    }

    #[test]
    fn renders_back_to_text() {
        let inv = classify("call 'my script' -v --all --name=a\\ b ''");
        assert_eq!(inv.to_string(), r"call my\ script -v --all --name=a\ b ''");
    }

    #[test]
    fn derived_copies_keep_the_original() {
        let inv = classify("register -f name script.vsh");
        let forwarded = inv.with_command("call").with_arguments(vec!["x".to_string()]);

        assert_eq!(forwarded.command(), Some("call"));
        assert_eq!(forwarded.arguments(), ["x"]);
        assert!(forwarded.has_flag("f"));
        assert_eq!(forwarded.to_string(), "call -f x");
        assert_eq!(inv.arguments(), ["name", "script.vsh"]);
    }
}
