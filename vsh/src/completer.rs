use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use vsh::registry::{self, SharedRegistry};
use vsh::Tokenizer;
use vsh_core::{Node, RootId};

/// Completes command names and, while the session is on the base root,
/// folder entries read straight from the host.
pub struct VshHelper {
    registry: SharedRegistry,
    cwd: Arc<RwLock<Node>>,
    base: RootId,
    host_root: PathBuf,
    tokenizer: Tokenizer,
}

impl VshHelper {
    pub fn new(
        registry: SharedRegistry,
        cwd: Arc<RwLock<Node>>,
        base: RootId,
        host_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            cwd,
            base,
            host_root,
            tokenizer: Tokenizer::default(),
        }
    }

    fn complete_path(&self, word: &str) -> Vec<Pair> {
        let cwd = self.cwd.read().unwrap_or_else(PoisonError::into_inner).clone();
        if cwd.root_id() != self.base {
            return Vec::new();
        }

        let (dir, partial) = match word.rfind('/') {
            Some(i) => (&word[..=i], &word[i + 1..]),
            None => ("", word),
        };
        let folder = cwd.join(dir);
        let host_dir = self.host_root.join(folder.path().trim_start_matches('/'));
        let Ok(entries) = std::fs::read_dir(host_dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with(partial) || (name.starts_with('.') && !partial.starts_with('.'))
                {
                    return None;
                }
                let is_dir = entry.file_type().is_ok_and(|ft| ft.is_dir());
                Some(if is_dir { format!("{name}/") } else { name })
            })
            .collect();
        names.sort();

        names
            .into_iter()
            .map(|name| Pair {
                replacement: self.tokenizer.escape(&format!("{dir}{name}")),
                display: name,
            })
            .collect()
    }
}

/// Registered command names starting with `prefix`.
fn complete_commands(names: &[String], prefix: &str, tokenizer: &Tokenizer) -> Vec<Pair> {
    names
        .iter()
        .filter(|name| name.starts_with(prefix))
        .map(|name| Pair {
            display: name.clone(),
            replacement: tokenizer.escape(name),
        })
        .collect()
}

impl Completer for VshHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = &line[..pos];
        let (start, word) = self.tokenizer.completion_word(line_to_cursor);
        let is_first_word = line_to_cursor[..start].trim().is_empty();

        let completions = if is_first_word && !word.contains('/') {
            let names = registry::read(&self.registry, vsh::CommandRegistry::names);
            complete_commands(&names, &word, &self.tokenizer)
        } else {
            self.complete_path(&word)
        };
        Ok((start, completions))
    }
}

impl Hinter for VshHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for VshHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }
}

impl Validator for VshHelper {}

impl Helper for VshHelper {}
