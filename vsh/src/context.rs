//! Per-engine session state.

use std::collections::BTreeMap;

use vsh_core::Node;

use crate::dirs::DirStack;
use crate::error::{VshError, VshResult};
use crate::mounts::MountStack;

pub const CWD: &str = "cwd";
pub const PROMPT: &str = "prompt";
pub const HALT_ON_ERROR: &str = "haltonerror";

pub const DEFAULT_PROMPT: &str = "vsh:{cwd}> ";

/// Variable lookup used by the resolver.
pub trait Variables {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Working location, prompt template, halt policy, user variables, the two
/// session stacks and the scheme roots the session created while resolving
/// locators. Owned by exactly one engine.
#[derive(Debug, Clone)]
pub struct SessionContext {
    cwd: Node,
    prompt: String,
    halt_on_error: bool,
    vars: BTreeMap<String, String>,
    mounts: MountStack,
    dirs: DirStack,
    held: Vec<Node>,
}

impl SessionContext {
    #[must_use]
    pub fn new(cwd: Node) -> Self {
        Self {
            cwd,
            prompt: DEFAULT_PROMPT.to_string(),
            halt_on_error: false,
            vars: BTreeMap::new(),
            mounts: MountStack::new(),
            dirs: DirStack::default(),
            held: Vec::new(),
        }
    }

    #[must_use]
    pub const fn cwd(&self) -> &Node {
        &self.cwd
    }

    pub fn set_cwd(&mut self, cwd: Node) {
        self.cwd = cwd;
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    #[must_use]
    pub const fn halt_on_error(&self) -> bool {
        self.halt_on_error
    }

    pub fn set_halt_on_error(&mut self, halt: bool) {
        self.halt_on_error = halt;
    }

    #[must_use]
    pub const fn mounts(&self) -> &MountStack {
        &self.mounts
    }

    pub fn mounts_mut(&mut self) -> &mut MountStack {
        &mut self.mounts
    }

    #[must_use]
    pub const fn dirs(&self) -> &DirStack {
        &self.dirs
    }

    pub fn dirs_mut(&mut self) -> &mut DirStack {
        &mut self.dirs
    }

    /// Scheme roots created by resolution that no mount entry owns yet.
    #[must_use]
    pub fn held(&self) -> &[Node] {
        &self.held
    }

    pub(crate) fn hold(&mut self, root: Node) {
        if !self.held.contains(&root) {
            self.held.push(root);
        }
    }

    /// Hands a held root over to the caller. Returns whether it was held.
    pub(crate) fn unhold(&mut self, root: &Node) -> bool {
        let before = self.held.len();
        self.held.retain(|held| held != root);
        self.held.len() != before
    }

    pub(crate) fn take_held(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.held)
    }

    /// Binds a variable. `cwd` is read-only; `haltonerror` takes a boolean.
    pub fn set(&mut self, name: &str, value: &str) -> VshResult<()> {
        self.set_all(&[(name, value)])
    }

    /// Binds every pair, or none of them if any binding is rejected.
    pub fn set_all(&mut self, bindings: &[(&str, &str)]) -> VshResult<()> {
        let mut halt = None;
        for (name, value) in bindings {
            match *name {
                CWD => return Err(VshError::command("cwd is read-only; use cd")),
                HALT_ON_ERROR => {
                    halt = Some(parse_bool(value).ok_or_else(|| {
                        VshError::usage(format!("haltonerror must be true or false, not '{value}'"))
                    })?);
                }
                _ => {}
            }
        }

        for (name, value) in bindings {
            match *name {
                PROMPT => self.prompt = (*value).to_string(),
                HALT_ON_ERROR => {}
                _ => {
                    self.vars.insert((*name).to_string(), (*value).to_string());
                }
            }
        }
        if let Some(halt) = halt {
            self.halt_on_error = halt;
        }
        Ok(())
    }

    /// Removes a user variable. Returns whether it was bound.
    pub fn unset(&mut self, name: &str) -> VshResult<bool> {
        if is_reserved(name) {
            return Err(VshError::command(format!("{name} cannot be unset")));
        }
        Ok(self.vars.remove(name).is_some())
    }

    /// Every binding, reserved entries included, sorted by name.
    #[must_use]
    pub fn variables(&self) -> Vec<(String, String)> {
        let mut all: Vec<(String, String)> = [CWD, HALT_ON_ERROR, PROMPT]
            .iter()
            .filter_map(|name| self.lookup(name).map(|v| ((*name).to_string(), v)))
            .collect();
        all.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        all.sort();
        all
    }
}

impl Variables for SessionContext {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            CWD => Some(self.cwd.to_string()),
            PROMPT => Some(self.prompt.clone()),
            HALT_ON_ERROR => Some(self.halt_on_error.to_string()),
            _ => self.vars.get(name).cloned(),
        }
    }
}

#[must_use]
pub fn is_reserved(name: &str) -> bool {
    matches!(name, CWD | PROMPT | HALT_ON_ERROR)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}
