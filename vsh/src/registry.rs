//! Command trait and the name → handler registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::VshResult;
use crate::help::CommandHelp;
use crate::invocation::Invocation;

/// A command handler. Handlers run against the engine that dispatched them
/// and may use its session context, resource tree and output channels.
#[async_trait(?Send)]
pub trait Command: Send + Sync {
    fn help(&self) -> CommandHelp<'_>;

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()>;
}

/// Registry shared between an engine and the engines it spawns for `call`.
pub type SharedRegistry = Arc<RwLock<CommandRegistry>>;

#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in command.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::commands::register_defaults(&mut registry);
        registry
    }

    #[must_use]
    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Registers `command` under its own name, returning any handler it
    /// replaced.
    pub fn register(&mut self, command: Arc<dyn Command>) -> Option<Arc<dyn Command>> {
        let name = command.help().name.to_string();
        self.register_as(&name, command)
    }

    pub fn register_as(
        &mut self,
        name: &str,
        command: Arc<dyn Command>,
    ) -> Option<Arc<dyn Command>> {
        self.commands.insert(name.to_string(), command)
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.remove(name)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Runs `f` with the registry read-locked. The guard never outlives the call.
pub fn read<T>(registry: &SharedRegistry, f: impl FnOnce(&CommandRegistry) -> T) -> T {
    let guard = registry.read().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

/// Runs `f` with the registry write-locked.
pub fn write<T>(registry: &SharedRegistry, f: impl FnOnce(&mut CommandRegistry) -> T) -> T {
    let mut guard = registry.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}
