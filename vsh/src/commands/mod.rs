//! Built-in commands.

mod files;
mod mounts;
mod navigation;
mod scripts;
mod shell;

use std::sync::Arc;

use crate::error::VshError;
use crate::help::CommandHelp;
use crate::registry::CommandRegistry;

pub use scripts::ScriptCommand;

/// Registers every built-in command.
pub fn register_defaults(registry: &mut CommandRegistry) {
    registry.register(Arc::new(navigation::Cd));
    registry.register(Arc::new(navigation::Pwd));
    registry.register(Arc::new(navigation::Pushd));
    registry.register(Arc::new(navigation::Popd));
    registry.register(Arc::new(navigation::Peekd));
    registry.register(Arc::new(navigation::Dirs));
    registry.register(Arc::new(mounts::Open));
    registry.register(Arc::new(mounts::Close));
    registry.register(Arc::new(scripts::Load));
    registry.register(Arc::new(scripts::Call));
    registry.register(Arc::new(scripts::Register));
    registry.register(Arc::new(scripts::Unregister));
    registry.register(Arc::new(shell::Set));
    registry.register(Arc::new(shell::Unset));
    registry.register(Arc::new(shell::Echo));
    registry.register(Arc::new(shell::Error));
    registry.register(Arc::new(shell::Help));
    registry.register(Arc::new(files::Ls));
    registry.register(Arc::new(files::Cat));
}

fn usage(help: &CommandHelp<'_>) -> VshError {
    VshError::usage(help.usage)
}
