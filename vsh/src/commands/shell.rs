use async_trait::async_trait;

use super::usage;
use crate::context::is_reserved;
use crate::engine::Engine;
use crate::error::{VshError, VshResult};
use crate::help::{self, CommandHelp};
use crate::invocation::Invocation;
use crate::registry::{self, Command};

pub struct Set;

impl Set {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "set",
        summary: "Set or list session variables",
        usage: "set [NAME VALUE...] [--NAME=VALUE...]",
        options: &[("--NAME=VALUE", "Set NAME; may be repeated")],
    };
}

#[async_trait(?Send)]
impl Command for Set {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let joined;
        let mut bindings: Vec<(&str, &str)> = invocation
            .options()
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        match invocation.arguments() {
            [] if bindings.is_empty() => {
                for (name, value) in engine.context().variables() {
                    engine.out().writeln(&format!("{name}={value}"))?;
                }
                return Ok(());
            }
            [] => {}
            [_] => return Err(usage(&Self::HELP)),
            [name, values @ ..] => {
                joined = values.join(" ");
                bindings.push((name.as_str(), joined.as_str()));
            }
        }
        engine.context_mut().set_all(&bindings)
    }
}

pub struct Unset;

impl Unset {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "unset",
        summary: "Remove session variables",
        usage: "unset NAME...",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Unset {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        if invocation.arguments().is_empty() {
            return Err(usage(&Self::HELP));
        }
        if let Some(name) = invocation.arguments().iter().find(|name| is_reserved(name)) {
            return Err(VshError::command(format!("{name} cannot be unset")));
        }
        for name in invocation.arguments() {
            engine.context_mut().unset(name)?;
        }
        Ok(())
    }
}

pub struct Echo;

impl Echo {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "echo",
        summary: "Print arguments",
        usage: "echo [-n] [ARG...]",
        options: &[("-n", "Do not print the trailing newline")],
    };
}

#[async_trait(?Send)]
impl Command for Echo {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let text = invocation.arguments().join(" ");
        if invocation.has_flag("n") {
            engine.out().write_str(&text)?;
        } else {
            engine.out().writeln(&text)?;
        }
        Ok(())
    }
}

pub struct Error;

impl Error {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "error",
        summary: "Print the last error",
        usage: "error",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Error {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, _invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        if let Some(error) = engine.last_error() {
            engine.out().writeln(error)?;
        }
        Ok(())
    }
}

pub struct Help;

impl Help {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "help",
        summary: "Show help for commands",
        usage: "help [COMMAND]",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Help {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        match invocation.arguments() {
            [] => {
                let handlers: Vec<_> = registry::read(engine.registry(), |r| {
                    r.names()
                        .into_iter()
                        .filter_map(|name| r.lookup(&name).map(|handler| (name, handler)))
                        .collect()
                });
                let entries: Vec<CommandHelp<'_>> = handlers
                    .iter()
                    .map(|(name, handler)| CommandHelp {
                        name: name.as_str(),
                        ..handler.help()
                    })
                    .collect();
                engine.out().write_str(&help::format_help_list(&entries))?;
                Ok(())
            }
            [name] => {
                let handler = registry::read(engine.registry(), |r| r.lookup(name))
                    .ok_or_else(|| VshError::command(format!("help: no help for '{name}'")))?;
                engine.out().write_str(&help::format_help(&handler.help()))?;
                Ok(())
            }
            _ => Err(usage(&Self::HELP)),
        }
    }
}
