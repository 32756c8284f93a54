use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::{VshError, VshResult};
use crate::help::CommandHelp;
use crate::invocation::Invocation;
use crate::registry::Command;

pub struct Ls;

impl Ls {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "ls",
        summary: "List folder contents",
        usage: "ls [-l] [LOCATOR...]",
        options: &[("-l", "Show type and size")],
    };
}

#[async_trait(?Send)]
impl Command for Ls {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let long = invocation.has_flag("l");
        let locators = match invocation.arguments() {
            [] => vec![String::new()],
            args => args.to_vec(),
        };
        let headers = locators.len() > 1;

        for (i, locator) in locators.iter().enumerate() {
            let node = engine.resolve(locator).await?;
            let mut entries = engine
                .tree()
                .list(&node)
                .await
                .map_err(|e| VshError::command(format!("ls: {e}")))?;
            entries.sort_by(|a, b| a.name().cmp(b.name()));

            if headers {
                if i > 0 {
                    engine.out().writeln("")?;
                }
                engine.out().writeln(&format!("{node}:"))?;
            }
            for entry in entries {
                let name = if entry.is_dir() {
                    format!("{}/", entry.name())
                } else {
                    entry.name().to_string()
                };
                let line = if long {
                    let kind = if entry.is_dir() { 'd' } else { '-' };
                    format!("{kind} {:>8} {name}", entry.size)
                } else {
                    name
                };
                engine.out().writeln(&line)?;
            }
        }
        Ok(())
    }
}

pub struct Cat;

impl Cat {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "cat",
        summary: "Print file contents",
        usage: "cat LOCATOR...",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Cat {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        if invocation.arguments().is_empty() {
            return Err(VshError::usage(Self::HELP.usage));
        }
        for locator in invocation.arguments() {
            let node = engine.resolve(locator).await?;
            let data = engine
                .tree()
                .read(&node)
                .await
                .map_err(|e| VshError::command(format!("cat: {e}")))?;
            engine.out().write(&data)?;
        }
        Ok(())
    }
}
