use async_trait::async_trait;

use super::usage;
use crate::engine::Engine;
use crate::error::VshResult;
use crate::help::CommandHelp;
use crate::invocation::Invocation;
use crate::registry::Command;

pub struct Cd;

impl Cd {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "cd",
        summary: "Change the working location",
        usage: "cd [LOCATOR]",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Cd {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let target = match invocation.arguments() {
            [] => engine.tree().base_root(),
            [locator] => engine.resolve_folder(locator).await?,
            _ => return Err(usage(&Self::HELP)),
        };
        engine.context_mut().set_cwd(target);
        Ok(())
    }
}

pub struct Pwd;

impl Pwd {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "pwd",
        summary: "Print the working location",
        usage: "pwd",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Pwd {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        if !invocation.arguments().is_empty() {
            return Err(usage(&Self::HELP));
        }
        engine.out().writeln(&engine.context().cwd().to_string())?;
        Ok(())
    }
}

pub struct Pushd;

impl Pushd {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "pushd",
        summary: "Save the working location and change to another",
        usage: "pushd [LOCATOR]",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Pushd {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        match invocation.arguments() {
            [] => engine.pushd(None).await,
            [locator] => engine.pushd(Some(locator)).await,
            _ => Err(usage(&Self::HELP)),
        }
    }
}

pub struct Popd;

impl Popd {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "popd",
        summary: "Pop the directory stack",
        usage: "popd [-n]",
        options: &[("-n", "Discard the entry without changing location")],
    };
}

#[async_trait(?Send)]
impl Command for Popd {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        if !invocation.arguments().is_empty() {
            return Err(usage(&Self::HELP));
        }
        engine.popd(invocation.has_flag("n"));
        Ok(())
    }
}

pub struct Peekd;

impl Peekd {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "peekd",
        summary: "Change to the top of the directory stack without popping it",
        usage: "peekd",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Peekd {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        if !invocation.arguments().is_empty() {
            return Err(usage(&Self::HELP));
        }
        engine.peekd();
        Ok(())
    }
}

pub struct Dirs;

impl Dirs {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "dirs",
        summary: "List the directory stack, newest first",
        usage: "dirs",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Dirs {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, _invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        for line in engine.dir_listing() {
            engine.out().writeln(&line)?;
        }
        Ok(())
    }
}
