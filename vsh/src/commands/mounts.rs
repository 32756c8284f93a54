use async_trait::async_trait;

use super::usage;
use crate::engine::Engine;
use crate::error::VshResult;
use crate::help::CommandHelp;
use crate::invocation::Invocation;
use crate::mounts::OpenMode;
use crate::registry::Command;

pub struct Open;

impl Open {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "open",
        summary: "Open a file or folder as a filesystem and enter it",
        usage: "open [-l | -v] [LOCATOR]",
        options: &[
            ("-l, --layered", "Open a file's contents as a nested filesystem"),
            ("-v, --virtual", "Open a folder as the top of a new root"),
        ],
    };
}

#[async_trait(?Send)]
impl Command for Open {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let layered = invocation.has_any_flag(&["l", "layered"]);
        let virtual_root = invocation.has_any_flag(&["v", "virtual"]);
        let mode = match (layered, virtual_root) {
            (false, false) => OpenMode::Auto,
            (true, false) => OpenMode::Layered,
            (false, true) => OpenMode::Virtual,
            (true, true) => return Err(usage(&Self::HELP)),
        };

        match invocation.arguments() {
            [] if mode == OpenMode::Auto => {
                for line in engine.context().mounts().listing() {
                    engine.out().writeln(&line)?;
                }
                Ok(())
            }
            [locator] => engine.open(locator, mode).await.map(drop),
            _ => Err(usage(&Self::HELP)),
        }
    }
}

pub struct Close;

impl Close {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "close",
        summary: "Close an open filesystem",
        usage: "close [-a] [INDEX | LOCATOR]",
        options: &[("-a, --all", "Close every open filesystem")],
    };
}

#[async_trait(?Send)]
impl Command for Close {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let all = invocation.has_any_flag(&["a", "all"]);
        match invocation.arguments() {
            [] if all => {
                engine.close_all().await;
                Ok(())
            }
            [] => engine.close(None).await.map(drop),
            [selector] if !all => engine.close(Some(selector)).await.map(drop),
            _ => Err(usage(&Self::HELP)),
        }
    }
}
