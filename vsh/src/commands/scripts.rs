use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vsh_core::Node;

use super::usage;
use crate::engine::{Engine, ScriptSource, TERMINATORS};
use crate::error::{VshError, VshResult};
use crate::help::CommandHelp;
use crate::invocation::Invocation;
use crate::registry::{self, Command};

/// Options and flags of `invocation` as script variables. A flag is bound
/// to `true`.
fn script_variables(invocation: &Invocation) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = invocation
        .flags()
        .iter()
        .map(|flag| (flag.clone(), "true".to_string()))
        .collect();
    vars.extend(
        invocation
            .options()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    vars
}

pub struct Load;

impl Load {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "load",
        summary: "Run a script in the current session",
        usage: "load SCRIPT",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Load {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let [script] = invocation.arguments() else {
            return Err(usage(&Self::HELP));
        };
        let node = engine.resolve(script).await?;
        let text = engine.read_script(&node).await?;
        debug!(script = %node, "loading script");
        engine.load(&mut ScriptSource::new(&text)).await
    }
}

pub struct Call;

impl Call {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "call",
        summary: "Run a script in a fresh session",
        usage: "call SCRIPT [ARG...] [--NAME=VALUE...]",
        options: &[(
            "--NAME=VALUE",
            "Bind NAME in the script; plain flags are bound to true",
        )],
    };
}

#[async_trait(?Send)]
impl Command for Call {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let Some((script, arguments)) = invocation.arguments().split_first() else {
            return Err(usage(&Self::HELP));
        };
        let node = engine.resolve(script).await?;
        engine
            .call(&node, arguments, &script_variables(invocation))
            .await
    }
}

/// A command backed by a script. Each invocation calls the script with the
/// invocation's arguments and options.
pub struct ScriptCommand {
    name: String,
    script: Node,
    summary: String,
    usage: String,
}

impl ScriptCommand {
    #[must_use]
    pub fn new(name: &str, script: Node) -> Self {
        Self {
            name: name.to_string(),
            summary: format!("Call {script}"),
            usage: format!("{name} [ARG...] [--NAME=VALUE...]"),
            script,
        }
    }

    #[must_use]
    pub const fn script(&self) -> &Node {
        &self.script
    }
}

#[async_trait(?Send)]
impl Command for ScriptCommand {
    fn help(&self) -> CommandHelp<'_> {
        CommandHelp {
            name: &self.name,
            summary: &self.summary,
            usage: &self.usage,
            options: &[],
        }
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        engine
            .call(
                &self.script,
                invocation.arguments(),
                &script_variables(invocation),
            )
            .await
    }
}

pub struct Register;

impl Register {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "register",
        summary: "Register a script as a command",
        usage: "register NAME SCRIPT",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Register {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let [name, script] = invocation.arguments() else {
            return Err(usage(&Self::HELP));
        };
        if TERMINATORS.contains(&name.as_str()) {
            return Err(VshError::command(format!("{name}: reserved word")));
        }
        let node = engine.resolve(script).await?;
        if !engine.tree().exists(&node).await {
            return Err(VshError::command(format!("{script}: no such script")));
        }

        debug!(command = %name, script = %node, "registering script command");
        let command = Arc::new(ScriptCommand::new(name, node));
        registry::write(engine.registry(), |r| r.register(command));
        Ok(())
    }
}

pub struct Unregister;

impl Unregister {
    const HELP: CommandHelp<'static> = CommandHelp {
        name: "unregister",
        summary: "Remove a command",
        usage: "unregister NAME",
        options: &[],
    };
}

#[async_trait(?Send)]
impl Command for Unregister {
    fn help(&self) -> CommandHelp<'_> {
        Self::HELP
    }

    async fn execute(&self, invocation: &Invocation, engine: &mut Engine) -> VshResult<()> {
        let [name] = invocation.arguments() else {
            return Err(usage(&Self::HELP));
        };
        registry::write(engine.registry(), |r| r.unregister(name))
            .map(drop)
            .ok_or_else(|| VshError::command(format!("{name}: no such command")))
    }
}
