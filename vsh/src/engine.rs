//! The read → resolve → parse → dispatch loop.

use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};
use vsh_core::{Node, ResourceTree};

use crate::context::{SessionContext, DEFAULT_PROMPT};
use crate::continuation::LineParser;
use crate::dirs::DEFAULT_DIR_STACK_LIMIT;
use crate::error::{VshError, VshResult};
use crate::help;
use crate::invocation::Invocation;
use crate::registry::{self, CommandRegistry, SharedRegistry};
use crate::resolver;

/// Statements that end the current loop.
pub const TERMINATORS: &[&str] = &["exit", "quit", "bye"];

/// Limit on nested `load` and `call`.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
pub enum EngineEvent<'a> {
    Started,
    CommandStarted(&'a Invocation),
    CommandFinished(&'a Invocation),
    CommandFailed(&'a Invocation, &'a VshError),
    Stopping,
    Stopped,
}

/// Receives engine notifications synchronously. A failing observer is
/// logged and otherwise ignored.
pub trait EngineObserver {
    fn notify(&self, event: &EngineEvent<'_>, context: &SessionContext) -> VshResult<()>;
}

/// What the loop does after a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// An output channel. Buffers are shared between clones.
#[derive(Debug, Clone)]
pub enum Output {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl Output {
    #[must_use]
    pub fn buffer() -> Self {
        Self::Buffer(Arc::default())
    }

    pub fn write(&self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(data)?;
                stdout.flush()
            }
            Self::Stderr => std::io::stderr().write_all(data),
            Self::Buffer(buf) => {
                buf.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(data);
                Ok(())
            }
        }
    }

    pub fn write_str(&self, s: &str) -> std::io::Result<()> {
        self.write(s.as_bytes())
    }

    pub fn writeln(&self, s: &str) -> std::io::Result<()> {
        let mut line = String::with_capacity(s.len() + 1);
        line.push_str(s);
        line.push('\n');
        self.write(line.as_bytes())
    }

    /// Everything written to a buffer so far. Empty for the standard streams.
    #[must_use]
    pub fn contents(&self) -> String {
        match self {
            Self::Buffer(buf) => {
                String::from_utf8_lossy(&buf.lock().unwrap_or_else(PoisonError::into_inner))
                    .into_owned()
            }
            Self::Stdout | Self::Stderr => String::new(),
        }
    }
}

/// Where the engine reads physical lines from. `None` is end of input.
#[async_trait(?Send)]
pub trait LineSource {
    async fn read_line(&mut self, prompt: &str) -> VshResult<Option<String>>;
}

/// Lines of an in-memory script.
#[derive(Debug, Clone, Default)]
pub struct ScriptSource {
    lines: VecDeque<String>,
}

impl ScriptSource {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }
}

#[async_trait(?Send)]
impl LineSource for ScriptSource {
    async fn read_line(&mut self, _prompt: &str) -> VshResult<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Lines from any buffered reader, such as a local script file.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[async_trait(?Send)]
impl<R: BufRead> LineSource for ReaderSource<R> {
    async fn read_line(&mut self, _prompt: &str) -> VshResult<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

pub struct EngineBuilder {
    tree: Arc<ResourceTree>,
    registry: Option<SharedRegistry>,
    parser: LineParser,
    prompt: String,
    halt_on_error: bool,
    dir_stack_limit: usize,
    out: Output,
    err: Output,
}

impl EngineBuilder {
    #[must_use]
    pub fn registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn parser(mut self, parser: LineParser) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn halt_on_error(mut self, halt: bool) -> Self {
        self.halt_on_error = halt;
        self
    }

    #[must_use]
    pub const fn dir_stack_limit(mut self, limit: usize) -> Self {
        self.dir_stack_limit = limit;
        self
    }

    /// Sends output and errors to the given channels.
    #[must_use]
    pub fn output(mut self, out: Output, err: Output) -> Self {
        self.out = out;
        self.err = err;
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        let mut context = SessionContext::new(self.tree.base_root());
        context.set_prompt(self.prompt);
        context.set_halt_on_error(self.halt_on_error);
        context.dirs_mut().set_limit(self.dir_stack_limit);

        Engine {
            registry: self
                .registry
                .unwrap_or_else(|| CommandRegistry::with_defaults().shared()),
            tree: self.tree,
            context,
            parser: self.parser,
            observers: Vec::new(),
            state: EngineState::Idle,
            stop_requested: false,
            out: self.out,
            err: self.err,
            last_error: None,
            depth: 0,
        }
    }
}

/// One shell session over a resource tree.
pub struct Engine {
    registry: SharedRegistry,
    tree: Arc<ResourceTree>,
    context: SessionContext,
    parser: LineParser,
    observers: Vec<Arc<dyn EngineObserver>>,
    state: EngineState,
    stop_requested: bool,
    out: Output,
    err: Output,
    last_error: Option<String>,
    depth: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cwd", &self.context.cwd().to_string())
            .field("state", &self.state)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn builder(tree: Arc<ResourceTree>) -> EngineBuilder {
        EngineBuilder {
            tree,
            registry: None,
            parser: LineParser::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            halt_on_error: false,
            dir_stack_limit: DEFAULT_DIR_STACK_LIMIT,
            out: Output::Stdout,
            err: Output::Stderr,
        }
    }

    #[must_use]
    pub fn new(tree: Arc<ResourceTree>) -> Self {
        Self::builder(tree).build()
    }

    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.context
    }

    #[must_use]
    pub const fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn parser(&self) -> &LineParser {
        &self.parser
    }

    #[must_use]
    pub const fn out(&self) -> &Output {
        &self.out
    }

    #[must_use]
    pub const fn err(&self) -> &Output {
        &self.err
    }

    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    /// The prompt template with `{cwd}`, `{user}` and `{depth}` filled in.
    #[must_use]
    pub fn render_prompt(&self) -> String {
        self.context
            .prompt()
            .replace("{cwd}", &self.context.cwd().to_string())
            .replace("{user}", &prompt_user())
            .replace("{depth}", &self.context.dirs().len().to_string())
    }

    /// Resolves `locator` against the working location. A scheme root
    /// created on the way is held by this session until `close_all`.
    pub async fn resolve(&mut self, locator: &str) -> VshResult<Node> {
        let resolved = self
            .tree
            .resolve_creating(locator, self.context.cwd())
            .await?;
        if let Some(root) = resolved.created {
            debug!(root = %root, "session holds scheme root");
            self.context.hold(root);
        }
        Ok(resolved.node)
    }

    /// Resolves `locator` and requires it to be an existing folder.
    pub async fn resolve_folder(&mut self, locator: &str) -> VshResult<Node> {
        let node = self.resolve(locator).await?;
        match self.tree.stat(&node).await {
            Ok(info) if info.is_dir() => Ok(node),
            Ok(_) => Err(VshError::command(format!("{locator}: not a folder"))),
            Err(_) => Err(VshError::command(format!("{locator}: no such folder"))),
        }
    }

    /// A folder for `node`: the node itself, or its parent if it is a file.
    pub async fn promote_to_folder(&self, node: Node) -> Node {
        if self.tree.is_container(&node).await {
            node
        } else {
            node.parent().unwrap_or_else(|| node.root())
        }
    }

    /// Reads a script from the resource tree.
    pub async fn read_script(&self, script: &Node) -> VshResult<String> {
        let data = self
            .tree
            .read(script)
            .await
            .map_err(|e| VshError::command(format!("{script}: {e}")))?;
        String::from_utf8(data.to_vec())
            .map_err(|_| VshError::command(format!("{script}: not a text file")))
    }

    /// Runs an interactive session until end of input, a terminator, `stop`,
    /// or a failure under the halt-on-error policy.
    pub async fn go(&mut self, source: &mut dyn LineSource) -> VshResult<()> {
        self.state = EngineState::Running;
        self.stop_requested = false;
        self.notify(&EngineEvent::Started);

        let result = self.run(source, true).await;
        if let Err(e) = &result {
            self.report(e);
        }

        if self.state != EngineState::Stopping {
            self.state = EngineState::Stopping;
            self.notify(&EngineEvent::Stopping);
        }
        self.state = EngineState::Stopped;
        self.notify(&EngineEvent::Stopped);
        result
    }

    /// Runs a script over this engine's own session. A terminator ends only
    /// the script. Fails with the halting error when the policy stops it.
    pub async fn load(&mut self, source: &mut dyn LineSource) -> VshResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(VshError::command("load: scripts nested too deeply"));
        }
        self.depth += 1;
        let result = self.run(source, false).await;
        self.depth -= 1;
        result
    }

    /// Runs one or more statements as a script.
    pub async fn execute(&mut self, text: &str) -> VshResult<()> {
        self.load(&mut ScriptSource::new(text)).await
    }

    /// Runs `script` in a new engine with a fresh session that starts at
    /// this engine's working location. Positional arguments are bound to
    /// `$1..$n`, the script to `$0`, the count to `$argc`, and each option
    /// to a variable of the same name. Filesystems the script leaves open are
    /// closed before returning.
    pub async fn call(
        &mut self,
        script: &Node,
        arguments: &[String],
        options: &BTreeMap<String, String>,
    ) -> VshResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(VshError::command("call: scripts nested too deeply"));
        }
        let text = self.read_script(script).await?;

        let mut nested = self.fork();
        nested.context.set("0", &script.to_string())?;
        for (i, arg) in arguments.iter().enumerate() {
            nested.context.set(&(i + 1).to_string(), arg)?;
        }
        nested.context.set("argc", &arguments.len().to_string())?;
        for (name, value) in options {
            nested.context.set(name, value)?;
        }

        debug!(script = %script, depth = nested.depth, "calling script");
        let result = nested.run(&mut ScriptSource::new(&text), false).await;
        nested.close_all().await;
        result
    }

    fn fork(&self) -> Self {
        let mut context = SessionContext::new(self.context.cwd().clone());
        context.set_prompt(self.context.prompt());
        context.set_halt_on_error(self.context.halt_on_error());
        context.dirs_mut().set_limit(self.context.dirs().limit());

        let mut parser = self.parser.clone();
        parser.reset();

        Self {
            registry: Arc::clone(&self.registry),
            tree: Arc::clone(&self.tree),
            context,
            parser,
            observers: Vec::new(),
            state: EngineState::Idle,
            stop_requested: false,
            out: self.out.clone(),
            err: self.err.clone(),
            last_error: None,
            depth: self.depth + 1,
        }
    }

    /// Asks the loop to end at its next statement boundary.
    pub fn stop(&mut self) {
        self.stop_requested = true;
        if self.state == EngineState::Running {
            self.state = EngineState::Stopping;
            self.notify(&EngineEvent::Stopping);
        }
    }

    /// Releases every filesystem the session opened. Call before dropping
    /// the engine.
    pub async fn shutdown(&mut self) -> Vec<Node> {
        self.close_all().await
    }

    async fn run(&mut self, source: &mut dyn LineSource, interactive: bool) -> VshResult<()> {
        let result = self.run_lines(source, interactive).await;
        self.parser.reset();
        result
    }

    async fn run_lines(&mut self, source: &mut dyn LineSource, interactive: bool) -> VshResult<()> {
        while !self.stop_requested {
            let prompt = if interactive {
                self.render_prompt()
            } else {
                String::new()
            };
            let Some(line) = source.read_line(&prompt).await? else {
                break;
            };

            match self.step(&line).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Terminate) => break,
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    if self.context.halt_on_error() {
                        return Err(e);
                    }
                    self.report(&e);
                }
            }
        }
        Ok(())
    }

    /// Processes one physical line.
    pub async fn step(&mut self, line: &str) -> VshResult<Flow> {
        if !self.parser.is_pending() && line.trim_start().starts_with('#') {
            return Ok(Flow::Continue);
        }

        let resolved = match resolver::resolve(line, &self.context) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.parser.reset();
                return Err(e);
            }
        };

        let invocation = self.parser.parse(&resolved);
        let Some(command) = invocation.command() else {
            return Ok(Flow::Continue);
        };
        if TERMINATORS.contains(&command) {
            return Ok(Flow::Terminate);
        }

        self.dispatch(&invocation).await?;
        Ok(Flow::Continue)
    }

    /// Looks up and runs the handler for `invocation`. `-h`/`--help` prints
    /// the command's usage instead. Observers see every dispatch, unknown
    /// commands included.
    pub async fn dispatch(&mut self, invocation: &Invocation) -> VshResult<()> {
        let Some(name) = invocation.command() else {
            return Ok(());
        };
        debug!(command = name, "dispatching");
        self.notify(&EngineEvent::CommandStarted(invocation));

        let result = match registry::read(&self.registry, |r| r.lookup(name)) {
            None => Err(VshError::UnknownCommand(name.to_string())),
            Some(handler) if help::wants_help(invocation) => self
                .out
                .write_str(&help::format_help(&handler.help()))
                .map_err(VshError::from),
            Some(handler) => handler.execute(invocation, self).await,
        };

        match &result {
            Ok(()) => self.notify(&EngineEvent::CommandFinished(invocation)),
            Err(e) => self.notify(&EngineEvent::CommandFailed(invocation, e)),
        }
        result
    }

    fn notify(&self, event: &EngineEvent<'_>) {
        for observer in &self.observers {
            if let Err(e) = observer.notify(event, &self.context) {
                warn!(error = %e, ?event, "observer failed");
            }
        }
    }

    fn report(&self, error: &VshError) {
        let _ = self.err.writeln(&format!("vsh: {error}"));
    }
}

fn prompt_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use vsh_core::MemoryFs;

    fn tree() -> Arc<ResourceTree> {
        let fs = MemoryFs::new();
        fs.insert_dir("/home/user").unwrap();
        fs.insert_dir("/tmp").unwrap();
        fs.insert_file("/scripts/args.vsh", "echo $0 $argc $1 $2\necho $greeting\n")
            .unwrap();
        fs.insert_file("/scripts/move.vsh", "cd /tmp\nexit\necho unreachable\n")
            .unwrap();
        fs.insert_file("/scripts/fail.vsh", "echo before\nnosuch\necho after\n")
            .unwrap();
        fs.insert_file("/scripts/flags.vsh", "echo $l $h\n").unwrap();
        Arc::new(ResourceTree::new(Arc::new(fs)))
    }

    fn engine() -> (Engine, Output) {
        let out = Output::buffer();
        let engine = Engine::builder(tree())
            .output(out.clone(), out.clone())
            .build();
        (engine, out)
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl EngineObserver for Recorder {
        fn notify(&self, event: &EngineEvent<'_>, context: &SessionContext) -> VshResult<()> {
            let name = match event {
                EngineEvent::Started => "started".to_string(),
                EngineEvent::CommandStarted(inv) => format!("start {inv}"),
                EngineEvent::CommandFinished(inv) => format!("done {inv} @{}", context.cwd()),
                EngineEvent::CommandFailed(inv, _) => format!("failed {inv}"),
                EngineEvent::Stopping => "stopping".to_string(),
                EngineEvent::Stopped => "stopped".to_string(),
            };
            self.events.borrow_mut().push(name);
            Ok(())
        }
    }

    struct Failing;

    impl EngineObserver for Failing {
        fn notify(&self, _event: &EngineEvent<'_>, _context: &SessionContext) -> VshResult<()> {
            Err(VshError::command("observer broke"))
        }
    }

    #[tokio::test]
    async fn cd_then_pwd() {
        let (mut engine, out) = engine();
        engine.execute("cd /tmp\npwd").await.unwrap();
        assert_eq!(out.contents(), "/tmp\n");
    }

    #[tokio::test]
    async fn comments_and_blank_lines_are_skipped() {
        let (mut engine, out) = engine();
        engine.execute("# $undefined\n\n   # indented\necho ok").await.unwrap();
        assert_eq!(out.contents(), "ok\n");
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn continuation_joins_statements() {
        let (mut engine, out) = engine();
        engine.execute("echo foo \\\nbar").await.unwrap();
        assert_eq!(out.contents(), "foo bar\n");
    }

    #[tokio::test]
    async fn errors_continue_without_halt() {
        let (mut engine, out) = engine();
        engine.execute("nosuch\necho $missing\necho still").await.unwrap();
        assert_eq!(
            out.contents(),
            "vsh: unknown command: nosuch\nvsh: unbound variable: $missing\nstill\n"
        );
        assert_eq!(engine.last_error(), Some("unbound variable: $missing"));
    }

    #[tokio::test]
    async fn halt_on_error_stops_load() {
        let (mut engine, out) = engine();
        engine.context_mut().set_halt_on_error(true);
        let err = engine.execute("echo one\nnosuch\necho two").await.unwrap_err();
        assert!(matches!(err, VshError::UnknownCommand(ref name) if name == "nosuch"));
        assert_eq!(out.contents(), "one\n");
        assert_eq!(engine.last_error(), Some("unknown command: nosuch"));
    }

    #[tokio::test]
    async fn terminator_ends_only_the_loaded_script() {
        let (mut engine, out) = engine();
        engine.execute("load /scripts/move.vsh\npwd").await.unwrap();
        assert_eq!(out.contents(), "/tmp\n");
    }

    #[tokio::test]
    async fn call_binds_arguments_in_fresh_context() {
        let (mut engine, out) = engine();
        engine
            .execute("set greeting hi\ncall /scripts/args.vsh a b --greeting=hello\necho $greeting")
            .await
            .unwrap();
        assert_eq!(out.contents(), "/scripts/args.vsh 2 a b\nhello\nhi\n");
    }

    #[tokio::test]
    async fn call_does_not_move_the_caller() {
        let (mut engine, out) = engine();
        engine.execute("cd /home\ncall /scripts/move.vsh\npwd").await.unwrap();
        assert_eq!(out.contents(), "/home\n");
    }

    #[tokio::test]
    async fn nested_failure_is_reported_inside_the_call() {
        let (mut engine, out) = engine();
        engine.execute("call /scripts/fail.vsh\necho end").await.unwrap();
        assert_eq!(
            out.contents(),
            "before\nvsh: unknown command: nosuch\nafter\nend\n"
        );
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn go_emits_lifecycle_events() {
        let (mut engine, _out) = engine();
        let recorder = Arc::new(Recorder::default());
        engine.add_observer(recorder.clone());
        engine.add_observer(Arc::new(Failing));

        let mut source = ScriptSource::new("cd /tmp\nnosuch\nquit\necho never");
        engine.go(&mut source).await.unwrap();

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(
            recorder.events.borrow().as_slice(),
            [
                "started",
                "start cd /tmp",
                "done cd /tmp @/tmp",
                "start nosuch",
                "failed nosuch",
                "stopping",
                "stopped"
            ]
        );
    }

    #[tokio::test]
    async fn go_reports_the_halting_error_before_stopping() {
        let (mut engine, out) = engine();
        engine.context_mut().set_halt_on_error(true);
        let recorder = Arc::new(Recorder::default());
        engine.add_observer(recorder.clone());

        let mut source = ScriptSource::new("echo one\nnosuch\necho two");
        let err = engine.go(&mut source).await.unwrap_err();

        assert!(matches!(err, VshError::UnknownCommand(ref name) if name == "nosuch"));
        assert_eq!(out.contents(), "one\nvsh: unknown command: nosuch\n");
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(
            recorder.events.borrow().as_slice(),
            [
                "started",
                "start echo one",
                "done echo one @/",
                "start nosuch",
                "failed nosuch",
                "stopping",
                "stopped"
            ]
        );
    }

    #[tokio::test]
    async fn help_flag_prints_usage() {
        let (mut engine, out) = engine();
        engine.execute("popd --help").await.unwrap();
        assert!(out.contents().starts_with("popd - "));
        assert!(out.contents().contains("Usage: popd [-n]"));
    }

    #[tokio::test]
    async fn clustered_h_reaches_the_command() {
        let (mut engine, out) = engine();
        engine.execute("call -lh /scripts/flags.vsh").await.unwrap();
        assert_eq!(out.contents(), "true true\n");
    }

    #[tokio::test]
    async fn prompt_template_is_rendered() {
        let (mut engine, _out) = engine();
        engine.context_mut().set_prompt("[{depth}] {cwd}$ ");
        engine.execute("pushd /tmp").await.unwrap();
        assert_eq!(engine.render_prompt(), "[1] /tmp$ ");
    }

    #[tokio::test]
    async fn reader_source_strips_line_endings() {
        let mut source = ReaderSource::new(std::io::Cursor::new("a\r\nb\n\nc"));
        let mut lines = Vec::new();
        while let Some(line) = source.read_line("").await.unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, ["a", "b", "", "c"]);
    }
}
