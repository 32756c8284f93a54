use async_trait::async_trait;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, Editor};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};
use vsh::{
    Engine, EngineEvent, EngineObserver, LineSource, ReaderSource, SessionContext, VshError,
    VshResult,
};
use vsh_config::{ShellConfig, VshConfig};
use vsh_core::{LocalFs, Node, ResourceTree};

mod completer;

use completer::VshHelper;

/// vsh - Interactive command shell over a resource tree
#[derive(Parser, Debug)]
#[command(name = "vsh", version, about)]
struct Args {
    /// Path to config file
    #[arg(long, env = "VSH_CONFIG")]
    config: Option<String>,

    /// Local directory used as the base root
    #[arg(short, long)]
    root: Option<String>,

    /// Stop at the first failing statement
    #[arg(long)]
    halt_on_error: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Execute a statement and exit
    #[arg(short = 'c')]
    command: Option<String>,

    /// Local script file to execute
    script: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => vsh_config::load_from_file(path).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {e}, using defaults");
            VshConfig::default()
        }),
        None => vsh_config::load().unwrap_or_default(),
    };

    let log_level = if args.debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("vsh: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: VshConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let root = args.root.unwrap_or_else(|| config.shell.root.clone());
    let base = LocalFs::new(&root)?;
    let tree = Arc::new(ResourceTree::new(Arc::new(base)));

    let mut engine = Engine::builder(tree)
        .prompt(config.shell.prompt.clone())
        .halt_on_error(args.halt_on_error || config.shell.halt_on_error)
        .dir_stack_limit(config.shell.dir_stack_limit)
        .build();

    if let Some(startup) = config.shell.startup_path() {
        if startup.is_file() {
            debug!(script = %startup.display(), "running startup script");
            if let Err(e) = load_file(&mut engine, &startup).await {
                warn!(script = %startup.display(), error = %e, "startup script failed");
            }
        }
    }

    let status = if let Some(command) = args.command {
        let result = engine.execute(&command).await;
        exit_status(&engine, result)
    } else if let Some(script) = args.script {
        let result = load_file(&mut engine, &script).await;
        exit_status(&engine, result)
    } else {
        run_repl(&mut engine, &config.shell, PathBuf::from(&root)).await?;
        ExitCode::SUCCESS
    };

    engine.shutdown().await;
    Ok(status)
}

async fn load_file(engine: &mut Engine, path: &Path) -> VshResult<()> {
    let file = File::open(path)
        .map_err(|e| VshError::command(format!("cannot read '{}': {e}", path.display())))?;
    engine.load(&mut ReaderSource::new(BufReader::new(file))).await
}

/// Failure if the run halted or any statement failed.
fn exit_status(engine: &Engine, result: VshResult<()>) -> ExitCode {
    match result {
        Err(e) => {
            eprintln!("vsh: {e}");
            ExitCode::FAILURE
        }
        Ok(()) if engine.last_error().is_some() => ExitCode::FAILURE,
        Ok(()) => ExitCode::SUCCESS,
    }
}

/// Keeps the completer's view of the working location current.
struct CwdTracker {
    cwd: Arc<RwLock<Node>>,
}

impl EngineObserver for CwdTracker {
    fn notify(&self, event: &EngineEvent<'_>, context: &SessionContext) -> VshResult<()> {
        if matches!(
            event,
            EngineEvent::Started | EngineEvent::CommandFinished(_) | EngineEvent::CommandFailed(..)
        ) {
            *self.cwd.write().unwrap_or_else(PoisonError::into_inner) = context.cwd().clone();
        }
        Ok(())
    }
}

struct RustylineSource {
    editor: Editor<VshHelper, DefaultHistory>,
}

#[async_trait(?Send)]
impl LineSource for RustylineSource {
    async fn read_line(&mut self, prompt: &str) -> VshResult<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                Ok(Some(String::new()))
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                Ok(None)
            }
            Err(e) => Err(VshError::Io(std::io::Error::other(e))),
        }
    }
}

async fn run_repl(
    engine: &mut Engine,
    shell_config: &ShellConfig,
    host_root: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .max_history_size(shell_config.history.max_entries)?
        .history_ignore_dups(true)?
        .history_ignore_space(true)
        .build();

    let cwd = Arc::new(RwLock::new(engine.context().cwd().clone()));
    engine.add_observer(Arc::new(CwdTracker {
        cwd: Arc::clone(&cwd),
    }));

    let helper = VshHelper::new(
        Arc::clone(engine.registry()),
        cwd,
        engine.tree().base_root().root_id(),
        host_root,
    );
    let mut editor = Editor::with_config(rl_config)?;
    editor.set_helper(Some(helper));

    let history_path = shell_config.history.path();
    if shell_config.history.enabled {
        let _ = editor.load_history(&history_path);
    }

    println!("vsh v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' to quit, 'help' for help.");
    println!();

    let mut source = RustylineSource { editor };
    // Failures are already reported on the error channel.
    let _ = engine.go(&mut source).await;

    if shell_config.history.enabled {
        let _ = source.editor.save_history(&history_path);
    }
    Ok(())
}
