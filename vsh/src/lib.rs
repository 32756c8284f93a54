//! vsh - Interactive command shell over a resource tree
//!
//! This crate provides:
//! - A quote- and escape-aware tokenizer and a flag/option/argument classifier
//! - Line continuation and `$name` variable substitution
//! - A command registry of async handlers, with script-backed commands
//! - An engine with interactive (`go`), in-session (`load`) and isolated
//!   (`call`) execution modes
//! - Stacks of opened filesystems and saved working locations

pub mod commands;
pub mod context;
pub mod continuation;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod help;
pub mod invocation;
pub mod mounts;
pub mod registry;
pub mod resolver;
pub mod tokenizer;

pub use context::{SessionContext, Variables};
pub use continuation::{ContinuationBuffer, LineParser};
pub use dirs::DirStack;
pub use engine::{
    Engine, EngineBuilder, EngineEvent, EngineObserver, EngineState, Flow, LineSource, Output,
    ReaderSource, ScriptSource,
};
pub use error::{VshError, VshResult};
pub use invocation::{ClassifierOptions, Invocation, Token};
pub use mounts::{MountEntry, MountStack, OpenMode};
pub use registry::{Command, CommandRegistry, SharedRegistry};
pub use tokenizer::Tokenizer;
