use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VshConfig {
    pub shell: ShellConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Prompt template. `{cwd}`, `{user}` and `{depth}` are substituted.
    pub prompt: String,
    /// Local directory used as the base root.
    pub root: String,
    pub halt_on_error: bool,
    pub dir_stack_limit: usize,
    /// Script loaded before the first prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<String>,
    pub history: HistoryConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "vsh:{cwd}> ".to_string(),
            root: "/".to_string(),
            halt_on_error: false,
            dir_stack_limit: 99,
            startup: None,
            history: HistoryConfig::default(),
        }
    }
}

impl ShellConfig {
    /// The startup script with `~` expanded.
    #[must_use]
    pub fn startup_path(&self) -> Option<PathBuf> {
        self.startup
            .as_deref()
            .map(|file| PathBuf::from(shellexpand::tilde(file).into_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub file: String,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: "~/.vsh_history".to_string(),
            max_entries: 10_000,
        }
    }
}

impl HistoryConfig {
    /// The history file with `~` expanded.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.file).into_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
