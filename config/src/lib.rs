//! VSH Configuration System
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/vsh/vsh.yaml` (system-wide)
//! 3. `~/.config/vsh/vsh.yaml` (user)
//! 4. `./vsh.yaml` (project-local)
//! 5. `VSH_CONFIG=/path/to/config.yaml` or an explicit file (replaces 2-4)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! shell:
//!   prompt: "{user}@vsh:{cwd}> "
//!   root: "${HOME}"
//!   halt_on_error: false
//!   dir_stack_limit: 99
//!   startup: "~/.vshrc"
//!   history:
//!     file: "~/.vsh_history"
//!     max_entries: 5000
//!
//! logging:
//!   level: info
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::*;

/// Load configuration from default locations.
///
/// Searches for config files in order and merges them.
/// Environment variables override file values.
pub fn load() -> Result<VshConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<VshConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}
