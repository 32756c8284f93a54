use crate::{ConfigError, LogLevel, VshConfig};
use regex::Regex;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$\{([^}]+)\}").unwrap()
});

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/vsh/vsh.yaml"));
        }
        search_paths.push(PathBuf::from("./vsh.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/vsh/vsh.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    #[must_use]
    pub fn with_file(mut self, path: &str) -> Self {
        self.explicit_file = Some(PathBuf::from(path));
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn load(&self) -> Result<VshConfig, ConfigError> {
        let mut config = VshConfig::default();

        if let Ok(env_path) = std::env::var("VSH_CONFIG") {
            config = Self::parse_yaml(&Self::read(&PathBuf::from(env_path))?)?;
        } else if let Some(ref explicit) = self.explicit_file {
            config = Self::parse_yaml(&Self::read(explicit)?)?;
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    if let Ok(content) = std::fs::read_to_string(path) {
                        debug!(path = %path.display(), "merging config file");
                        config = Self::merge_yaml(&config, &content)?;
                    }
                }
            }
        }

        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    fn read(path: &PathBuf) -> Result<String, ConfigError> {
        std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })
    }

    fn parse_yaml(content: &str) -> Result<VshConfig, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn merge_yaml(base: &VshConfig, content: &str) -> Result<VshConfig, ConfigError> {
        let overlay = Self::parse_yaml(content)?;
        Ok(Self::merge_configs(base, &overlay))
    }

    /// Fields the overlay leaves at their default keep the base value.
    fn merge_configs(base: &VshConfig, overlay: &VshConfig) -> VshConfig {
        let defaults = VshConfig::default();
        let mut result = base.clone();

        if overlay.shell.prompt != defaults.shell.prompt {
            result.shell.prompt.clone_from(&overlay.shell.prompt);
        }
        if overlay.shell.root != defaults.shell.root {
            result.shell.root.clone_from(&overlay.shell.root);
        }
        if overlay.shell.halt_on_error != defaults.shell.halt_on_error {
            result.shell.halt_on_error = overlay.shell.halt_on_error;
        }
        if overlay.shell.dir_stack_limit != defaults.shell.dir_stack_limit {
            result.shell.dir_stack_limit = overlay.shell.dir_stack_limit;
        }
        if overlay.shell.startup.is_some() {
            result.shell.startup.clone_from(&overlay.shell.startup);
        }
        if overlay.shell.history != defaults.shell.history {
            result.shell.history = overlay.shell.history.clone();
        }
        if overlay.logging.level != defaults.logging.level {
            result.logging = overlay.logging.clone();
        }

        result
    }

    fn expand_env_vars(content: &str) -> String {
        ENV_REF
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_default()
            })
            .to_string()
    }

    fn apply_env_overrides(config: &mut VshConfig) -> Result<(), ConfigError> {
        if let Ok(prompt) = std::env::var("VSH_PROMPT") {
            config.shell.prompt = prompt;
        }
        if let Ok(root) = std::env::var("VSH_ROOT") {
            if !root.is_empty() {
                config.shell.root = root;
            }
        }
        if let Ok(halt) = std::env::var("VSH_HALT_ON_ERROR") {
            config.shell.halt_on_error = parse_env("VSH_HALT_ON_ERROR", &halt)?;
        }
        if let Ok(limit) = std::env::var("VSH_DIR_STACK_LIMIT") {
            config.shell.dir_stack_limit = parse_env("VSH_DIR_STACK_LIMIT", &limit)?;
        }
        if let Ok(level) = std::env::var("VSH_LOG_LEVEL") {
            config.logging.level = serde_yaml::from_str::<LogLevel>(&level.to_lowercase())
                .map_err(|_| ConfigError::InvalidValue {
                    name: "VSH_LOG_LEVEL".to_string(),
                    value: level.clone(),
                })?;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}
