use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vsh_sdk::{FsError, FsProvider, FsResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub options: HashMap<String, serde_json::Value>,
}

impl ProviderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.options.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
        self
    }

    #[must_use]
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.options
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
    }
}

pub type ProviderFactory = fn(ProviderConfig) -> FsResult<Arc<dyn FsProvider>>;

/// Maps locator schemes (`file`, `mem`, ...) to provider factories.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, scheme: &str, factory: ProviderFactory) {
        self.factories.insert(scheme.to_string(), factory);
    }

    pub fn create(&self, scheme: &str, config: ProviderConfig) -> FsResult<Arc<dyn FsProvider>> {
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| FsError::unsupported_scheme(scheme))?;
        factory(config)
    }

    #[must_use]
    pub fn has(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }
}

#[must_use]
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry.register("mem", |_config| Ok(Arc::new(super::memfs::MemoryFs::new())));

    registry.register("file", |config| {
        let root = config.get_str("root").unwrap_or_else(|| "/".to_string());
        let fs = super::localfs::LocalFs::new(root)?;
        Ok(Arc::new(fs))
    });

    registry
}
