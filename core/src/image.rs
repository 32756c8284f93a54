//! Tree images: file contents that mount as a nested filesystem.
//!
//! A json image is an object whose string values are files and whose object
//! values are folders.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use vsh_sdk::{FsError, FsProvider, FsResult};

use crate::providers::MemoryFs;

pub type LayerFactory = fn(&[u8]) -> FsResult<Arc<dyn FsProvider>>;

/// Maps file extensions to the loader that turns the file into a layered root.
pub struct LayerFormats {
    formats: HashMap<String, LayerFactory>,
}

impl Default for LayerFormats {
    fn default() -> Self {
        let mut formats = Self::empty();
        formats.register("json", |data| Ok(Arc::new(load_image(data)?)));
        formats
    }
}

impl LayerFormats {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, factory: LayerFactory) {
        self.formats
            .insert(extension.to_ascii_lowercase(), factory);
    }

    /// Finds the loader for the extension of `path`.
    #[must_use]
    pub fn for_path(&self, path: &str) -> Option<LayerFactory> {
        let name = path.rsplit('/').next()?;
        let (_, extension) = name.rsplit_once('.')?;
        self.formats.get(&extension.to_ascii_lowercase()).copied()
    }
}

/// Builds an in-memory filesystem from a json tree image.
pub fn load_image(data: &[u8]) -> FsResult<MemoryFs> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| FsError::invalid_argument(format!("bad image: {e}")))?;
    let Value::Object(entries) = value else {
        return Err(FsError::invalid_argument("image must be a json object"));
    };

    let fs = MemoryFs::new();
    fill(&fs, "", &entries)?;
    Ok(fs)
}

fn fill(fs: &MemoryFs, prefix: &str, entries: &serde_json::Map<String, Value>) -> FsResult<()> {
    for (name, value) in entries {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(FsError::invalid_argument(format!("bad image entry name: {name:?}")));
        }
        let path = format!("{prefix}/{name}");
        match value {
            Value::String(content) => fs.insert_file(&path, content.as_bytes())?,
            Value::Object(children) => {
                fs.insert_dir(&path)?;
                fill(fs, &path, children)?;
            }
            _ => {
                return Err(FsError::invalid_argument(format!(
                    "image entry {path} must be a string or an object"
                )))
            }
        }
    }
    Ok(())
}
