#![allow(missing_docs)]

pub mod image;
pub mod path;
pub mod providers;
pub mod tree;

pub use vsh_sdk;
pub use image::{load_image, LayerFactory, LayerFormats};
pub use providers::{
    default_registry, LocalFs, MemoryFs, ProviderConfig, ProviderFactory, ProviderRegistry,
};
pub use tree::{Node, Resolved, ResourceTree, RootId, RootKind};
