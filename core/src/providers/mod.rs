pub mod localfs;
pub mod memfs;
pub mod registry;

pub use localfs::LocalFs;
pub use memfs::MemoryFs;
pub use registry::{default_registry, ProviderConfig, ProviderFactory, ProviderRegistry};
