#![doc = include_str!("../README.md")]

mod error;
mod provider;
mod types;

pub use error::{FsError, FsResult};
pub use provider::FsProvider;
pub use types::{FileInfo, FileType};
