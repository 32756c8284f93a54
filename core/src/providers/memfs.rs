use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use vsh_sdk::{FileInfo, FileType, FsError, FsProvider, FsResult};

use crate::path::{normalize_path, parent_path};

#[derive(Debug, Clone)]
struct MemFile {
    content: Vec<u8>,
    mtime: SystemTime,
}

#[derive(Debug, Clone)]
struct MemDir {
    mtime: SystemTime,
}

impl Default for MemDir {
    fn default() -> Self {
        Self {
            mtime: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone)]
enum MemEntry {
    File(MemFile),
    Dir(MemDir),
}

impl MemEntry {
    fn to_file_info(&self, path: &str) -> FileInfo {
        match self {
            Self::File(f) => FileInfo {
                path: path.to_string(),
                size: f.content.len() as u64,
                file_type: FileType::Regular,
                mtime: f.mtime,
            },
            Self::Dir(d) => FileInfo {
                path: path.to_string(),
                size: 0,
                file_type: FileType::Directory,
                mtime: d.mtime,
            },
        }
    }
}

/// In-memory provider. Contents live as long as the value does.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<HashMap<String, MemEntry>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert("/".to_string(), MemEntry::Dir(MemDir::default()));
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, MemEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, MemEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates `path` and any missing ancestors as folders.
    pub fn insert_dir(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path);
        let mut entries = self.entries_mut();
        Self::create_ancestors(&mut entries, &path)?;
        match entries.get(&path) {
            Some(MemEntry::Dir(_)) => Ok(()),
            Some(MemEntry::File(_)) => Err(FsError::already_exists(&path)),
            None => {
                entries.insert(path, MemEntry::Dir(MemDir::default()));
                Ok(())
            }
        }
    }

    /// Creates or replaces a file, creating missing ancestor folders.
    pub fn insert_file(&self, path: &str, content: impl Into<Vec<u8>>) -> FsResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(FsError::is_directory(&path));
        }
        let mut entries = self.entries_mut();
        Self::create_ancestors(&mut entries, &path)?;
        if let Some(MemEntry::Dir(_)) = entries.get(&path) {
            return Err(FsError::is_directory(&path));
        }
        entries.insert(
            path,
            MemEntry::File(MemFile {
                content: content.into(),
                mtime: SystemTime::now(),
            }),
        );
        Ok(())
    }

    fn create_ancestors(entries: &mut HashMap<String, MemEntry>, path: &str) -> FsResult<()> {
        let mut missing = Vec::new();
        let mut current = parent_path(path);
        while let Some(dir) = current {
            match entries.get(&dir) {
                Some(MemEntry::Dir(_)) => break,
                Some(MemEntry::File(_)) => return Err(FsError::not_directory(&dir)),
                None => {
                    current = parent_path(&dir);
                    missing.push(dir);
                }
            }
        }
        for dir in missing.into_iter().rev() {
            entries.insert(dir, MemEntry::Dir(MemDir::default()));
        }
        Ok(())
    }
}

#[async_trait]
impl FsProvider for MemoryFs {
    async fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let path = normalize_path(path);
        self.entries()
            .get(&path)
            .map(|e| e.to_file_info(&path))
            .ok_or_else(|| FsError::not_found(&path))
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let path = normalize_path(path);
        let entries = self.entries();

        let entry = entries.get(&path).ok_or_else(|| FsError::not_found(&path))?;
        if !matches!(entry, MemEntry::Dir(_)) {
            return Err(FsError::not_directory(&path));
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };

        let mut results: Vec<FileInfo> = entries
            .iter()
            .filter(|(entry_path, _)| {
                entry_path.len() > prefix.len()
                    && entry_path.starts_with(&prefix)
                    && !entry_path[prefix.len()..].contains('/')
            })
            .map(|(entry_path, entry)| entry.to_file_info(entry_path))
            .collect();

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    async fn read(&self, path: &str) -> FsResult<Bytes> {
        let path = normalize_path(path);
        match self.entries().get(&path) {
            Some(MemEntry::File(f)) => Ok(Bytes::copy_from_slice(&f.content)),
            Some(MemEntry::Dir(_)) => Err(FsError::is_directory(&path)),
            None => Err(FsError::not_found(&path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserted_file_reads_back() {
        let fs = MemoryFs::new();
        fs.insert_file("/test.txt", "hello world").unwrap();

        let data = fs.read("/test.txt").await.unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn readdir_lists_children_in_order() {
        let fs = MemoryFs::new();
        fs.insert_file("/mydir/file2.txt", "content2").unwrap();
        fs.insert_file("/mydir/file1.txt", "content1").unwrap();

        let entries = fs.readdir("/mydir").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/mydir/file1.txt");
        assert_eq!(entries[1].path, "/mydir/file2.txt");
    }

    #[tokio::test]
    async fn readdir_does_not_descend() {
        let fs = MemoryFs::new();
        fs.insert_file("/a/b/c.txt", "x").unwrap();

        let entries = fs.readdir("/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/a");
        assert!(entries[0].is_dir());
    }

    #[tokio::test]
    async fn readdir_of_file_fails() {
        let fs = MemoryFs::new();
        fs.insert_file("/f.txt", "x").unwrap();
        assert!(matches!(fs.readdir("/f.txt").await, Err(FsError::NotDirectory(_))));
        assert!(matches!(fs.read("/").await, Err(FsError::IsDirectory(_))));
    }

    #[tokio::test]
    async fn stat_file() {
        let fs = MemoryFs::new();
        fs.insert_file("/test.txt", "hello").unwrap();

        let info = fs.stat("/test.txt").await.unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.file_type, FileType::Regular);
        assert!(matches!(fs.stat("/missing").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn insert_helpers_create_ancestors() {
        let fs = MemoryFs::new();
        fs.insert_dir("/x/y/z").unwrap();
        fs.insert_file("/x/y/z/f.txt", "data").unwrap();

        assert!(fs.stat("/x").await.unwrap().is_dir());
        assert!(fs.stat("/x/y").await.unwrap().is_dir());
        assert_eq!(fs.stat("/x/y/z/f.txt").await.unwrap().size, 4);
    }

    #[test]
    fn insert_conflicts_fail() {
        let fs = MemoryFs::new();
        fs.insert_file("/f", "data").unwrap();
        assert!(matches!(fs.insert_file("/f/g", "x"), Err(FsError::NotDirectory(_))));
        assert!(matches!(fs.insert_dir("/f"), Err(FsError::AlreadyExists(_))));
        assert!(matches!(fs.insert_file("/", "x"), Err(FsError::IsDirectory(_))));
    }
}
