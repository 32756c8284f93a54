use async_trait::async_trait;
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use vsh_sdk::{FileInfo, FileType, FsError, FsProvider, FsResult};

/// Provider over a directory of the host filesystem.
#[derive(Debug)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl AsRef<Path>) -> FsResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(FsError::not_found(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(FsError::not_directory(root.display().to_string()));
        }

        // Normalize symlinks to make `starts_with` comparisons reliable (e.g., /var vs /private/var on macOS).
        let root = root
            .canonicalize()
            .map_err(|e| FsError::internal(format!("Failed to canonicalize root: {e}")))?;

        Ok(Self { root })
    }

    fn resolve_path(&self, path: &str) -> FsResult<PathBuf> {
        let path = path.trim_start_matches('/');
        let full_path = if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        };

        let canonical = full_path.canonicalize().unwrap_or_else(|_| full_path.clone());

        if !canonical.starts_with(&self.root) {
            return Err(FsError::permission_denied("path escapes root"));
        }

        Ok(full_path)
    }

    fn metadata_to_file_info(path: &str, meta: &fs::Metadata) -> FileInfo {
        let file_type = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::Regular
        };

        FileInfo {
            path: path.to_string(),
            size: meta.len(),
            file_type,
            mtime: meta.modified().unwrap_or(UNIX_EPOCH),
        }
    }
}

#[async_trait]
impl FsProvider for LocalFs {
    async fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let full_path = self.resolve_path(path)?;
        let meta = fs::metadata(&full_path).map_err(|e| map_io_error(&e, path))?;
        Ok(Self::metadata_to_file_info(path, &meta))
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let full_path = self.resolve_path(path)?;
        let entries = fs::read_dir(&full_path).map_err(|e| map_io_error(&e, path))?;

        let mut results = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::internal(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let entry_path = format!("{}/{}", path.trim_end_matches('/'), name);
            // Dangling symlinks are skipped rather than failing the whole listing.
            let Ok(meta) = fs::metadata(entry.path()) else {
                continue;
            };
            results.push(Self::metadata_to_file_info(&entry_path, &meta));
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    async fn read(&self, path: &str) -> FsResult<Bytes> {
        let full_path = self.resolve_path(path)?;
        if full_path.is_dir() {
            return Err(FsError::is_directory(path));
        }
        fs::read(&full_path)
            .map(Bytes::from)
            .map_err(|e| map_io_error(&e, path))
    }
}

fn map_io_error(err: &std::io::Error, path: &str) -> FsError {
    match err.kind() {
        std::io::ErrorKind::NotFound => FsError::not_found(path),
        std::io::ErrorKind::PermissionDenied => FsError::permission_denied(path),
        std::io::ErrorKind::NotADirectory => FsError::not_directory(path),
        std::io::ErrorKind::IsADirectory => FsError::is_directory(path),
        _ => FsError::internal(format!("{path}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalFs) {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();
        (temp, fs)
    }

    #[tokio::test]
    async fn read_host_file() {
        let (temp, fs) = setup();
        std::fs::write(temp.path().join("test.txt"), "hello world").unwrap();

        let data = fs.read("/test.txt").await.unwrap();
        assert_eq!(&data[..], b"hello world");
        assert_eq!(fs.stat("/test.txt").await.unwrap().size, 11);
    }

    #[tokio::test]
    async fn stat_directory() {
        let (temp, fs) = setup();
        std::fs::create_dir(temp.path().join("mydir")).unwrap();

        let info = fs.stat("/mydir").await.unwrap();
        assert!(info.is_dir());
        assert!(fs.stat("/").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn readdir_contents() {
        let (temp, fs) = setup();
        let dir = temp.path().join("dir");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("b.txt"), "").unwrap();
        std::fs::write(dir.join("a.txt"), "").unwrap();

        let entries = fs.readdir("/dir").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/dir/a.txt");
        assert_eq!(entries[1].path, "/dir/b.txt");
    }

    #[tokio::test]
    async fn read_directory_fails() {
        let (temp, fs) = setup();
        std::fs::create_dir(temp.path().join("dir")).unwrap();
        assert!(matches!(fs.read("/dir").await, Err(FsError::IsDirectory(_))));
        assert!(matches!(fs.read("/missing").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_root_rejected() {
        let temp = TempDir::new().unwrap();
        let result = LocalFs::new(temp.path().join("nope"));
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn path_escape_blocked() {
        let (_temp, fs) = setup();

        let result = fs.stat("/../../../etc/passwd").await;
        assert!(result.is_err());
    }
}
