//! On-disk file system rooted at a workspace directory

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use devins_compiler::capability::normalize_path;
use devins_compiler::{CapabilityError, CapabilityResult, FileHandle, FileSystem};

/// Directories never listed by pattern-actions
const SKIPPED_DIRS: [&str; 3] = [".git", "target", "node_modules"];

/// [`FileSystem`] over a directory on disk
///
/// Paths are relative to the root. [`normalize_path`] drops a leading `/`,
/// so `/etc/hosts` names `<root>/etc/hosts`, and rejects any `..` segment.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// File system rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_error(path: &str, err: std::io::Error) -> CapabilityError {
        match err.kind() {
            ErrorKind::NotFound => CapabilityError::FileNotFound {
                path: path.to_string(),
            },
            _ => CapabilityError::Io {
                path: path.to_string(),
                message: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn resolve(&self, path: &str) -> Option<FileHandle> {
        let path = normalize_path(path)?;
        Some(FileHandle {
            location: self.root.join(&path),
            path,
        })
    }

    async fn read(&self, handle: &FileHandle) -> CapabilityResult<String> {
        tokio::fs::read_to_string(&handle.location)
            .await
            .map_err(|e| Self::io_error(&handle.path, e))
    }

    async fn write(&self, handle: &FileHandle, text: &str) -> CapabilityResult<()> {
        if let Some(parent) = handle.location.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(&handle.path, e))?;
        }
        tokio::fs::write(&handle.location, text)
            .await
            .map_err(|e| Self::io_error(&handle.path, e))?;
        tracing::debug!(path = %handle.path, bytes = text.len(), "wrote file");
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let location = match normalize_path(path) {
            Some(path) => self.root.join(path),
            None => return false,
        };
        tokio::fs::try_exists(location).await.unwrap_or(false)
    }

    async fn list(&self, dir: &str, recursive: bool) -> CapabilityResult<Vec<String>> {
        let prefix = normalize_path(dir);
        let base = match &prefix {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        };
        let root = self.root.clone();

        let listing = tokio::task::spawn_blocking(move || {
            if recursive {
                walk(&root, &base)
            } else {
                read_dir(&root, &base)
            }
        })
        .await
        .map_err(|e| CapabilityError::Other(format!("listing task failed: {e}")))?;

        listing.map_err(|e| Self::io_error(prefix.as_deref().unwrap_or("."), e))
    }
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn walk(root: &Path, base: &Path) -> std::io::Result<Vec<String>> {
    if !base.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let entries = walkdir::WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        });
    for entry in entries {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file()
            && let Some(path) = relative(root, entry.path())
        {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_dir(root: &Path, base: &Path) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let Some(mut path) = relative(root, &entry.path()) else {
            continue;
        };
        if entry.file_type()?.is_dir() {
            path.push('/');
        }
        out.push(path);
    }
    out.sort();
    Ok(out)
}
