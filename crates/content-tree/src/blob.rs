//! Blob storage for uploaded files.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const CHUNK_SIZE: usize = 64 * 1024;
const MEMORY_SCHEME: &str = "mem://";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
    #[error("Not a reference into this store: {0}")]
    InvalidReference(String),
    #[error("Blob not found: {0}")]
    NotFound(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self { file_name, bytes })
    }
}

/// Bytes written so far out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub transferred: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.transferred as f64 / self.total as f64 * 100.0
        }
    }
}

pub trait BlobStore: Send + Sync {
    /// Store bytes at a storage path and return their download URL.
    fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        progress: &mut dyn FnMut(UploadProgress),
    ) -> BlobResult<String>;

    /// Remove the blob a download URL points at.
    fn delete(&self, url: &str) -> BlobResult<()>;
}

/// Blobs as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    /// URLs default to `file://{root}/{path}`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let base_url = format!("file://{}", root.display());
        Self { root, base_url }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn file_for_url(&self, url: &str) -> BlobResult<PathBuf> {
        let relative = url
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BlobError::InvalidReference(url.to_string()))?;
        checked_relative(relative)
            .map(|p| self.root.join(p))
            .map_err(|_| BlobError::InvalidReference(url.to_string()))
    }
}

impl BlobStore for FsBlobStore {
    fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        progress: &mut dyn FnMut(UploadProgress),
    ) -> BlobResult<String> {
        let target = self.root.join(checked_relative(path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let total = bytes.len() as u64;
        let mut file = fs::File::create(&target)?;
        let mut transferred = 0u64;
        if bytes.is_empty() {
            progress(UploadProgress { transferred, total });
        }
        for chunk in bytes.chunks(CHUNK_SIZE) {
            file.write_all(chunk)?;
            transferred += chunk.len() as u64;
            progress(UploadProgress { transferred, total });
        }
        file.flush()?;

        tracing::debug!(path, total, "uploaded blob");
        Ok(self.url_for(path))
    }

    fn delete(&self, url: &str) -> BlobResult<()> {
        let file = self.file_for_url(url)?;
        match fs::remove_file(&file) {
            Ok(()) => {
                tracing::debug!(url, "deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(url.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Blobs kept in memory, with a log of deletions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        let blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        url.strip_prefix(MEMORY_SCHEME)
            .is_some_and(|path| blobs.contains_key(path))
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// URLs deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        progress: &mut dyn FnMut(UploadProgress),
    ) -> BlobResult<String> {
        checked_relative(path)?;
        let total = bytes.len() as u64;
        self.blobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.to_string(), bytes.to_vec());
        progress(UploadProgress { transferred: total, total });
        Ok(format!("{MEMORY_SCHEME}{path}"))
    }

    fn delete(&self, url: &str) -> BlobResult<()> {
        let path = url
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| BlobError::InvalidReference(url.to_string()))?;
        let removed = self
            .blobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(path);
        match removed {
            Some(_) => {
                self.deleted
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(url.to_string());
                Ok(())
            }
            None => Err(BlobError::NotFound(url.to_string())),
        }
    }
}

/// Storage paths are relative and may not climb out of the root.
fn checked_relative(path: &str) -> BlobResult<PathBuf> {
    let candidate = Path::new(path);
    let valid = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(candidate.to_path_buf())
    } else {
        Err(BlobError::InvalidPath(path.to_string()))
    }
}
