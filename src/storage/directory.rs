//! Directory abstraction over the backing store.
//!
//! Paths are relative to the store root. Directory creation is split in
//! two: `make_dirs` begins a directory, `create` marks it durable. Readers
//! that enumerate segments must skip directories that were begun but never
//! created.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Marker written last into a durable directory.
pub const CREATED_MARKER: &str = ".created";

pub trait Directory: Send + Sync {
    /// Begin a directory (and its parents). Not yet durable.
    fn make_dirs(&self, path: &Path) -> Result<()>;

    /// Mark a begun directory as durable.
    fn create(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn is_created(&self, path: &Path) -> bool;

    /// Recursively delete a directory.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Names of the immediate subdirectories, unsorted.
    fn list_directories(&self, path: &Path) -> Result<Vec<String>>;

    fn get_property(&self, path: &Path, name: &str) -> Result<Option<String>>;

    /// Write (`Some`) or clear (`None`) a property. Writes are atomic.
    fn put_property(&self, path: &Path, name: &str, value: Option<&str>) -> Result<()>;

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
}

// ── Filesystem Directory ───────────────────────────────────────────

/// `Directory` backed by the local filesystem under `root`.
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl Directory for FsDirectory {
    fn make_dirs(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn create(&self, path: &Path) -> Result<()> {
        std::fs::write(self.resolve(path).join(CREATED_MARKER), b"")?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn is_created(&self, path: &Path) -> bool {
        self.resolve(path).join(CREATED_MARKER).is_file()
    }

    fn delete(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn list_directories(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn get_property(&self, path: &Path, name: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.resolve(path).join(name)) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_property(&self, path: &Path, name: &str, value: Option<&str>) -> Result<()> {
        let target = self.resolve(path).join(name);
        match value {
            Some(value) => {
                // Rename is the single visible write.
                let tmp = self.resolve(path).join(format!("{}.tmp", name));
                std::fs::write(&tmp, value)?;
                std::fs::rename(&tmp, &target)?;
            }
            None => match std::fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, bytes)?;
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.resolve(path))?)
    }
}
