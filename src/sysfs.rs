use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Filesystem root that every `/sys`, `/dev` and `/proc` path is resolved against.
/// `/` on a real machine, a temp directory in tests.
#[derive(Debug, Clone)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl SysfsRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `path("dev/port")` -> `/dev/port` or `<test_root>/dev/port`
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Read a file, returning None if it is missing or unreadable for permission reasons.
    pub fn read_optional(&self, relative: impl AsRef<Path>) -> Result<Option<String>> {
        let path = self.path(relative);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(None),
            Err(e) => Err(Error::SysfsRead { path, source: e }),
        }
    }

    /// List entries in a directory, sorted by name.
    pub fn list_dir(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.path(relative);
        let entries = std::fs::read_dir(&path).map_err(|e| Error::SysfsRead {
            path: path.clone(),
            source: e,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::SysfsRead {
                path: path.clone(),
                source: e,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
