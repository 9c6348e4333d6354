//! Staging: temporary files that become artifacts by atomic rename.
//!
//! Every write lands in a uniquely named `.tmp-<uuid>` file in the same
//! directory as its final path, is synced, and is then renamed into place.
//! Readers therefore see either no artifact or a complete one. A staging file
//! that is dropped without being persisted is removed.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{CasError, Result};

/// Filename prefix shared by all staging files.
pub const STAGING_PREFIX: &str = ".tmp-";

/// Whether a directory entry name belongs to a staging file.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

/// A handle to an in-progress write.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    file: Option<File>,
    persisted: bool,
}

impl StagingFile {
    /// Create a new staging file inside `dir`.
    pub fn create_in(dir: &Path) -> Result<Self> {
        let path = dir.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));
        let file = File::create_new(&path).map_err(CasError::io("create staging file"))?;

        Ok(Self {
            path,
            file: Some(file),
            persisted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append data to the staging file.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(CasError::Io {
            op: "write staging file",
            source: std::io::Error::other("staging file already closed"),
        })?;
        file.write_all(data)
            .map_err(CasError::io("write staging file"))?;
        Ok(())
    }

    /// Flush and fsync, then atomically rename onto `dest`.
    ///
    /// `dest` must be on the same filesystem; callers keep staging files in
    /// the destination directory.
    pub fn persist(mut self, dest: &Path) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(CasError::io("flush staging file"))?;
            file.sync_all().map_err(CasError::io("sync staging file"))?;
        }
        fs::rename(&self.path, dest).map_err(CasError::io("rename staging file"))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.persisted {
            self.file = None;
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_name_is_recognised() {
        let dir = TempDir::new().unwrap();
        let staging = StagingFile::create_in(dir.path()).unwrap();
        let name = staging.path().file_name().unwrap().to_string_lossy();
        assert!(is_staging_name(&name));
        assert!(!is_staging_name("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"));
    }

    #[test]
    fn test_staging_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = StagingFile::create_in(dir.path()).unwrap();
        let b = StagingFile::create_in(dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_persist_renames_into_place() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("artifact");

        let mut staging = StagingFile::create_in(dir.path()).unwrap();
        staging.write(b"Hello, ").unwrap();
        staging.write(b"World!").unwrap();

        let staging_path = staging.path().to_path_buf();
        staging.persist(&dest).unwrap();

        assert!(!staging_path.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_drop_without_persist_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut staging = StagingFile::create_in(dir.path()).unwrap();
            staging.write(b"abandoned").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_persist_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("artifact");
        fs::write(&dest, b"same").unwrap();

        let mut staging = StagingFile::create_in(dir.path()).unwrap();
        staging.write(b"same").unwrap();
        staging.persist(&dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"same");
    }
}
