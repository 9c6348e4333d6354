//! FileStore: Filesystem-based Content Addressable Storage.
//!
//! Implements the ContentStore trait on a local directory. One regular file
//! per artifact, named by its hex hash, holding the raw payload.
//!
//! Layout (flat, the default):
//! ```text
//! {base_path}/
//! ├── 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
//! ├── e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
//! └── .tmp-6f1c...        # in-flight write, renamed into place when done
//! ```
//!
//! Layout (sharded):
//! ```text
//! {base_path}/
//! ├── 2c/
//! │   └── 2cf24dba5fb0...
//! └── e3/
//!     └── e3b0c44298fc...
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::CasConfig;
use crate::error::{CasError, Result};
use crate::hash::ContentHash;
use crate::staging::{is_staging_name, StagingFile};

/// Trait for content storage backends.
///
/// All methods block; async callers run them on a blocking thread.
pub trait ContentStore: Send + Sync {
    /// Store `data` under `hash` after verifying `hash == SHA-256(data)`.
    ///
    /// A mismatch fails with `CasError::HashMismatch` and touches nothing.
    fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<()>;

    /// Retrieve data by its content hash.
    ///
    /// Returns `Ok(None)` if the hash doesn't exist.
    fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>>;

    /// Remove content. Removing absent content succeeds.
    fn delete(&self, hash: &ContentHash) -> Result<()>;

    /// Remove every stored artifact.
    fn clear(&self) -> Result<()>;

    /// Check if content exists without retrieving it.
    fn exists(&self, hash: &ContentHash) -> bool;
}

/// Totals reported by `FileStore::usage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub artifacts: u64,
    pub bytes: u64,
}

/// Filesystem-based content store.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: CasConfig,
}

impl FileStore {
    /// Capture configuration. Touches nothing on disk; call `initialize`
    /// (or use `open`) before serving requests.
    pub fn new(config: CasConfig) -> Self {
        Self { config }
    }

    /// Create the storage directory if needed and sweep orphaned staging
    /// files. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        if !self.config.read_only {
            fs::create_dir_all(&self.config.base_path)
                .map_err(CasError::io("create CAS directory"))?;
            let swept = self.sweep_staging()?;
            if swept > 0 {
                warn!(count = swept, "removed orphaned staging files");
            }
        } else if !self.config.base_path.is_dir() {
            return Err(CasError::Io {
                op: "open read-only CAS directory",
                source: std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("{} is not a directory", self.config.base_path.display()),
                ),
            });
        }

        info!(dir = %self.config.base_path.display(), layout = ?self.config.layout, "cache directory initialized");
        Ok(())
    }

    /// `new` followed by `initialize`.
    pub fn open(config: CasConfig) -> Result<Self> {
        let store = Self::new(config);
        store.initialize()?;
        Ok(store)
    }

    /// Open a writable flat FileStore at a specific path.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(CasConfig::with_base_path(path))
    }

    /// Open a read-only FileStore at a specific path.
    pub fn read_only_at(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(CasConfig::read_only(path))
    }

    /// Count stored artifacts and their total size.
    pub fn usage(&self) -> Result<StoreUsage> {
        let mut usage = StoreUsage::default();
        for path in self.artifact_files()? {
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                // Deleted between listing and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CasError::Io { op: "stat artifact", source: e }),
            };
            usage.artifacts += 1;
            usage.bytes += meta.len();
        }
        Ok(usage)
    }

    /// Remove staging files left behind by an interrupted process.
    ///
    /// Only safe while no writes are in flight, i.e. at startup.
    pub fn sweep_staging(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in self.candidate_dirs()? {
            for entry in read_dir_or_empty(&dir)? {
                let entry = entry.map_err(CasError::io("read CAS directory"))?;
                if is_staging_name(&entry.file_name().to_string_lossy()) {
                    match fs::remove_file(entry.path()) {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(CasError::Io { op: "remove staging file", source: e }),
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Open a staging file beside the artifact's final path.
    ///
    /// A missing shard directory is created and the open retried once; `clear`
    /// removes empty shards and may race with a write.
    fn stage_for(&self, hash: &ContentHash) -> Result<StagingFile> {
        let dir = self.config.artifact_dir(hash);
        match StagingFile::create_in(&dir) {
            Err(CasError::Io { source, .. })
                if source.kind() == ErrorKind::NotFound && dir != self.config.base_path =>
            {
                fs::create_dir_all(&dir).map_err(CasError::io("create shard directory"))?;
                StagingFile::create_in(&dir)
            }
            result => result,
        }
    }

    /// The base directory plus any two-hex-char shard directories.
    ///
    /// Both are scanned regardless of the configured layout so that clear and
    /// usage see artifacts written before a layout change.
    fn candidate_dirs(&self) -> Result<Vec<PathBuf>> {
        let base = &self.config.base_path;
        let mut dirs = vec![base.clone()];
        for entry in read_dir_or_empty(base)? {
            let entry = entry.map_err(CasError::io("read CAS directory"))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_shard = name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit());
            if is_shard && entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    /// Paths of all files whose name is a valid content hash.
    fn artifact_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in self.candidate_dirs()? {
            for entry in read_dir_or_empty(&dir)? {
                let entry = entry.map_err(CasError::io("read CAS directory"))?;
                let is_artifact = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ContentHash::from_str_checked(name).is_ok());
                if is_artifact && entry.path().is_file() {
                    files.push(entry.path());
                }
            }
        }
        Ok(files)
    }
}

fn read_dir_or_empty(dir: &Path) -> Result<Vec<std::io::Result<fs::DirEntry>>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries.collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(CasError::Io { op: "read CAS directory", source: e }),
    }
}

impl ContentStore for FileStore {
    fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<()> {
        if self.config.read_only {
            return Err(CasError::ReadOnly);
        }

        let actual = ContentHash::from_data(data);
        if actual != *hash {
            return Err(CasError::HashMismatch {
                expected: hash.clone(),
                actual,
            });
        }

        let mut staging = self.stage_for(hash)?;
        staging.write(data)?;
        staging.persist(&self.config.artifact_path(hash))?;

        debug!(%hash, size = data.len(), "artifact stored");
        Ok(())
    }

    fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>> {
        match fs::read(self.config.artifact_path(hash)) {
            Ok(data) => {
                debug!(%hash, size = data.len(), "cache hit");
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%hash, "cache miss");
                Ok(None)
            }
            Err(e) => Err(CasError::Io { op: "read artifact", source: e }),
        }
    }

    fn delete(&self, hash: &ContentHash) -> Result<()> {
        if self.config.read_only {
            return Err(CasError::ReadOnly);
        }

        match fs::remove_file(self.config.artifact_path(hash)) {
            Ok(()) => {
                debug!(%hash, "artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CasError::Io { op: "delete artifact", source: e }),
        }
    }

    fn clear(&self) -> Result<()> {
        if self.config.read_only {
            return Err(CasError::ReadOnly);
        }

        let mut removed = 0usize;
        for path in self.artifact_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CasError::Io { op: "clear artifact", source: e }),
            }
        }

        // Drop shard directories that are now empty; a shard still holding an
        // in-flight staging file stays.
        for dir in self.candidate_dirs()?.into_iter().skip(1) {
            let _ = fs::remove_dir(dir);
        }

        info!(removed, "cache cleared");
        Ok(())
    }

    fn exists(&self, hash: &ContentHash) -> bool {
        self.config.artifact_path(hash).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreLayout;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn zeros() -> ContentHash {
        "0".repeat(64).parse().unwrap()
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_put_and_get() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let data = b"Hello, World!";
        let hash = ContentHash::from_data(data);
        store.put(&hash, data)?;

        let retrieved = store.get(&hash)?.expect("should exist");
        assert_eq!(retrieved, data);

        Ok(())
    }

    #[test]
    fn test_flat_layout_on_disk() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let hash: ContentHash = HELLO_SHA256.parse()?;
        store.put(&hash, b"hello")?;

        assert_eq!(dir_names(temp_dir.path()), vec![HELLO_SHA256.to_string()]);
        assert_eq!(fs::read(temp_dir.path().join(HELLO_SHA256)).unwrap(), b"hello");
        Ok(())
    }

    #[test]
    fn test_sharded_layout_round_trip() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config = CasConfig::with_base_path(temp_dir.path()).with_layout(StoreLayout::Sharded);
        let store = FileStore::open(config)?;

        let hash: ContentHash = HELLO_SHA256.parse()?;
        store.put(&hash, b"hello")?;

        assert!(temp_dir.path().join("2c").join(HELLO_SHA256).is_file());
        assert_eq!(store.get(&hash)?.as_deref(), Some(&b"hello"[..]));
        Ok(())
    }

    #[test]
    fn test_hash_mismatch_stores_nothing() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let err = store.put(&zeros(), b"hello").unwrap_err();
        match err {
            CasError::HashMismatch { expected, actual } => {
                assert_eq!(expected, zeros());
                assert_eq!(actual.as_str(), HELLO_SHA256);
            }
            other => panic!("expected HashMismatch, got {other:?}"),
        }

        assert!(store.get(&zeros())?.is_none());
        assert!(dir_names(temp_dir.path()).is_empty(), "no staging files left behind");
        Ok(())
    }

    #[test]
    fn test_get_missing_is_none() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        assert!(store.get(&zeros())?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let hash = ContentHash::from_data(b"delete me");
        store.delete(&hash)?;

        store.put(&hash, b"delete me")?;
        store.delete(&hash)?;
        store.delete(&hash)?;

        assert!(store.get(&hash)?.is_none());
        Ok(())
    }

    #[test]
    fn test_rewrite_same_content() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let data = b"Duplicate Me";
        let hash = ContentHash::from_data(data);
        store.put(&hash, data)?;
        store.put(&hash, data)?;

        assert_eq!(store.get(&hash)?.as_deref(), Some(&data[..]));
        assert_eq!(store.usage()?.artifacts, 1);
        Ok(())
    }

    #[test]
    fn test_exists() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let hash = ContentHash::from_data(b"existence test");
        store.put(&hash, b"existence test")?;
        assert!(store.exists(&hash));
        assert!(!store.exists(&zeros()));

        Ok(())
    }

    #[test]
    fn test_clear_removes_artifacts_only() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let a = ContentHash::from_data(b"a");
        let b = ContentHash::from_data(b"b");
        store.put(&a, b"a")?;
        store.put(&b, b"b")?;
        fs::write(temp_dir.path().join("README"), b"not an artifact").unwrap();

        store.clear()?;

        assert!(store.get(&a)?.is_none());
        assert!(store.get(&b)?.is_none());
        assert_eq!(dir_names(temp_dir.path()), vec!["README".to_string()]);
        Ok(())
    }

    #[test]
    fn test_clear_sharded_removes_empty_shards() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config = CasConfig::with_base_path(temp_dir.path()).with_layout(StoreLayout::Sharded);
        let store = FileStore::open(config)?;

        let hash = ContentHash::from_data(b"hello");
        store.put(&hash, b"hello")?;
        store.clear()?;

        assert!(dir_names(temp_dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn test_sharded_put_recreates_cleared_shard() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config = CasConfig::with_base_path(temp_dir.path()).with_layout(StoreLayout::Sharded);
        let writer = FileStore::open(config.clone())?;
        let admin = FileStore::new(config);

        let hello = ContentHash::from_data(b"hello");
        writer.put(&hello, b"hello")?;
        admin.clear()?;
        assert!(!temp_dir.path().join("2c").exists());

        writer.put(&hello, b"hello")?;
        assert_eq!(writer.get(&hello)?.as_deref(), Some(&b"hello"[..]));
        Ok(())
    }

    #[test]
    fn test_usage_counts_bytes() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        store.put(&ContentHash::from_data(b"hello"), b"hello")?;
        store.put(&ContentHash::from_data(b"world!"), b"world!")?;

        assert_eq!(store.usage()?, StoreUsage { artifacts: 2, bytes: 11 });
        Ok(())
    }

    #[test]
    fn test_initialize_is_idempotent_and_sweeps_staging() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("nested").join("cache");

        let store = FileStore::new(CasConfig::with_base_path(&base));
        assert!(!base.exists(), "new() must not touch the filesystem");

        store.initialize()?;
        fs::write(base.join(".tmp-deadbeef"), b"partial").unwrap();
        store.initialize()?;

        assert!(base.is_dir());
        assert!(dir_names(&base).is_empty());
        Ok(())
    }

    #[test]
    fn test_initialize_fails_when_path_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("occupied");
        fs::write(&file, b"x").unwrap();

        let result = FileStore::at_path(&file);
        assert!(matches!(result, Err(CasError::Io { .. })));
    }

    #[test]
    fn test_read_only_prevents_writes() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::read_only_at(temp_dir.path())?;

        let hash = ContentHash::from_data(b"should fail");
        assert!(matches!(store.put(&hash, b"should fail"), Err(CasError::ReadOnly)));
        assert!(matches!(store.delete(&hash), Err(CasError::ReadOnly)));
        assert!(matches!(store.clear(), Err(CasError::ReadOnly)));

        Ok(())
    }

    #[test]
    fn test_read_only_allows_reads() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        let writable = FileStore::at_path(temp_dir.path())?;
        let hash = ContentHash::from_data(b"readable content");
        writable.put(&hash, b"readable content")?;

        let readonly = FileStore::read_only_at(temp_dir.path())?;
        let data = readonly.get(&hash)?.expect("should be readable");
        assert_eq!(data, b"readable content");

        Ok(())
    }

    #[test]
    fn test_concurrent_writes() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::at_path(temp_dir.path())?);

        let data = b"Concurrent Data";
        let hash = ContentHash::from_data(data);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                let hash = hash.clone();
                thread::spawn(move || store.put(&hash, data).expect("write failed"))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&hash)?.as_deref(), Some(&data[..]));
        assert_eq!(dir_names(temp_dir.path()), vec![hash.to_string()]);

        Ok(())
    }

    #[test]
    fn test_throughput() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::at_path(temp_dir.path())?;

        let data = vec![0u8; 1024 * 1024]; // 1MB
        let hash = ContentHash::from_data(&data);

        let start = std::time::Instant::now();
        for _ in 0..10 {
            store.put(&hash, &data)?;
        }
        let duration = start.elapsed();

        println!("Wrote 10MB in {:?}", duration);
        assert!(
            duration.as_secs() < 10,
            "should write 10MB in under 10 seconds"
        );

        Ok(())
    }
}
