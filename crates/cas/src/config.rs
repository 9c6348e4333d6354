//! CAS configuration.
//!
//! Loading from files and the environment is the job of `turboconf`; this
//! type only carries the values the store itself needs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::hash::ContentHash;

/// How artifact files are laid out under the base path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreLayout {
    /// `{base_path}/{hash}` - one flat directory.
    #[default]
    Flat,
    /// `{base_path}/{hash[0..2]}/{hash}` - bounds directory entry counts.
    Sharded,
}

impl std::str::FromStr for StoreLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(StoreLayout::Flat),
            "sharded" => Ok(StoreLayout::Sharded),
            other => Err(format!("unknown store layout: {other}")),
        }
    }
}

/// Configuration for Content Addressable Storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasConfig {
    /// Directory holding artifact files and in-flight staging files.
    pub base_path: PathBuf,

    #[serde(default)]
    pub layout: StoreLayout,

    /// Read-only mode - prevents any writes.
    #[serde(default)]
    pub read_only: bool,
}

impl CasConfig {
    /// Create a config with a specific base path.
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            layout: StoreLayout::Flat,
            read_only: false,
        }
    }

    /// Create a read-only config with a specific base path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::with_base_path(path)
        }
    }

    pub fn with_layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory an artifact file lives in.
    pub fn artifact_dir(&self, hash: &ContentHash) -> PathBuf {
        match self.layout {
            StoreLayout::Flat => self.base_path.clone(),
            StoreLayout::Sharded => self.base_path.join(hash.prefix()),
        }
    }

    /// Final path of an artifact file.
    pub fn artifact_path(&self, hash: &ContentHash) -> PathBuf {
        self.artifact_dir(hash).join(hash.as_str())
    }
}
