//! Storage paths for engine data.
//!
//! All path decisions live here so tests can inject a temp root and the UI
//! layer never hardcodes file locations.

use std::path::{Path, PathBuf};

/// Central configuration for engine storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.vigia`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        Self {
            root: home.join(".vigia"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to rounds.json (finalized round records).
    pub fn rounds_file(&self) -> PathBuf {
        self.root.join("rounds.json")
    }

    /// Path to channel-index.json (cross-round aggregate of last-known
    /// channel status per subject).
    pub fn index_file(&self) -> PathBuf {
        self.root.join("channel-index.json")
    }

    /// Path to engine.json (operator-tunable engine knobs).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("engine.json")
    }
}
