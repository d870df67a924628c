//! Test configuration helpers backed by temporary directories

use feed_landing::Config;
use feed_landing::config::{RetryConfig, SecretsConfig, StorageConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Temporary landing zone, secret directory and SFTP mirror
pub struct TestWorkspace {
    /// Keeps the directories alive for the test's duration
    pub root: TempDir,
}

impl TestWorkspace {
    /// Fresh workspace with empty `landing/`, `secrets/` and `mirror/`
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        for dir in ["landing", "secrets", "mirror"] {
            std::fs::create_dir_all(root.path().join(dir))
                .unwrap_or_else(|e| panic!("create {dir}: {e}"));
        }
        Self { root }
    }

    /// Landing zone root (one directory per bucket)
    pub fn landing(&self) -> PathBuf {
        self.root.path().join("landing")
    }

    /// Secret directory
    pub fn secrets(&self) -> PathBuf {
        self.root.path().join("secrets")
    }

    /// SFTP mirror root
    pub fn mirror(&self) -> PathBuf {
        self.root.path().join("mirror")
    }

    /// Write secret `name` as `{secrets}/{name}.json`
    pub fn write_secret(&self, name: &str, payload: Value) {
        let path = self.secrets().join(format!("{name}.json"));
        std::fs::write(&path, payload.to_string())
            .unwrap_or_else(|e| panic!("write secret {}: {e}", path.display()));
    }

    /// Base configuration using file secrets, local storage and fast retries
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.secrets = SecretsConfig::File { dir: self.secrets() };
        config.storage = StorageConfig::Local { root: self.landing() };
        config.retry = fast_retry();
        config
    }
}

/// Retry policy with millisecond delays
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Every regular file below `dir`, sorted
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}
