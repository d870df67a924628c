//! Secrets stored as JSON files

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::{SecretStore, parse_payload, unavailable};
use crate::error::{Result, SecretFailure};

/// Reads secret `name` from `{dir}/{name}.json`
#[derive(Clone, Debug)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Store rooted at `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        // Secret names are opaque but never paths
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        Some(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Map<String, Value>> {
        let Some(path) = self.path_for(name) else {
            return Err(unavailable(name, SecretFailure::NotFound));
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => parse_payload(name, &raw),
            Err(e) => {
                let reason = match e.kind() {
                    std::io::ErrorKind::NotFound => SecretFailure::NotFound,
                    std::io::ErrorKind::PermissionDenied => SecretFailure::AccessDenied,
                    std::io::ErrorKind::InvalidData => {
                        SecretFailure::Malformed("payload is not valid UTF-8".to_string())
                    }
                    _ => SecretFailure::Backend(e.to_string()),
                };
                tracing::error!(secret = name, path = ?path, error = %e, "Error fetching secret");
                Err(unavailable(name, reason))
            }
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_secret_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("sftp-us-server-details.json"),
            r#"{"sftp_username":"dealerware_invmon","sftp_password":"pw"}"#,
        )
        .unwrap();

        let store = FileSecretStore::new(dir.path().to_path_buf());
        let payload = store.get_secret("sftp-us-server-details").await.unwrap();
        assert_eq!(payload["sftp_username"], "dealerware_invmon");
    }

    #[tokio::test]
    async fn test_missing_file_and_path_names() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().to_path_buf());
        assert_eq!(
            store.get_secret("nope").await.unwrap_err().error_code(),
            "secret_not_found"
        );
        assert_eq!(
            store.get_secret("../etc/passwd").await.unwrap_err().error_code(),
            "secret_not_found"
        );
    }

    #[tokio::test]
    async fn test_non_object_payload_is_malformed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("s.json"), "\"just a string\"").unwrap();
        let store = FileSecretStore::new(dir.path().to_path_buf());
        assert_eq!(
            store.get_secret("s").await.unwrap_err().error_code(),
            "secret_malformed"
        );
    }
}
