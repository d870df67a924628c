//! Out-of-band host key retrieval and pinning

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 22;

/// Source of a host's public RSA key
#[async_trait]
pub trait HostKeyFetcher: Send + Sync {
    /// Base64 body of the host's `ssh-rsa` key
    ///
    /// # Errors
    ///
    /// Returns `HostKeyUnavailable` when no RSA key can be obtained.
    async fn fetch_rsa_key(&self, host: &str, port: u16) -> Result<String>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Fetches keys with the external `ssh-keyscan` binary
///
/// ```no_run
/// use feed_landing::sftp::{HostKeyFetcher, KeyscanFetcher};
///
/// # async fn example() -> feed_landing::Result<()> {
/// if let Some(fetcher) = KeyscanFetcher::from_path() {
///     let key = fetcher.fetch_rsa_key("ftp.example.com", 22).await?;
///     println!("{key}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct KeyscanFetcher {
    binary_path: PathBuf,
}

impl KeyscanFetcher {
    /// Use an explicit `ssh-keyscan` binary
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Find `ssh-keyscan` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ssh-keyscan").ok().map(Self::new)
    }
}

#[async_trait]
impl HostKeyFetcher for KeyscanFetcher {
    async fn fetch_rsa_key(&self, host: &str, port: u16) -> Result<String> {
        let unavailable = |reason: String| Error::HostKeyUnavailable {
            host: host.to_string(),
            reason,
        };

        let mut command = Command::new(&self.binary_path);
        command.arg("-t").arg("rsa");
        if port != DEFAULT_PORT {
            command.arg("-p").arg(port.to_string());
        }
        let output = command
            .arg(host)
            .output()
            .await
            .map_err(|e| unavailable(format!("failed to execute ssh-keyscan: {e}")))?;

        if !output.status.success() {
            return Err(unavailable(format!(
                "ssh-keyscan exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_keyscan_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| unavailable("no ssh-rsa key in ssh-keyscan output".to_string()))
    }

    fn name(&self) -> &'static str {
        "ssh-keyscan"
    }
}

/// A fixed key, for hosts whose key is distributed out of band
#[derive(Clone, Debug)]
pub struct StaticHostKey {
    key: String,
}

impl StaticHostKey {
    /// Always answer with `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl HostKeyFetcher for StaticHostKey {
    async fn fetch_rsa_key(&self, host: &str, _port: u16) -> Result<String> {
        if self.key.trim().is_empty() {
            return Err(Error::HostKeyUnavailable {
                host: host.to_string(),
                reason: "empty static key".to_string(),
            });
        }
        Ok(self.key.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Base64 key of the first `ssh-rsa` line, comments ignored
pub(crate) fn parse_keyscan_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            let _host = parts.next()?;
            match (parts.next(), parts.next()) {
                (Some("ssh-rsa"), Some(key)) => Some(key.to_string()),
                _ => None,
            }
        })
}

/// A `known_hosts` file holding exactly the pinned key
#[derive(Debug)]
pub struct PinnedHostKey {
    path: PathBuf,
    entry: String,
    key: String,
    _temp: Option<tempfile::TempPath>,
}

impl PinnedHostKey {
    /// Write the entry to `path`, replacing its contents
    pub fn write(path: &Path, host: &str, port: u16, key: &str) -> Result<Self> {
        let entry = known_hosts_entry(host, port, key);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| pin_failed(host, e))?;
        }
        std::fs::write(path, format!("{entry}\n")).map_err(|e| pin_failed(host, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            entry,
            key: key.trim().to_string(),
            _temp: None,
        })
    }

    /// Write the entry to a temporary file removed on drop
    pub fn write_temporary(host: &str, port: u16, key: &str) -> Result<Self> {
        let entry = known_hosts_entry(host, port, key);
        let mut file = tempfile::NamedTempFile::new().map_err(|e| pin_failed(host, e))?;
        writeln!(file, "{entry}").map_err(|e| pin_failed(host, e))?;
        let temp = file.into_temp_path();
        Ok(Self {
            path: temp.to_path_buf(),
            entry,
            key: key.trim().to_string(),
            _temp: Some(temp),
        })
    }

    /// Location of the `known_hosts` file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The pinned line, `{host} ssh-rsa {key}`
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Whether the pinned entry is for `host`
    pub fn covers(&self, host: &str, port: u16) -> bool {
        self.entry
            .split_whitespace()
            .next()
            .is_some_and(|h| h == host_pattern(host, port))
    }
}

impl PinnedHostKey {
    /// Accept `presented` (the server's raw key blob) only if it is the pinned key
    ///
    /// # Errors
    ///
    /// Returns `HostKeyMismatch` when the entry is for another host or the
    /// key differs.
    pub fn verify(&self, host: &str, port: u16, presented: &[u8]) -> Result<()> {
        let mismatch = |reason: &str| Error::HostKeyMismatch {
            host: host_pattern(host, port),
            reason: reason.to_string(),
        };
        if !self.covers(host, port) {
            return Err(mismatch("no pinned entry for this host"));
        }
        if BASE64.encode(presented) != self.key {
            return Err(mismatch("server key differs from the pinned ssh-rsa key"));
        }
        Ok(())
    }
}

fn host_pattern(host: &str, port: u16) -> String {
    if port == DEFAULT_PORT {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

fn known_hosts_entry(host: &str, port: u16, key: &str) -> String {
    format!("{} ssh-rsa {}", host_pattern(host, port), key.trim())
}

fn pin_failed(host: &str, e: std::io::Error) -> Error {
    Error::HostKeyUnavailable {
        host: host.to_string(),
        reason: format!("failed to write known_hosts: {e}"),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keyscan_output() {
        let out = "# ftp.example.com:22 SSH-2.0-OpenSSH_8.9\nftp.example.com ssh-rsa AAAAB3NzaC1yc2E\n";
        assert_eq!(parse_keyscan_output(out).as_deref(), Some("AAAAB3NzaC1yc2E"));
        assert_eq!(parse_keyscan_output("# only comments\n"), None);
        assert_eq!(parse_keyscan_output("host ssh-ed25519 AAAAC3\n"), None);
    }

    #[test]
    fn test_pin_writes_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh").join("known_hosts");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale.example.com ssh-rsa OLD\n").unwrap();

        let pinned = PinnedHostKey::write(&path, "ftp.example.com", 22, "AAAAB3").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ftp.example.com ssh-rsa AAAAB3\n"
        );
        assert!(pinned.covers("ftp.example.com", 22));
        assert!(!pinned.covers("ftp.example.com", 2222));
    }

    #[test]
    fn test_non_default_port_uses_bracket_pattern() {
        let pinned = PinnedHostKey::write_temporary("ftp.example.com", 2222, "AAAAB3").unwrap();
        assert_eq!(pinned.entry(), "[ftp.example.com]:2222 ssh-rsa AAAAB3");
        let path = pinned.path().to_path_buf();
        assert!(path.exists());
        drop(pinned);
        assert!(!path.exists());
    }

    #[test]
    fn test_verify_accepts_only_the_pinned_blob() {
        let blob = b"\x00\x00\x00\x07ssh-rsa\x01\x02\x03";
        let pinned =
            PinnedHostKey::write_temporary("ftp.example.com", 22, &BASE64.encode(blob)).unwrap();

        assert!(pinned.verify("ftp.example.com", 22, blob).is_ok());

        let err = pinned
            .verify("ftp.example.com", 22, b"\x00\x00\x00\x07ssh-rsa\x09")
            .unwrap_err();
        assert_eq!(err.error_code(), "host_key_mismatch");

        let err = pinned.verify("evil.example.com", 22, blob).unwrap_err();
        assert_eq!(err.error_code(), "host_key_mismatch");
        let err = pinned.verify("ftp.example.com", 2222, blob).unwrap_err();
        assert_eq!(err.error_code(), "host_key_mismatch");
    }

    #[tokio::test]
    async fn test_static_key() {
        let key = StaticHostKey::new("AAAAB3").fetch_rsa_key("h", 22).await.unwrap();
        assert_eq!(key, "AAAAB3");
        let err = StaticHostKey::new("").fetch_rsa_key("h", 22).await.unwrap_err();
        assert_eq!(err.error_code(), "host_key_unavailable");
    }

    #[tokio::test]
    async fn test_missing_keyscan_binary_is_host_key_error() {
        let fetcher = KeyscanFetcher::new(PathBuf::from("/nonexistent/ssh-keyscan"));
        let err = fetcher.fetch_rsa_key("ftp.example.com", 22).await.unwrap_err();
        assert_eq!(err.error_code(), "host_key_unavailable");
    }
}
