//! Remote file listing and transfer for the recall pipeline
//!
//! A [`RemoteListingClient`] pins the host's RSA key with a
//! [`HostKeyFetcher`], opens a [`RemoteFileServer`] session through a
//! [`RemoteConnector`] and selects the most recently modified file of the
//! working directory. [`SshConnector`] speaks SFTP; [`MirrorConnector`] reads
//! a locally mounted copy of the account homes.

mod host_key;
mod mirror;
mod ssh;

pub use host_key::{HostKeyFetcher, KeyscanFetcher, PinnedHostKey, StaticHostKey};
pub use mirror::{MirrorConnector, MirrorFileServer};
pub use ssh::{SshConnector, SshFileServer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::secrets::SftpCredential;

/// One entry of a remote directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File name without directory
    pub name: String,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// An open session on a remote file server
#[async_trait]
pub trait RemoteFileServer: Send + Sync {
    /// List the entries of `directory`
    ///
    /// # Errors
    ///
    /// Returns `RemoteListingFailed` if the directory cannot be read.
    async fn list(&self, directory: &str) -> Result<Vec<RemoteEntry>>;

    /// Copy `directory/name` to `local_path`
    ///
    /// # Errors
    ///
    /// Returns `RemoteTransferFailed` if the file cannot be copied.
    async fn download(&self, directory: &str, name: &str, local_path: &Path) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Opens authenticated sessions against a pinned host
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect to `host` with `credential`, trusting only `host_key`
    async fn connect(
        &self,
        host: &str,
        credential: &SftpCredential,
        host_key: &PinnedHostKey,
    ) -> Result<Box<dyn RemoteFileServer>>;
}

/// Select the most recently modified file
///
/// Directories are skipped. On equal modification times the
/// lexicographically greatest name wins.
pub fn latest_file(entries: &[RemoteEntry]) -> Option<&RemoteEntry> {
    entries
        .iter()
        .filter(|e| !e.is_dir)
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
}

/// Host-key pinning plus session setup for one run
pub struct RemoteListingClient {
    host_keys: Arc<dyn HostKeyFetcher>,
    connector: Arc<dyn RemoteConnector>,
    known_hosts_path: Option<PathBuf>,
}

impl RemoteListingClient {
    /// Build a client; `known_hosts_path` of `None` pins into a temporary file
    pub fn new(
        host_keys: Arc<dyn HostKeyFetcher>,
        connector: Arc<dyn RemoteConnector>,
        known_hosts_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host_keys,
            connector,
            known_hosts_path,
        }
    }

    /// Pin the host key, then connect
    ///
    /// # Errors
    ///
    /// `HostKeyUnavailable` when the key cannot be fetched or pinned; whatever
    /// the connector reports when the session cannot be opened.
    pub async fn open(&self, host: &str, credential: &SftpCredential) -> Result<RemoteSession> {
        let key = self.host_keys.fetch_rsa_key(host, credential.port).await?;
        let pinned = match &self.known_hosts_path {
            Some(path) => PinnedHostKey::write(path, host, credential.port, &key)?,
            None => PinnedHostKey::write_temporary(host, credential.port, &key)?,
        };
        tracing::info!(
            host,
            fetcher = self.host_keys.name(),
            known_hosts = ?pinned.path(),
            "Added/updated host key in known_hosts"
        );

        let server = self.connector.connect(host, credential, &pinned).await?;
        tracing::info!(host, server = server.name(), "Connected to SFTP server");
        Ok(RemoteSession {
            server,
            _host_key: pinned,
        })
    }
}

/// A connected session; the pinned key lives as long as the session
pub struct RemoteSession {
    server: Box<dyn RemoteFileServer>,
    _host_key: PinnedHostKey,
}

impl RemoteSession {
    /// Name of the most recently modified file in `directory`, `None` if it has no files
    pub async fn latest_file(&self, directory: &str) -> Result<Option<String>> {
        let entries = self.server.list(directory).await?;
        let latest = latest_file(&entries).map(|e| e.name.clone());
        tracing::debug!(directory, entries = entries.len(), latest = ?latest, "Listed remote directory");
        Ok(latest)
    }

    /// Download `directory/name` to `local_path`
    pub async fn download(&self, directory: &str, name: &str, local_path: &Path) -> Result<()> {
        self.server.download(directory, name, local_path).await?;
        tracing::info!(file = name, local = ?local_path, "Downloaded file");
        Ok(())
    }
}
