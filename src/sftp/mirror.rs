//! File server backed by a locally mounted mirror of the remote hosts
//!
//! Layout: `{root}/{host}/{username}/{directory}/…`, one account home per
//! login, as the vendor's chrooted SFTP accounts present them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::{PinnedHostKey, RemoteConnector, RemoteEntry, RemoteFileServer};
use crate::error::{Error, Result};
use crate::secrets::SftpCredential;

/// Opens [`MirrorFileServer`] sessions under a mirror root
#[derive(Clone, Debug)]
pub struct MirrorConnector {
    root: PathBuf,
}

impl MirrorConnector {
    /// Connector over `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl RemoteConnector for MirrorConnector {
    async fn connect(
        &self,
        host: &str,
        credential: &SftpCredential,
        host_key: &PinnedHostKey,
    ) -> Result<Box<dyn RemoteFileServer>> {
        if !host_key.covers(host, credential.port) {
            return Err(Error::HostKeyUnavailable {
                host: host.to_string(),
                reason: "pinned key does not cover this host".to_string(),
            });
        }

        let home = self.root.join(host).join(&credential.username);
        match tokio::fs::metadata(&home).await {
            Ok(meta) if meta.is_dir() => Ok(Box::new(MirrorFileServer::new(home))),
            Ok(_) | Err(_) => Err(Error::RemoteListingFailed {
                directory: format!("{host}:~{}", credential.username),
                reason: "account home not found".to_string(),
            }),
        }
    }
}

/// One account home on the mirror
#[derive(Clone, Debug)]
pub struct MirrorFileServer {
    home: PathBuf,
}

impl MirrorFileServer {
    /// Server rooted at an account home
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    fn resolve(&self, directory: &str) -> PathBuf {
        self.home.join(directory.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteFileServer for MirrorFileServer {
    async fn list(&self, directory: &str) -> Result<Vec<RemoteEntry>> {
        let listing_failed = |e: std::io::Error| Error::RemoteListingFailed {
            directory: directory.to_string(),
            reason: e.to_string(),
        };

        let mut reader = tokio::fs::read_dir(self.resolve(directory))
            .await
            .map_err(listing_failed)?;
        let mut entries = Vec::new();
        while let Some(dir_entry) = reader.next_entry().await.map_err(listing_failed)? {
            let meta = dir_entry.metadata().await.map_err(listing_failed)?;
            let modified = meta.modified().map_err(listing_failed)?;
            entries.push(RemoteEntry {
                name: dir_entry.file_name().to_string_lossy().into_owned(),
                modified: DateTime::<Utc>::from(modified),
                is_dir: meta.is_dir(),
            });
        }
        Ok(entries)
    }

    async fn download(&self, directory: &str, name: &str, local_path: &Path) -> Result<()> {
        let remote = self.resolve(directory).join(name);
        tokio::fs::copy(&remote, local_path)
            .await
            .map_err(|e| Error::RemoteTransferFailed {
                remote_path: format!("{}/{}", directory.trim_end_matches('/'), name),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mirror"
    }
}
