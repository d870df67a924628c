//! SFTP over SSH with password authentication
//!
//! libssh2 is blocking, so every session operation runs on the blocking pool.
//! The server's host key is checked against the [`PinnedHostKey`] before any
//! credentials are sent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssh2::{FileStat, MethodType, Session, Sftp};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{PinnedHostKey, RemoteConnector, RemoteEntry, RemoteFileServer};
use crate::error::{Error, Result};
use crate::secrets::SftpCredential;

/// Host key algorithms offered during the handshake; only RSA keys are pinned
const RSA_HOST_KEY_METHODS: &str = "rsa-sha2-512,rsa-sha2-256,ssh-rsa";

/// Opens [`SshFileServer`] sessions
#[derive(Clone, Debug)]
pub struct SshConnector {
    timeout: Duration,
}

impl SshConnector {
    /// Connector whose TCP connect and per-operation timeout is `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        host: &str,
        credential: &SftpCredential,
        host_key: &PinnedHostKey,
    ) -> Result<Box<dyn RemoteFileServer>> {
        let port = credential.port;
        let address = format!("{host}:{port}");

        let session = {
            let (host, timeout) = (host.to_string(), self.timeout);
            tokio::task::spawn_blocking(move || open_session(&host, port, timeout))
                .await
                .map_err(|e| connect_failed(&address, e.to_string()))??
        };

        let (presented, _) = session
            .host_key()
            .ok_or_else(|| connect_failed(&address, "server sent no host key".to_string()))?;
        host_key.verify(host, port, presented)?;
        tracing::debug!(host, port, "Server host key matches pinned entry");

        let channel = {
            let (username, password) = (credential.username.clone(), credential.password.clone());
            let target = address.clone();
            tokio::task::spawn_blocking(move || authenticate(session, &target, &username, &password))
                .await
                .map_err(|e| connect_failed(&address, e.to_string()))??
        };

        Ok(Box::new(SshFileServer {
            address,
            channel: Arc::new(Mutex::new(channel)),
        }))
    }
}

struct SftpChannel {
    sftp: Sftp,
    _session: Session,
}

/// An authenticated SFTP subsystem channel
pub struct SshFileServer {
    address: String,
    channel: Arc<Mutex<SftpChannel>>,
}

impl std::fmt::Debug for SshFileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshFileServer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteFileServer for SshFileServer {
    async fn list(&self, directory: &str) -> Result<Vec<RemoteEntry>> {
        let listing_failed = |reason: String| Error::RemoteListingFailed {
            directory: format!("{}:{}", self.address, directory),
            reason,
        };

        let channel = Arc::clone(&self.channel);
        let path = PathBuf::from(directory);
        let listed = tokio::task::spawn_blocking(move || {
            let channel = channel
                .lock()
                .map_err(|_| "SFTP channel lock poisoned".to_string())?;
            channel.sftp.readdir(&path).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| listing_failed(e.to_string()))?
        .map_err(listing_failed)?;

        Ok(listed
            .iter()
            .filter_map(|(path, stat)| remote_entry(path, stat))
            .collect())
    }

    async fn download(&self, directory: &str, name: &str, local_path: &Path) -> Result<()> {
        let remote_path = format!("{}/{}", directory.trim_end_matches('/'), name);
        let transfer_failed = |reason: String| Error::RemoteTransferFailed {
            remote_path: remote_path.clone(),
            reason,
        };

        let channel = Arc::clone(&self.channel);
        let (remote, local) = (PathBuf::from(&remote_path), local_path.to_path_buf());
        let bytes = tokio::task::spawn_blocking(move || {
            let channel = channel
                .lock()
                .map_err(|_| "SFTP channel lock poisoned".to_string())?;
            let mut source = channel.sftp.open(&remote).map_err(|e| e.to_string())?;
            let mut target = std::fs::File::create(&local).map_err(|e| e.to_string())?;
            std::io::copy(&mut source, &mut target).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| transfer_failed(e.to_string()))?
        .map_err(transfer_failed)?;

        tracing::debug!(remote = %remote_path, bytes, "SFTP transfer complete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sftp"
    }
}

fn open_session(host: &str, port: u16, timeout: Duration) -> Result<Session> {
    let address = format!("{host}:{port}");
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| connect_failed(&address, format!("cannot resolve host: {e}")))?;

    let mut last_error = "no addresses resolved".to_string();
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_error = format!("connect to {addr} failed: {e}"),
        }
    }
    let stream = stream.ok_or_else(|| connect_failed(&address, last_error))?;

    let ssh_failed = |e: ssh2::Error| connect_failed(&address, format!("SSH handshake failed: {e}"));
    let mut session = Session::new().map_err(ssh_failed)?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .method_pref(MethodType::HostKey, RSA_HOST_KEY_METHODS)
        .map_err(ssh_failed)?;
    session.set_tcp_stream(stream);
    session.handshake().map_err(ssh_failed)?;
    Ok(session)
}

fn authenticate(session: Session, address: &str, username: &str, password: &str) -> Result<SftpChannel> {
    let auth_failed = |reason: String| Error::AuthenticationFailed {
        url: format!("sftp://{username}@{address}"),
        reason,
    };
    session
        .userauth_password(username, password)
        .map_err(|e| auth_failed(e.to_string()))?;
    if !session.authenticated() {
        return Err(auth_failed("password rejected".to_string()));
    }

    let sftp = session
        .sftp()
        .map_err(|e| connect_failed(address, format!("SFTP subsystem unavailable: {e}")))?;
    Ok(SftpChannel {
        sftp,
        _session: session,
    })
}

/// Listing entry from an SFTP `readdir` result; `.` and `..` are skipped
fn remote_entry(path: &Path, stat: &FileStat) -> Option<RemoteEntry> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    if name == "." || name == ".." {
        return None;
    }
    let modified = stat
        .mtime
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();
    Some(RemoteEntry {
        name,
        modified,
        is_dir: stat.is_dir(),
    })
}

fn connect_failed(address: &str, reason: String) -> Error {
    Error::RemoteConnectFailed {
        host: address.to_string(),
        reason,
    }
}
