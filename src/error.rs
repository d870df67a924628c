//! Error types for feed-landing
//!
//! This module provides the error taxonomy shared by both pipelines:
//! - Fatal run errors ([`Error`]) that end a pipeline run with a 500 result
//! - Secret lookup failure reasons ([`SecretFailure`])
//! - Per-record enrichment failures ([`EnrichmentFailure`]) that never leave the engine
//! - Machine-readable error codes for result bodies and log fields

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for feed-landing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feed-landing
///
/// Every variant is fatal to the enclosing pipeline run. Entry points convert
/// these into an [`InvocationResult`](crate::types::InvocationResult) rather
/// than returning them.
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration value is missing or invalid
    #[error("configuration error: {message}")]
    ConfigurationMissing {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "infleet.bucket")
        key: Option<String>,
    },

    /// A named secret could not be resolved into a credential
    #[error("secret {name} unavailable: {reason}")]
    SecretUnavailable {
        /// The secret identifier that was requested
        name: String,
        /// Why the secret could not be used
        reason: SecretFailure,
    },

    /// The remote host key could not be fetched for pinning
    #[error("host key unavailable for {host}: {reason}")]
    HostKeyUnavailable {
        /// Remote host whose key was requested
        host: String,
        /// Why the key fetch failed
        reason: String,
    },

    /// The server presented a host key other than the pinned one
    #[error("host key mismatch for {host}: {reason}")]
    HostKeyMismatch {
        /// Remote host that presented the key
        host: String,
        /// What did not match
        reason: String,
    },

    /// The SSH session to a remote file server could not be established
    #[error("connection to {host} failed: {reason}")]
    RemoteConnectFailed {
        /// Remote host, with port
        host: String,
        /// Transport or handshake failure description
        reason: String,
    },

    /// Token exchange against an authorization endpoint failed
    #[error("authentication failed against {url}: {reason}")]
    AuthenticationFailed {
        /// The authorization URL
        url: String,
        /// Status or transport failure description
        reason: String,
    },

    /// Listing the remote working directory failed
    #[error("remote listing of {directory} failed: {reason}")]
    RemoteListingFailed {
        /// The remote directory being listed
        directory: String,
        /// The reason listing failed
        reason: String,
    },

    /// Downloading a remote file failed
    #[error("transfer of {remote_path} failed: {reason}")]
    RemoteTransferFailed {
        /// Remote file path
        remote_path: String,
        /// The reason the transfer failed
        reason: String,
    },

    /// Fetching the source record list from the vendor API failed
    #[error("source fetch failed: {0}")]
    SourceFetchFailed(String),

    /// Checking for an existing object failed with something other than "not found"
    #[error("storage check for {key} failed: {reason}")]
    StorageCheckFailed {
        /// Storage key that was checked
        key: String,
        /// Backend failure description
        reason: String,
    },

    /// Writing an object to storage failed
    #[error("storage write of {key} failed: {reason}")]
    StorageWriteFailed {
        /// Storage key that was written
        key: String,
        /// Backend failure description
        reason: String,
    },

    /// A feed filename does not carry a `_YYYYMMDD_` date
    #[error("date not found in filename: {0}")]
    InvalidFileName(String),

    /// The `sync_date` override in the invocation event could not be parsed
    #[error("invalid sync date {value:?}: {reason}")]
    InvalidSyncDate {
        /// The raw value from the event
        value: String,
        /// Parser message
        reason: String,
    },

    /// A CSV input lacks a column the pipeline filters on
    #[error("missing column {0:?}")]
    MissingColumn(String),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An HTTP endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Request URL
        url: String,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigurationMissing {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code used in result bodies and log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ConfigurationMissing { .. } => "configuration_missing",
            Error::SecretUnavailable { reason, .. } => match reason {
                SecretFailure::NotFound => "secret_not_found",
                SecretFailure::AccessDenied => "secret_access_denied",
                SecretFailure::Malformed(_) => "secret_malformed",
                SecretFailure::DecryptionFailed => "secret_decryption_failed",
                SecretFailure::Backend(_) => "secret_unavailable",
            },
            Error::HostKeyUnavailable { .. } => "host_key_unavailable",
            Error::HostKeyMismatch { .. } => "host_key_mismatch",
            Error::RemoteConnectFailed { .. } => "remote_connect_failed",
            Error::AuthenticationFailed { .. } => "authentication_failed",
            Error::RemoteListingFailed { .. } => "remote_listing_failed",
            Error::RemoteTransferFailed { .. } => "remote_transfer_failed",
            Error::SourceFetchFailed(_) => "source_fetch_failed",
            Error::StorageCheckFailed { .. } => "storage_check_failed",
            Error::StorageWriteFailed { .. } => "storage_write_failed",
            Error::InvalidFileName(_) => "invalid_file_name",
            Error::InvalidSyncDate { .. } => "invalid_sync_date",
            Error::MissingColumn(_) => "missing_column",
            Error::Csv(_) => "csv_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
        }
    }
}

/// Reasons a secret lookup can fail
///
/// Each reason is reported distinctly but all of them are fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretFailure {
    /// No secret with this name exists
    #[error("not found")]
    NotFound,

    /// The caller may not read this secret
    #[error("access denied")]
    AccessDenied,

    /// The payload is not a flat JSON object or lacks a required field
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The stored payload could not be decrypted
    #[error("decryption failure")]
    DecryptionFailed,

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Why a single record's order lookup failed
///
/// Recovered locally by the enrichment engine: the owning record is dropped and
/// the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentFailure {
    /// The lookup endpoint returned a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The request did not complete within the lookup timeout
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The body was not valid JSON
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl From<reqwest::Error> for EnrichmentFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnrichmentFailure::Timeout
        } else if let Some(status) = e.status() {
            EnrichmentFailure::Status(status.as_u16())
        } else if e.is_decode() {
            EnrichmentFailure::MalformedBody(e.to_string())
        } else {
            EnrichmentFailure::Transport(e.to_string())
        }
    }
}

/// Helper for wrapping filesystem failures that carry a path
pub(crate) fn io_at(path: &std::path::Path, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("{}: {}", PathBuf::from(path).display(), e),
    ))
}
