//! SFTP-to-storage pipeline
//!
//! Per region: resolve the SFTP login, pin the host key, pick the newest file
//! in the working directory, skip it when its key already exists, otherwise
//! download, keep the `status == ok` rows and upload.

use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;

use crate::config::{Config, RegionConfig};
use crate::context::RunContext;
use crate::csv_filter::StatusFilter;
use crate::error::{Error, Result, io_at};
use crate::secrets::{self, CredentialProvider, SecretStore};
use crate::sftp::{
    HostKeyFetcher, KeyscanFetcher, MirrorConnector, RemoteConnector, RemoteListingClient,
    SshConnector, StaticHostKey,
};
use crate::storage::{self, ObjectStore, keys::recall_key};
use crate::types::InvocationResult;

/// The recall pipeline with its collaborators
pub struct RecallPipeline {
    credentials: CredentialProvider,
    store: Arc<dyn ObjectStore>,
    remote: RemoteListingClient,
    filter: StatusFilter,
}

impl RecallPipeline {
    /// Assemble from explicit collaborators
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        store: Arc<dyn ObjectStore>,
        remote: RemoteListingClient,
    ) -> Self {
        Self {
            credentials: CredentialProvider::new(secrets),
            store,
            remote,
            filter: StatusFilter::default(),
        }
    }

    /// Assemble the backends selected in configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_recall()?;

        let host_keys: Arc<dyn HostKeyFetcher> = match &config.recall.host_key {
            Some(key) => Arc::new(StaticHostKey::new(key.clone())),
            None => Arc::new(KeyscanFetcher::from_path().ok_or_else(|| {
                Error::config(
                    "recall.host_key",
                    "ssh-keyscan not found in PATH and recall.host_key is not set",
                )
            })?),
        };
        let connector: Arc<dyn RemoteConnector> = match &config.recall.mirror_root {
            Some(root) => Arc::new(MirrorConnector::new(root.clone())),
            None => Arc::new(SshConnector::new(config.recall.connect_timeout)),
        };
        let remote = RemoteListingClient::new(
            host_keys,
            connector,
            config.recall.known_hosts_path.clone(),
        );

        Ok(Self::new(
            secrets::from_config(&config.secrets),
            storage::from_config(&config.storage)?,
            remote,
        ))
    }

    /// Process every configured region in order
    ///
    /// Always 200; each region's own outcome is under `<region>_result`.
    pub async fn run(&self, ctx: &RunContext) -> InvocationResult {
        let mut body = Map::new();
        for region in &ctx.config().recall.regions {
            tracing::info!(region = %region.name, "Processing region");
            let result = self
                .process_region(ctx, region)
                .instrument(tracing::info_span!("region", region = %region.name))
                .await;
            body.insert(
                format!("{}_result", region.name.to_lowercase()),
                json!({"statusCode": result.status_code, "body": result.body}),
            );
        }
        let results = Value::Object(body.clone());
        tracing::info!(results = %results, "Recall run completed");
        InvocationResult::ok(Value::Object(body))
    }

    /// Process one region; failures become a 500 result
    pub async fn process_region(&self, ctx: &RunContext, region: &RegionConfig) -> InvocationResult {
        match self.try_region(ctx, region).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    region = %region.name,
                    error = %e,
                    error_code = e.error_code(),
                    "Error processing region"
                );
                InvocationResult::failure(format!("Error processing {} region: {}", region.name, e))
            }
        }
    }

    async fn try_region(&self, ctx: &RunContext, region: &RegionConfig) -> Result<InvocationResult> {
        let recall = &ctx.config().recall;
        let bucket = ctx.config().recall_bucket();
        let partition = region.name.to_lowercase();

        let credential = self.credentials.sftp_credential(&region.secret_name).await?;
        let session = self.remote.open(&region.host, &credential).await?;

        let Some(filename) = session.latest_file(&recall.sftp_path).await? else {
            tracing::warn!(region = %region.name, "No files found on SFTP server");
            return Ok(InvocationResult::ok(format!(
                "No files found in {} SFTP server",
                region.name
            )));
        };
        tracing::info!(region = %region.name, file = %filename, "Found latest file");
        warn_on_unexpected_name(region, &filename);

        let key = recall_key(&recall.base_prefix, &filename, &partition)?;
        if self.store.exists(&bucket, &key).await? {
            tracing::info!(region = %region.name, key = %key, "File already exists in storage");
            return Ok(InvocationResult::ok(format!(
                "File already processed for {}",
                region.name
            )));
        }

        let workdir = tempfile::tempdir()?;
        let local_path = workdir.path().join(&filename);
        session
            .download(&recall.sftp_path, &filename, &local_path)
            .await?;

        let filtered = match self.filter_file(&local_path).await {
            Ok(filtered) => filtered,
            Err(e) => {
                tracing::error!(
                    region = %region.name,
                    file = %filename,
                    error = %e,
                    "Failed to process file"
                );
                return Ok(InvocationResult::failure(format!(
                    "Failed to process {} file: {}",
                    region.name, filename
                )));
            }
        };

        self.upload(&bucket, &key, filtered).await?;
        tracing::info!(
            region = %region.name,
            file = %filename,
            location = %self.store.location(&bucket, &key),
            "File processed and uploaded"
        );
        Ok(InvocationResult::ok(format!(
            "Successfully processed {} file: {}",
            region.name, filename
        )))
    }

    async fn filter_file(&self, local_path: &Path) -> Result<Vec<u8>> {
        let raw = tokio::fs::read(local_path)
            .await
            .map_err(|e| io_at(local_path, e))?;
        let (filtered, _) = self.filter.apply(&raw)?;
        Ok(filtered)
    }

    /// Write unless the key appeared since the first check
    async fn upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        if self.store.exists(bucket, key).await? {
            tracing::info!(key, "File already exists in storage, skipping upload");
            return Ok(());
        }
        self.store.put(bucket, key, body).await
    }
}

fn warn_on_unexpected_name(region: &RegionConfig, filename: &str) {
    match regex::Regex::new(&region.file_pattern()) {
        Ok(re) if re.is_match(filename) => {}
        Ok(_) => tracing::warn!(
            region = %region.name,
            file = filename,
            expected = %region.file_pattern(),
            "Latest file does not match the expected pattern"
        ),
        Err(e) => tracing::warn!(region = %region.name, error = %e, "Invalid file pattern"),
    }
}
