//! Configuration types for feed-landing
//!
//! Configuration is layered with figment (lowest to highest priority):
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. The flat deployment variables (`ENV`, `LZ_BUCKET`, `TARGET_DIR`,
//!    `VOLVO_INFLEET_LOANER`, `VOLVO_INFLEET_ORDER`)
//! 4. `FEED_LANDING_` prefixed variables, nested with `__`
//!    (e.g. `FEED_LANDING_INFLEET__ENRICHMENT__BATCH_SIZE=250`)

use crate::error::{Error, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration shared by both pipelines
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment name (default: "tst")
    #[serde(default = "default_env")]
    pub env: String,

    /// Transport retry policy for token and listing calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Object storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Secret store backend
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// SFTP-to-storage pipeline settings
    #[serde(default)]
    pub recall: RecallConfig,

    /// API-to-storage pipeline settings
    #[serde(default)]
    pub infleet: InfleetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: default_env(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            secrets: SecretsConfig::default(),
            recall: RecallConfig::default(),
            infleet: InfleetConfig::default(),
        }
    }
}

impl Config {
    /// Landing bucket for the recall pipeline
    ///
    /// Uses the explicit `recall.bucket` when set, otherwise
    /// `madhan-data-{env}-landing-zone`.
    pub fn recall_bucket(&self) -> String {
        self.recall
            .bucket
            .clone()
            .unwrap_or_else(|| format!("madhan-data-{}-landing-zone", self.env))
    }

    /// Check the settings the infleet pipeline cannot run without
    pub fn validate_infleet(&self) -> Result<()> {
        let required = [
            ("infleet.bucket", &self.infleet.bucket),
            ("infleet.target_dir", &self.infleet.target_dir),
            ("infleet.loaner_secret", &self.infleet.loaner_secret),
            ("infleet.order_secret", &self.infleet.order_secret),
        ];
        for (key, value) in required {
            match value.as_deref() {
                Some(v) if !v.trim().is_empty() => {}
                _ => return Err(Error::config(key, format!("{key} is not set"))),
            }
        }
        if self.infleet.enrichment.batch_size == 0 {
            return Err(Error::config(
                "infleet.enrichment.batch_size",
                "batch size must be at least 1",
            ));
        }
        Ok(())
    }

    /// Check the settings the recall pipeline cannot run without
    pub fn validate_recall(&self) -> Result<()> {
        if self.recall.regions.is_empty() {
            return Err(Error::config("recall.regions", "no regions configured"));
        }
        for region in &self.recall.regions {
            if region.host.trim().is_empty() {
                return Err(Error::config(
                    "recall.regions.host",
                    format!("region {} has no host", region.name),
                ));
            }
            if region.secret_name.trim().is_empty() {
                return Err(Error::config(
                    "recall.regions.secret_name",
                    format!("region {} has no secret name", region.name),
                ));
            }
        }
        Ok(())
    }
}

/// Load configuration from defaults, an optional TOML file and the environment
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::config(
                "config_file",
                format!("config file {} does not exist", path.display()),
            ));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment
        .merge(deployment_env())
        .merge(Env::prefixed("FEED_LANDING_").split("__"));

    figment.extract().map_err(|e| Error::ConfigurationMissing {
        message: e.to_string(),
        key: None,
    })
}

/// The flat variables set on the scheduled functions
fn deployment_env() -> Env {
    Env::raw()
        .only(&[
            "ENV",
            "LZ_BUCKET",
            "TARGET_DIR",
            "VOLVO_INFLEET_LOANER",
            "VOLVO_INFLEET_ORDER",
        ])
        .map(|key| {
            let mapped = match key.as_str().to_ascii_uppercase().as_str() {
                "LZ_BUCKET" => "infleet.bucket",
                "TARGET_DIR" => "infleet.target_dir",
                "VOLVO_INFLEET_LOANER" => "infleet.loaner_secret",
                "VOLVO_INFLEET_ORDER" => "infleet.order_secret",
                _ => "env",
            };
            mapped.into()
        })
}

/// Retry configuration for transient transport failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 120 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Response statuses treated as transient (default: 429, 500, 502, 503, 504)
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
            retry_statuses: default_retry_statuses(),
        }
    }
}

/// Object storage backend selection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Buckets are directories under `root`
    Local {
        /// Root directory holding one directory per bucket
        root: PathBuf,
    },
    /// S3-compatible HTTP endpoint (`{endpoint}/{bucket}/{key}`)
    Http {
        /// Endpoint base URL
        endpoint: String,
        /// Environment variable holding a bearer token, if the endpoint needs one
        #[serde(default)]
        bearer_token_env: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("./landing"),
        }
    }
}

/// Secret store backend selection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretsConfig {
    /// Each secret is a JSON object in an environment variable
    /// named `{prefix}{NAME}` (name upper-cased, `-` replaced by `_`)
    Env {
        /// Variable name prefix
        prefix: String,
    },
    /// Each secret is `{dir}/{name}.json`
    File {
        /// Directory holding the secret files
        dir: PathBuf,
    },
}

impl Default for SecretsConfig {
    fn default() -> Self {
        SecretsConfig::Env {
            prefix: "FEED_LANDING_SECRET_".to_string(),
        }
    }
}

/// SFTP-to-storage ("recall") pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Landing bucket (default: `madhan-data-{env}-landing-zone`)
    #[serde(default)]
    pub bucket: Option<String>,

    /// Key prefix under which region partitions live (default: "data/recall/output")
    #[serde(default = "default_recall_prefix")]
    pub base_prefix: String,

    /// Remote working directory (default: "/outgoing")
    #[serde(default = "default_sftp_path")]
    pub sftp_path: String,

    /// Read a locally mounted copy of the servers (one subdirectory per host)
    /// instead of connecting over SFTP
    #[serde(default)]
    pub mirror_root: Option<PathBuf>,

    /// SFTP connect and per-operation timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Where the pinned `known_hosts` file is written (default: system temp dir)
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    /// RSA host key (base64) pinned instead of running `ssh-keyscan`
    #[serde(default)]
    pub host_key: Option<String>,

    /// Regions processed in order on every run
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            base_prefix: default_recall_prefix(),
            sftp_path: default_sftp_path(),
            mirror_root: None,
            connect_timeout: default_connect_timeout(),
            known_hosts_path: None,
            host_key: None,
            regions: default_regions(),
        }
    }
}

/// One SFTP region (vendor account)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Region name, e.g. "US"; lower-cased for storage keys
    pub name: String,

    /// SFTP host
    pub host: String,

    /// Secret holding `sftp_username`, `sftp_password`, `sftp_port`
    pub secret_name: String,

    /// Expected feed filename prefix
    pub file_prefix: String,
}

impl RegionConfig {
    /// Regex the vendor's feed filenames are expected to match
    pub fn file_pattern(&self) -> String {
        format!(r"{}_\d{{8}}_\d{{6}}_output\.csv", regex::escape(&self.file_prefix))
    }
}

/// API-to-storage ("infleet") pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InfleetConfig {
    /// Landing bucket (`LZ_BUCKET`)
    #[serde(default)]
    pub bucket: Option<String>,

    /// Artifact directory prefix including trailing slash (`TARGET_DIR`)
    #[serde(default)]
    pub target_dir: Option<String>,

    /// Secret name of the loaner service (`VOLVO_INFLEET_LOANER`)
    #[serde(default)]
    pub loaner_secret: Option<String>,

    /// Secret name of the order service (`VOLVO_INFLEET_ORDER`)
    #[serde(default)]
    pub order_secret: Option<String>,

    /// Artifact file stem (default: "volvo_inventories")
    #[serde(default = "default_entity")]
    pub entity: String,

    /// Days looked back when the event has no sync date (default: 360)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Timeout for token and listing calls (default: 60 seconds)
    #[serde(default = "default_token_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Per-record lookup settings
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

impl Default for InfleetConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            target_dir: None,
            loaner_secret: None,
            order_secret: None,
            entity: default_entity(),
            lookback_days: default_lookback_days(),
            request_timeout: default_token_timeout(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

/// Batch enrichment settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Records looked up concurrently per batch (default: 500)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout for each lookup (default: 120 seconds)
    #[serde(default = "default_lookup_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Value of the `Api-Version` header (default: "2.0")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Prefix stripped from `globalRetailerCode` (default: "6US")
    #[serde(default = "default_dealer_code_prefix")]
    pub dealer_code_prefix: String,

    /// Warn when this fraction of lookups fails outright (default: 0.5)
    #[serde(default = "default_failure_warn_ratio")]
    pub failure_warn_ratio: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            request_timeout: default_lookup_timeout(),
            api_version: default_api_version(),
            dealer_code_prefix: default_dealer_code_prefix(),
            failure_warn_ratio: default_failure_warn_ratio(),
        }
    }
}

// Default value functions
fn default_env() -> String {
    "tst".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_recall_prefix() -> String {
    "data/recall/output".to_string()
}

fn default_sftp_path() -> String {
    "/outgoing".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            name: "US".to_string(),
            host: "ftp.recallmasters.com".to_string(),
            secret_name: "sftp-us-server-details".to_string(),
            file_prefix: "DEALERWARE-INV".to_string(),
        },
        RegionConfig {
            name: "CA".to_string(),
            host: "ftp.recallmasters.com".to_string(),
            secret_name: "sftp-ca-server-details".to_string(),
            file_prefix: "DEALERWARE-C-INV".to_string(),
        },
    ]
}

fn default_entity() -> String {
    "volvo_inventories".to_string()
}

fn default_lookback_days() -> i64 {
    360
}

fn default_token_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_batch_size() -> usize {
    500
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_api_version() -> String {
    "2.0".to_string()
}

fn default_dealer_code_prefix() -> String {
    "6US".to_string()
}

fn default_failure_warn_ratio() -> f64 {
    0.5
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: &[&str] = &[
        "ENV",
        "LZ_BUCKET",
        "TARGET_DIR",
        "VOLVO_INFLEET_LOANER",
        "VOLVO_INFLEET_ORDER",
        "FEED_LANDING_INFLEET__ENRICHMENT__BATCH_SIZE",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: env-mutating tests are serialized with #[serial]
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config = Config::default();
        assert_eq!(config.env, "tst");
        assert_eq!(config.recall_bucket(), "madhan-data-tst-landing-zone");
        assert_eq!(config.recall.base_prefix, "data/recall/output");
        assert_eq!(config.recall.sftp_path, "/outgoing");
        assert_eq!(config.recall.regions.len(), 2);
        assert_eq!(config.recall.regions[0].name, "US");
        assert_eq!(config.recall.regions[1].file_prefix, "DEALERWARE-C-INV");
        assert_eq!(config.infleet.enrichment.batch_size, 500);
        assert_eq!(
            config.infleet.enrichment.request_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(config.infleet.request_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.retry_statuses, vec![429, 500, 502, 503, 504]);
    }

    #[test]
    fn test_file_pattern_matches_vendor_names() {
        let region = &Config::default().recall.regions[0];
        let re = regex::Regex::new(&region.file_pattern()).unwrap();
        assert!(re.is_match("DEALERWARE-INV_20240115_120000_output.csv"));
        assert!(!re.is_match("DEALERWARE-INV_2024011_120000_output.csv"));
    }

    #[test]
    fn test_validate_infleet_names_missing_key() {
        let mut config = Config::default();
        config.infleet.bucket = Some("lz".into());
        config.infleet.target_dir = Some("raw/volvo/".into());
        config.infleet.loaner_secret = Some("loaner".into());

        let err = config.validate_infleet().unwrap_err();
        match err {
            Error::ConfigurationMissing { key, .. } => {
                assert_eq!(key.as_deref(), Some("infleet.order_secret"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        config.infleet.order_secret = Some("order".into());
        assert!(config.validate_infleet().is_ok());
    }

    #[test]
    fn test_validate_recall_rejects_empty_regions() {
        let mut config = Config::default();
        assert!(config.validate_recall().is_ok());
        config.recall.regions.clear();
        assert!(config.validate_recall().is_err());
    }

    #[test]
    #[serial]
    fn test_load_config_reads_deployment_variables() {
        clear_env();
        // SAFETY: serialized test
        unsafe {
            std::env::set_var("ENV", "prd");
            std::env::set_var("LZ_BUCKET", "landing-prd");
            std::env::set_var("TARGET_DIR", "raw/volvo/");
            std::env::set_var("VOLVO_INFLEET_LOANER", "loaner-secret");
            std::env::set_var("VOLVO_INFLEET_ORDER", "order-secret");
        }

        let config = load_config(None).unwrap();
        clear_env();

        assert_eq!(config.env, "prd");
        assert_eq!(config.recall_bucket(), "madhan-data-prd-landing-zone");
        assert_eq!(config.infleet.bucket.as_deref(), Some("landing-prd"));
        assert_eq!(config.infleet.target_dir.as_deref(), Some("raw/volvo/"));
        assert_eq!(config.infleet.loaner_secret.as_deref(), Some("loaner-secret"));
        assert_eq!(config.infleet.order_secret.as_deref(), Some("order-secret"));
    }

    #[test]
    #[serial]
    fn test_load_config_file_then_prefixed_env() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
env = "dev"

[infleet]
entity = "loaners"

[infleet.enrichment]
batch_size = 100

[storage]
kind = "local"
root = "/data/landing"
"#
        )
        .unwrap();

        // SAFETY: serialized test
        unsafe { std::env::set_var("FEED_LANDING_INFLEET__ENRICHMENT__BATCH_SIZE", "250") };
        let config = load_config(Some(file.path())).unwrap();
        clear_env();

        assert_eq!(config.env, "dev");
        assert_eq!(config.infleet.entity, "loaners");
        assert_eq!(config.infleet.enrichment.batch_size, 250);
        match config.storage {
            StorageConfig::Local { root } => assert_eq!(root, PathBuf::from("/data/landing")),
            other => panic!("unexpected storage config: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_load_config_missing_file_is_an_error() {
        clear_env();
        let err = load_config(Some(Path::new("/nonexistent/feed-landing.toml"))).unwrap_err();
        assert_eq!(err.error_code(), "configuration_missing");
    }
}
