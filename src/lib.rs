//! # feed-landing
//!
//! Scheduled retrieval of vendor data feeds into an object-storage landing zone.
//!
//! Two independent pipelines:
//! - **recall**: picks the newest file on each region's SFTP server, skips it if
//!   already landed, keeps the `status == ok` rows and uploads it under a
//!   dated key.
//! - **infleet**: lists loaner vehicles from a REST service, enriches every
//!   record with its order handover date through bounded concurrent batches
//!   and writes one timestamped CSV artifact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use feed_landing::config::load_config;
//! use feed_landing::pipeline::handle_infleet;
//! use feed_landing::types::InvocationEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config(None)?;
//!     let event = InvocationEvent {
//!         sync_date: Some("2024-01-15".to_string()),
//!     };
//!
//!     let result = handle_infleet(config, event).await;
//!     println!("{}", serde_json::to_string(&result)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Authenticated REST client
pub mod client;
/// Configuration types
pub mod config;
/// Per-invocation run context
pub mod context;
/// Feed file row filtering
pub mod csv_filter;
/// Batch order enrichment
pub mod enrichment;
/// Error types
pub mod error;
/// Pipeline entry points
pub mod pipeline;
/// Tabular record collections
pub mod records;
/// Retry logic with exponential backoff
pub mod retry;
/// Secret stores and credentials
pub mod secrets;
/// Remote file listing and transfer
pub mod sftp;
/// Object storage backends and key derivation
pub mod storage;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use context::RunContext;
pub use enrichment::{EnrichmentEngine, EnrichmentReport, LookupOutcome, OrderLookup};
pub use error::{EnrichmentFailure, Error, Result, SecretFailure};
pub use pipeline::{handle_infleet, handle_recall};
pub use records::{Record, RecordCollection};
pub use storage::ObjectStore;
pub use types::{InvocationEvent, InvocationResult};
