//! feed-landing: run one pipeline invocation and print its result

use clap::{Parser, ValueEnum};
use feed_landing::config::load_config;
use feed_landing::pipeline::{handle_infleet, handle_recall};
use feed_landing::types::{InvocationEvent, InvocationResult};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Vendor feed retrieval into the landing zone
#[derive(Parser, Debug)]
#[command(name = "feed-landing", version, about, long_about = None)]
struct Cli {
    /// Pipeline to run
    pipeline: Pipeline,

    /// Invocation event JSON, or `-` to read it from stdin (default: `{}`)
    event: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pipeline {
    /// SFTP feed files to storage
    Recall,
    /// Loaner API records, enriched with order dates, to storage
    Infleet,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .with_filter(filter);
    tracing_subscriber::registry().with(json_layer).init();

    let result = match read_event(cli.event.as_deref()) {
        Ok(event) => match load_config(cli.config.as_deref()) {
            Ok(config) => match cli.pipeline {
                Pipeline::Recall => handle_recall(config, event).await,
                Pipeline::Infleet => handle_infleet(config, event).await,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                InvocationResult::from(e)
            }
        },
        Err(message) => {
            tracing::error!(error = %message, "Invalid invocation event");
            InvocationResult::failure(message)
        }
    };

    match serde_json::to_string(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("failed to serialize result: {e}");
            return ExitCode::FAILURE;
        }
    }
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn read_event(arg: Option<&str>) -> Result<InvocationEvent, String> {
    let raw = match arg {
        None => return Ok(InvocationEvent::default()),
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read event from stdin: {e}"))?;
            buf
        }
        Some(json) => json.to_string(),
    };
    if raw.trim().is_empty() {
        return Ok(InvocationEvent::default());
    }
    serde_json::from_str(&raw).map_err(|e| format!("invalid event JSON: {e}"))
}
