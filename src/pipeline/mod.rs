//! Pipeline entry points
//!
//! [`handle_recall`] and [`handle_infleet`] build a [`RunContext`] and the
//! configured backends, run once and always return an [`InvocationResult`].

pub mod infleet;
pub mod recall;

pub use infleet::{InfleetPipeline, resolve_last_sync};
pub use recall::RecallPipeline;

use tracing::Instrument;

use crate::config::Config;
use crate::context::RunContext;
use crate::types::{InvocationEvent, InvocationResult};

/// Run the SFTP-to-storage pipeline for every configured region
pub async fn handle_recall(config: Config, event: InvocationEvent) -> InvocationResult {
    let ctx = RunContext::new(config);
    let span = run_span("recall", &ctx);
    async move {
        tracing::info!(event = ?event, "Recall run started");
        match RecallPipeline::from_config(ctx.config()) {
            Ok(pipeline) => pipeline.run(&ctx).await,
            Err(e) => {
                tracing::error!(error = %e, error_code = e.error_code(), "Recall run failed");
                InvocationResult::failure(format!("Lambda execution failed: {e}"))
            }
        }
    }
    .instrument(span)
    .await
}

/// Run the API-to-storage pipeline once
pub async fn handle_infleet(config: Config, event: InvocationEvent) -> InvocationResult {
    let ctx = RunContext::new(config);
    let span = run_span("infleet", &ctx);
    async move {
        tracing::info!(
            env = %ctx.config().env.to_uppercase(),
            sync_date = ?event.sync_date,
            "Infleet run started"
        );
        match InfleetPipeline::from_config(ctx.config()) {
            Ok(pipeline) => pipeline.run(&ctx, &event).await,
            Err(e) => {
                tracing::error!(error = %e, error_code = e.error_code(), "Infleet run failed");
                InvocationResult::failure(format!("Internal server error: {e}"))
            }
        }
    }
    .instrument(span)
    .await
}

fn run_span(pipeline: &'static str, ctx: &RunContext) -> tracing::Span {
    tracing::info_span!(
        "run",
        pipeline,
        env = %ctx.config().env,
        run_time = %ctx.run_time().to_rfc3339()
    )
}
