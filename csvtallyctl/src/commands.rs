use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use csvtally_config::{ConfigLoad, ConfigSource, TrackerConfig};
use csvtally_core::{
    ImportTracker, WriteOutcome,
    backend::RedisBackend,
    model::{BatchReport, CompletionSignal, FailureRecord, ImportMetadata},
    notifier::ChannelNotifier,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub pretty: bool,
}

impl Output {
    pub fn emit<T: Serialize>(self, value: &T) -> Result<()> {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .context("failed to render output")?;
        println!("{rendered}");
        Ok(())
    }
}

pub fn show_config(load: &ConfigLoad, output: Output) -> Result<()> {
    let source = match &load.source {
        ConfigSource::Default => "defaults".to_string(),
        ConfigSource::EnvPath(path) | ConfigSource::File(path) => {
            path.display().to_string()
        }
    };
    let config = &load.config;
    output.emit(&json!({
        "source": source,
        "redis_url": config.redis.url,
        "key_prefix": config.key_prefix,
        "ttl": humantime::format_duration(config.ttl).to_string(),
        "completion_delay": humantime::format_duration(config.completion_delay).to_string(),
    }))
}

pub fn build_report(
    processed: u64,
    failed: u64,
    batch_number: Option<u64>,
    failures: &[String],
) -> Result<BatchReport> {
    let records = failures
        .iter()
        .map(|raw| {
            serde_json::from_str(raw)
                .map(FailureRecord::new)
                .with_context(|| format!("--failure is not valid JSON: {raw}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut report = BatchReport::new(processed, failed).with_failures(records);
    if let Some(number) = batch_number {
        report = report.for_batch(number);
    }
    Ok(report)
}

/// A tracker bound to Redis plus the receiving end of its completion
/// channel.
#[derive(Debug)]
pub struct Session {
    tracker: ImportTracker<RedisBackend>,
    completions: UnboundedReceiver<CompletionSignal>,
}

impl Session {
    pub async fn connect(config: &TrackerConfig) -> Result<Self> {
        let backend = RedisBackend::connect(&config.redis.url).await?;
        let (notifier, completions) = ChannelNotifier::new();
        let tracker = ImportTracker::with_settings(
            Arc::new(backend),
            Arc::new(notifier),
            config.tracker_settings(),
        );
        Ok(Self {
            tracker,
            completions,
        })
    }

    pub async fn init(
        &mut self,
        import_id: &str,
        total_rows: u64,
        total_batches: u64,
        output: Output,
    ) -> Result<()> {
        let session = self
            .tracker
            .initialize(import_id, total_rows, total_batches)
            .await?;
        output.emit(&session)
    }

    pub async fn meta(
        &mut self,
        import_id: &str,
        metadata: &ImportMetadata,
        output: Output,
    ) -> Result<()> {
        let outcome = self.tracker.store_metadata(import_id, metadata).await?;
        if let WriteOutcome::Skipped { reason } = outcome {
            warn!(import_id = %import_id, ?reason, "metadata not stored");
        }
        output.emit(&outcome)
    }

    /// Applies the batch and, when it finished the import, waits up to
    /// `wait` for the delayed completion signal so it can be printed.
    pub async fn report(
        &mut self,
        import_id: &str,
        report: &BatchReport,
        wait: Duration,
        output: Output,
    ) -> Result<()> {
        let outcome = self.tracker.update_batch_progress(import_id, report).await?;
        if !outcome.completed_import() {
            return output.emit(&json!({ "result": outcome }));
        }

        let completion =
            match tokio::time::timeout(wait, self.completions.recv()).await {
                Ok(signal) => signal,
                Err(_) => {
                    warn!(
                        import_id = %import_id,
                        wait = %humantime::format_duration(wait),
                        "completion signal not delivered before exit"
                    );
                    None
                }
            };
        output.emit(&json!({ "result": outcome, "completion": completion }))
    }

    pub async fn status(&mut self, import_id: &str, output: Output) -> Result<()> {
        let Some(snapshot) = self.tracker.get_snapshot(import_id).await? else {
            bail!(
                "no tracking data for import {import_id} (expired, cleaned up or never initialized)"
            );
        };
        output.emit(&json!({
            "state": snapshot.state(),
            "remaining_batches": snapshot.remaining_batches(),
            "progress": snapshot.progress_ratio(),
            "snapshot": snapshot,
        }))
    }

    pub async fn cleanup(&mut self, import_id: &str, output: Output) -> Result<()> {
        self.tracker.cleanup(import_id).await?;
        output.emit(&json!({ "import_id": import_id, "cleaned_up": true }))
    }
}
