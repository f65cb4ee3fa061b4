use chrono::Utc;
use tracing::{debug, info};

use super::{ImportTracker, SkipReason, WriteOutcome};
use crate::{
    backend::ProgressBackend,
    error::{Result, TrackerError},
    model::{BatchCounters, ImportMetadata, ImportSession},
};

impl<B> ImportTracker<B>
where
    B: ProgressBackend + ?Sized,
{
    /// Start tracking an import.
    ///
    /// Re-initializing an existing id discards its counters, failures and
    /// completion claim; callers mint a fresh id per run.
    pub async fn initialize(
        &self,
        import_id: &str,
        total_rows: u64,
        total_batches: u64,
    ) -> Result<ImportSession> {
        validate_import_id(import_id)?;
        if total_rows == 0 || total_batches == 0 {
            return Err(TrackerError::InvalidInput(format!(
                "import {import_id} needs positive totals (rows={total_rows}, batches={total_batches})"
            )));
        }

        let session =
            ImportSession::new(import_id, total_rows, total_batches, Utc::now());
        let keys = self.keys.keys(import_id);

        self.backend
            .initialize(
                &keys,
                &session.seed_fields(),
                &BatchCounters::zeroed_fields(),
                self.ttl,
            )
            .await?;

        info!(
            import_id = %import_id,
            total_rows,
            total_batches,
            ttl_secs = self.ttl.as_secs(),
            "CSV import tracking initialized"
        );
        Ok(session)
    }

    /// Merge descriptive fields into the session record.
    pub async fn store_metadata(
        &self,
        import_id: &str,
        metadata: &ImportMetadata,
    ) -> Result<WriteOutcome> {
        validate_import_id(import_id)?;
        let fields = metadata.to_fields()?;
        let keys = self.keys.keys(import_id);

        if !self.backend.merge_info(&keys, &fields).await? {
            debug!(import_id = %import_id, "Import tracking not initialized, metadata dropped");
            return Ok(WriteOutcome::Skipped {
                reason: SkipReason::NotInitialized,
            });
        }

        debug!(import_id = %import_id, fields = fields.len(), "import metadata stored");
        Ok(WriteOutcome::Applied)
    }

    /// Delete every key of the import, one command per key. Idempotent.
    pub async fn cleanup(&self, import_id: &str) -> Result<()> {
        let keys = self.keys.keys(import_id);
        for key in keys.all() {
            self.backend.delete(key).await?;
        }
        info!(import_id = %import_id, "CSV import tracking data cleaned up");
        Ok(())
    }
}

/// An empty id would produce an empty hash tag and scatter the group
/// across slots.
fn validate_import_id(import_id: &str) -> Result<()> {
    if import_id.trim().is_empty() {
        return Err(TrackerError::InvalidInput(
            "import id must not be empty".to_string(),
        ));
    }
    if import_id.contains(['{', '}']) {
        return Err(TrackerError::InvalidInput(format!(
            "import id {import_id:?} must not contain hash tag braces"
        )));
    }
    Ok(())
}
