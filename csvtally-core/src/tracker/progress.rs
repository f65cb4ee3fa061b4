use tracing::{debug, info, warn};

use super::{BatchOutcome, ImportTracker, SkipReason};
use crate::{
    backend::{BatchApplied, BatchDelta, ProgressBackend},
    error::Result,
    model::{BatchReport, FailureRecord},
};

impl<B> ImportTracker<B>
where
    B: ProgressBackend + ?Sized + 'static,
{
    /// Record one finished batch and run completion detection.
    ///
    /// A missing session is a soft skip. Backend faults are returned so the
    /// batch job can retry: dropping a real update would leave the import
    /// short of its total forever.
    pub async fn update_batch_progress(
        &self,
        import_id: &str,
        report: &BatchReport,
    ) -> Result<BatchOutcome> {
        let keys = self.keys.keys(import_id);
        let delta = BatchDelta {
            processed_rows: report.processed,
            failed_rows: report.failed,
            failures: report
                .failures
                .iter()
                .map(FailureRecord::encode)
                .collect::<Result<Vec<_>>>()?,
            batch_number: report.batch_number,
        };

        let (processed_batches, total_batches) =
            match self.backend.apply_batch(&keys, &delta).await? {
                BatchApplied::Missing => {
                    debug!(import_id = %import_id, "Import tracking not initialized, skipping update");
                    return Ok(BatchOutcome::Skipped {
                        reason: SkipReason::NotInitialized,
                        completion: None,
                    });
                }
                BatchApplied::Duplicate {
                    processed_batches,
                    total_batches,
                } => {
                    warn!(
                        import_id = %import_id,
                        batch_number = ?report.batch_number,
                        processed_batches,
                        "duplicate batch report ignored"
                    );
                    let completion = self
                        .reclaim_after_duplicate(
                            import_id,
                            &keys,
                            processed_batches,
                            total_batches,
                        )
                        .await?;
                    return Ok(BatchOutcome::Skipped {
                        reason: SkipReason::DuplicateBatch,
                        completion,
                    });
                }
                BatchApplied::Applied {
                    processed_batches,
                    total_batches,
                } => (processed_batches, total_batches),
            };

        let total_batches = match total_batches {
            Some(total) => total,
            None => {
                warn!(
                    import_id = %import_id,
                    processed_batches,
                    "session info missing while counters exist"
                );
                0
            }
        };

        let completion = self
            .detect_completion(import_id, &keys, processed_batches, total_batches)
            .await?;

        info!(
            import_id = %import_id,
            current_batches = processed_batches,
            total_batches,
            processed_rows = report.processed,
            failed_rows = report.failed,
            "CSV import batch progress updated"
        );

        Ok(BatchOutcome::Applied {
            processed_batches,
            total_batches,
            completion,
        })
    }
}
