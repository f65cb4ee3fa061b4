use std::cmp::Ordering;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{CompletionVerdict, ImportTracker};
use crate::{
    backend::ProgressBackend,
    error::Result,
    keys::ImportKeys,
    model::{CompletionSignal, rfc3339},
};

impl<B> ImportTracker<B>
where
    B: ProgressBackend + ?Sized + 'static,
{
    /// Decide whether the increment that produced `processed_batches` is
    /// the one that finished the import.
    ///
    /// Increments are by one, so at most one call per session observes the
    /// counter equal to the total. The signal additionally requires winning
    /// the set-if-absent claim, which holds even if the counters are reset
    /// or replayed underneath a running import.
    ///
    /// A counter past the total still tries the claim: the call that hit
    /// the total may have incremented and then failed to claim, and its
    /// retry lands here.
    pub(super) async fn detect_completion(
        &self,
        import_id: &str,
        keys: &ImportKeys,
        processed_batches: u64,
        total_batches: u64,
    ) -> Result<CompletionVerdict> {
        if total_batches == 0 {
            return Ok(CompletionVerdict::Pending);
        }

        match processed_batches.cmp(&total_batches) {
            Ordering::Less => Ok(CompletionVerdict::Pending),
            Ordering::Equal => self.claim(import_id, keys, total_batches).await,
            Ordering::Greater => {
                warn!(
                    import_id = %import_id,
                    processed_batches,
                    total_batches,
                    "batch counter past total; duplicate reports suspected"
                );
                match self.claim(import_id, keys, total_batches).await? {
                    CompletionVerdict::Claimed => Ok(CompletionVerdict::Claimed),
                    _ => Ok(CompletionVerdict::Overshot),
                }
            }
        }
    }

    /// A rejected duplicate wrote nothing, but when the counter already
    /// stands at the total the original report may have died between its
    /// increment and its claim. `None` when the import is not finished.
    pub(super) async fn reclaim_after_duplicate(
        &self,
        import_id: &str,
        keys: &ImportKeys,
        processed_batches: u64,
        total_batches: Option<u64>,
    ) -> Result<Option<CompletionVerdict>> {
        match total_batches {
            Some(total) if total > 0 && processed_batches >= total => {
                self.claim(import_id, keys, total).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn claim(
        &self,
        import_id: &str,
        keys: &ImportKeys,
        total_batches: u64,
    ) -> Result<CompletionVerdict> {
        let completed_at = Utc::now();
        if !self
            .backend
            .claim_completion(keys, &rfc3339(completed_at))
            .await?
        {
            debug!(import_id = %import_id, "completion already claimed");
            return Ok(CompletionVerdict::AlreadyClaimed);
        }

        info!(import_id = %import_id, total_batches, "CSV import completed");
        self.emit_completion(import_id);
        Ok(CompletionVerdict::Claimed)
    }

    /// The snapshot is read once the delay has passed, so metadata stored
    /// right after the last batch still reaches the signal. Read failures
    /// are logged by the notifier; the claim is already held and the
    /// reporting batch must not be retried into an overshoot.
    fn emit_completion(&self, import_id: &str) {
        let tracker = self.clone();
        let id = import_id.to_string();
        self.notifier.schedule_with(import_id.to_string(), async move {
            Ok(tracker.get_snapshot(&id).await?.map(CompletionSignal::from))
        });
        debug!(
            import_id = %import_id,
            delay_ms = self.notifier.delay().as_millis() as u64,
            "completion signal scheduled"
        );
    }
}
