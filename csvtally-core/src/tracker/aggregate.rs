use chrono::{DateTime, Utc};

use super::ImportTracker;
use crate::{
    backend::{ProgressBackend, RawSnapshot},
    error::Result,
    model::{BatchCounters, FailureRecord, ImportSession, ImportSnapshot},
};

impl<B> ImportTracker<B>
where
    B: ProgressBackend + ?Sized,
{
    /// Current view of an import, or `None` once it has expired, been
    /// cleaned up, or never existed.
    pub async fn get_snapshot(
        &self,
        import_id: &str,
    ) -> Result<Option<ImportSnapshot>> {
        let keys = self.keys.keys(import_id);
        let raw = self.backend.read(&keys).await?;
        assemble(import_id, raw, Utc::now())
    }
}

pub(crate) fn assemble(
    import_id: &str,
    raw: RawSnapshot,
    now: DateTime<Utc>,
) -> Result<Option<ImportSnapshot>> {
    if raw.info.is_empty() {
        return Ok(None);
    }

    let session = ImportSession::from_fields(import_id, raw.info)?;
    let counters = BatchCounters::from_fields(import_id, raw.counters)?;
    let failures = raw
        .failures
        .into_iter()
        .map(|entry| FailureRecord::decode(import_id, entry))
        .collect();

    let end = session.completed_at.unwrap_or(now);
    let duration_secs = (end - session.started_at).num_seconds().max(0);

    Ok(Some(ImportSnapshot {
        session,
        counters,
        failures,
        duration_secs,
    }))
}
