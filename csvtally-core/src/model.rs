//! Typed records for one import session.
//!
//! The cache stores session info and counters as flat string hashes; the
//! conversions here are the only place that knows the field names.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, TrackerError};

pub(crate) mod fields {
    pub const IMPORT_ID: &str = "import_id";
    pub const TOTAL_ROWS: &str = "total_rows";
    pub const TOTAL_BATCHES: &str = "total_batches";
    pub const STARTED_AT: &str = "started_at";
    pub const COMPLETED_AT: &str = "completed_at";
    pub const FINANCER_ID: &str = "financer_id";
    pub const USER_ID: &str = "user_id";
    pub const FILE_PATH: &str = "file_path";

    pub const PROCESSED_BATCHES: &str = "processed_batches";
    pub const PROCESSED_ROWS: &str = "processed_rows";
    pub const FAILED_ROWS: &str = "failed_rows";

    /// Fields owned by the tracker; metadata may not overwrite them.
    pub const RESERVED: &[&str] =
        &[IMPORT_ID, TOTAL_ROWS, TOTAL_BATCHES, STARTED_AT, COMPLETED_AT];
}

/// Descriptive fields merged into the session record after initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ImportMetadata {
    pub fn new(
        financer_id: impl Into<String>,
        user_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            financer_id: Some(financer_id.into()),
            user_id: Some(user_id.into()),
            file_path: Some(file_path.into()),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.financer_id.is_none()
            && self.user_id.is_none()
            && self.file_path.is_none()
            && self.extra.is_empty()
    }

    /// Flattens into hash fields, rejecting names the tracker owns.
    pub(crate) fn to_fields(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::with_capacity(3 + self.extra.len());
        let named = [
            (fields::FINANCER_ID, &self.financer_id),
            (fields::USER_ID, &self.user_id),
            (fields::FILE_PATH, &self.file_path),
        ];
        for (name, value) in named {
            if let Some(value) = value {
                out.push((name.to_string(), value.clone()));
            }
        }
        for (name, value) in &self.extra {
            if fields::RESERVED.contains(&name.as_str())
                || named.iter().any(|(n, _)| *n == name.as_str())
            {
                return Err(TrackerError::InvalidInput(format!(
                    "metadata field '{name}' is reserved"
                )));
            }
            out.push((name.clone(), value.clone()));
        }
        Ok(out)
    }
}

/// Session info: fixed at initialization apart from `completed_at` and
/// merged metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSession {
    pub import_id: String,
    pub total_rows: u64,
    pub total_batches: u64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metadata: ImportMetadata,
}

impl ImportSession {
    pub fn new(
        import_id: impl Into<String>,
        total_rows: u64,
        total_batches: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            import_id: import_id.into(),
            total_rows,
            total_batches,
            started_at,
            completed_at: None,
            metadata: ImportMetadata::default(),
        }
    }

    /// Fields written by `initialize`.
    pub(crate) fn seed_fields(&self) -> Vec<(String, String)> {
        vec![
            (fields::IMPORT_ID.to_string(), self.import_id.clone()),
            (fields::TOTAL_ROWS.to_string(), self.total_rows.to_string()),
            (
                fields::TOTAL_BATCHES.to_string(),
                self.total_batches.to_string(),
            ),
            (fields::STARTED_AT.to_string(), rfc3339(self.started_at)),
        ]
    }

    pub(crate) fn from_fields(
        import_id: &str,
        mut raw: HashMap<String, String>,
    ) -> Result<Self> {
        let total_rows = take_u64(import_id, &mut raw, fields::TOTAL_ROWS)?;
        let total_batches =
            take_u64(import_id, &mut raw, fields::TOTAL_BATCHES)?;
        let started_at = take_timestamp(import_id, &mut raw, fields::STARTED_AT)?
            .ok_or_else(|| {
                TrackerError::corrupt(import_id, "missing started_at")
            })?;
        let completed_at =
            take_timestamp(import_id, &mut raw, fields::COMPLETED_AT)?;
        let stored_id = raw
            .remove(fields::IMPORT_ID)
            .unwrap_or_else(|| import_id.to_string());

        let metadata = ImportMetadata {
            financer_id: raw.remove(fields::FINANCER_ID),
            user_id: raw.remove(fields::USER_ID),
            file_path: raw.remove(fields::FILE_PATH),
            extra: raw.into_iter().collect(),
        };

        Ok(Self {
            import_id: stored_id,
            total_rows,
            total_batches,
            started_at,
            completed_at,
            metadata,
        })
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct BatchCounters {
    pub processed_batches: u64,
    pub processed_rows: u64,
    pub failed_rows: u64,
}

impl BatchCounters {
    pub(crate) fn zeroed_fields() -> Vec<(String, String)> {
        [
            fields::PROCESSED_BATCHES,
            fields::PROCESSED_ROWS,
            fields::FAILED_ROWS,
        ]
        .into_iter()
        .map(|name| (name.to_string(), "0".to_string()))
        .collect()
    }

    /// An absent hash reads as zero: counters may expire a moment before
    /// the info record does.
    pub(crate) fn from_fields(
        import_id: &str,
        mut raw: HashMap<String, String>,
    ) -> Result<Self> {
        let mut read = |name: &str| -> Result<u64> {
            match raw.remove(name) {
                Some(value) => parse_u64(import_id, name, &value),
                None => Ok(0),
            }
        };
        Ok(Self {
            processed_batches: read(fields::PROCESSED_BATCHES)?,
            processed_rows: read(fields::PROCESSED_ROWS)?,
            failed_rows: read(fields::FAILED_ROWS)?,
        })
    }
}

/// One failed row, as produced by the upstream validator.
///
/// The tracker never inspects the payload; it is stored as JSON and handed
/// back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureRecord(pub Value);

impl FailureRecord {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// The `{ "row": ..., "error": ... }` shape emitted by row validation.
    pub fn for_row(row: impl Serialize, error: impl Into<String>) -> Result<Self> {
        let row = serde_json::to_value(row)?;
        Ok(Self(serde_json::json!({
            "row": row,
            "error": error.into(),
        })))
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn error_message(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    pub(crate) fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Entries that are not valid JSON come back as a JSON string rather
    /// than failing the whole read.
    pub(crate) fn decode(import_id: &str, raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => Self(value),
            Err(err) => {
                warn!(import_id = %import_id, error = %err, "failure record is not valid JSON");
                Self(Value::String(raw))
            }
        }
    }
}

impl From<Value> for FailureRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// What one worker reports after finishing one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Enables duplicate suppression when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u64>,
    pub processed: u64,
    pub failed: u64,
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    pub fn new(processed: u64, failed: u64) -> Self {
        Self {
            batch_number: None,
            processed,
            failed,
            failures: Vec::new(),
        }
    }

    pub fn for_batch(mut self, batch_number: u64) -> Self {
        self.batch_number = Some(batch_number);
        self
    }

    pub fn with_failures(
        mut self,
        failures: impl IntoIterator<Item = FailureRecord>,
    ) -> Self {
        self.failures.extend(failures);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Active,
    Completed,
}

/// Point-in-time view of one import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSnapshot {
    pub session: ImportSession,
    pub counters: BatchCounters,
    pub failures: Vec<FailureRecord>,
    /// Seconds from `started_at` to `completed_at`, or to the read time
    /// while still active.
    pub duration_secs: i64,
}

impl ImportSnapshot {
    pub fn state(&self) -> ImportState {
        if self.session.completed_at.is_some() {
            ImportState::Completed
        } else {
            ImportState::Active
        }
    }

    pub fn remaining_batches(&self) -> u64 {
        self.session
            .total_batches
            .saturating_sub(self.counters.processed_batches)
    }

    /// Fraction of batches reported, clamped to `[0, 1]`.
    pub fn progress_ratio(&self) -> f64 {
        if self.session.total_batches == 0 {
            return 0.0;
        }
        let ratio = self.counters.processed_batches as f64
            / self.session.total_batches as f64;
        ratio.min(1.0)
    }
}

/// Payload handed to the completion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub import_id: String,
    pub financer_id: Option<String>,
    pub user_id: Option<String>,
    pub file_path: Option<String>,
    pub total_rows: u64,
    pub snapshot: ImportSnapshot,
}

impl From<ImportSnapshot> for CompletionSignal {
    fn from(snapshot: ImportSnapshot) -> Self {
        let meta = &snapshot.session.metadata;
        Self {
            import_id: snapshot.session.import_id.clone(),
            financer_id: meta.financer_id.clone(),
            user_id: meta.user_id.clone(),
            file_path: meta.file_path.clone(),
            total_rows: snapshot.session.total_rows,
            snapshot,
        }
    }
}

pub(crate) fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_u64(import_id: &str, name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        TrackerError::corrupt(import_id, format!("{name} is not a count: {value:?}"))
    })
}

fn take_u64(
    import_id: &str,
    raw: &mut HashMap<String, String>,
    name: &str,
) -> Result<u64> {
    let value = raw
        .remove(name)
        .ok_or_else(|| TrackerError::corrupt(import_id, format!("missing {name}")))?;
    parse_u64(import_id, name, &value)
}

fn take_timestamp(
    import_id: &str,
    raw: &mut HashMap<String, String>,
    name: &str,
) -> Result<Option<DateTime<Utc>>> {
    raw.remove(name)
        .map(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|err| {
                    TrackerError::corrupt(
                        import_id,
                        format!("{name} is not RFC 3339 ({value:?}): {err}"),
                    )
                })
        })
        .transpose()
}
