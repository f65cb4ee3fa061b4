//! Import progress tracking service.
//!
//! [`ImportTracker`] is shared by the dispatcher that starts an import, the
//! workers that report batches, and whatever serves status queries. It holds
//! no per-import state itself: everything lives in the injected
//! [`ProgressBackend`], so any number of processes can hold their own
//! tracker over the same cache.

use std::{any::type_name_of_val, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    backend::ProgressBackend,
    keys::{DEFAULT_KEY_PREFIX, ImportKeys, KeyScheme},
    notifier::{CompletionNotifier, DelayedNotifier},
};

mod aggregate;
mod completion;
mod lifecycle;
mod progress;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub key_prefix: String,
    /// Retention applied to every key at initialization; never renewed.
    pub ttl: Duration,
    /// Pause before the completion signal reaches the notifier.
    pub completion_delay: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl: DEFAULT_TTL,
            completion_delay: DEFAULT_COMPLETION_DELAY,
        }
    }
}

/// Why a write was accepted without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The session was never initialized or has expired.
    NotInitialized,
    /// The batch number had already been applied.
    DuplicateBatch,
}

/// What the completion detector concluded for one applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionVerdict {
    /// Threshold not reached yet.
    Pending,
    /// This call reached the threshold and won the claim.
    Claimed,
    /// This call reached the threshold but the claim was already held.
    AlreadyClaimed,
    /// The counter passed the threshold and the claim was already held;
    /// only duplicate reports get here.
    Overshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BatchOutcome {
    Applied {
        processed_batches: u64,
        total_batches: u64,
        completion: CompletionVerdict,
    },
    Skipped {
        reason: SkipReason,
        /// Set when a rejected duplicate found the import finished but
        /// unclaimed and went on to claim it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completion: Option<CompletionVerdict>,
    },
}

impl BatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, BatchOutcome::Applied { .. })
    }

    /// True only for the single call that fired the completion signal.
    pub fn completed_import(&self) -> bool {
        matches!(
            self,
            BatchOutcome::Applied {
                completion: CompletionVerdict::Claimed,
                ..
            } | BatchOutcome::Skipped {
                completion: Some(CompletionVerdict::Claimed),
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WriteOutcome {
    Applied,
    Skipped { reason: SkipReason },
}

pub struct ImportTracker<B>
where
    B: ProgressBackend + ?Sized,
{
    backend: Arc<B>,
    notifier: DelayedNotifier,
    keys: KeyScheme,
    ttl: Duration,
}

impl<B> Clone for ImportTracker<B>
where
    B: ProgressBackend + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            notifier: self.notifier.clone(),
            keys: self.keys.clone(),
            ttl: self.ttl,
        }
    }
}

impl<B> fmt::Debug for ImportTracker<B>
where
    B: ProgressBackend + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportTracker")
            .field("backend", &type_name_of_val(self.backend.as_ref()))
            .field("notifier", &self.notifier)
            .field("key_prefix", &self.keys.prefix())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<B> ImportTracker<B>
where
    B: ProgressBackend + ?Sized,
{
    pub fn new(backend: Arc<B>, notifier: Arc<dyn CompletionNotifier>) -> Self {
        Self::with_settings(backend, notifier, TrackerSettings::default())
    }

    pub fn with_settings(
        backend: Arc<B>,
        notifier: Arc<dyn CompletionNotifier>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            backend,
            notifier: DelayedNotifier::new(notifier, settings.completion_delay),
            keys: KeyScheme::new(settings.key_prefix),
            ttl: settings.ttl,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn keys_for(&self, import_id: &str) -> ImportKeys {
        self.keys.keys(import_id)
    }
}
