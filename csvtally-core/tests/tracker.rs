use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use csvtally_core::{
    BatchOutcome, CompletionVerdict, ImportTracker, SkipReason, TrackerError,
    TrackerSettings,
    backend::{
        BatchApplied, BatchDelta, InMemoryBackend, ProgressBackend,
        RawSnapshot,
    },
    keys::ImportKeys,
    model::{
        BatchCounters, BatchReport, CompletionSignal, FailureRecord,
        ImportMetadata, ImportState,
    },
    notifier::ChannelNotifier,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

fn settings() -> TrackerSettings {
    TrackerSettings {
        completion_delay: Duration::ZERO,
        ..TrackerSettings::default()
    }
}

fn tracker_over<B>(
    backend: Arc<B>,
    settings: TrackerSettings,
) -> (ImportTracker<B>, UnboundedReceiver<CompletionSignal>)
where
    B: ProgressBackend + 'static,
{
    let (notifier, rx) = ChannelNotifier::new();
    let tracker =
        ImportTracker::with_settings(backend, Arc::new(notifier), settings);
    (tracker, rx)
}

fn memory_tracker() -> (
    ImportTracker<InMemoryBackend>,
    UnboundedReceiver<CompletionSignal>,
) {
    tracker_over(Arc::new(InMemoryBackend::new()), settings())
}

/// Drops the tracker and drains every signal that was ever scheduled.
async fn drain<B>(
    tracker: ImportTracker<B>,
    mut rx: UnboundedReceiver<CompletionSignal>,
) -> Vec<CompletionSignal>
where
    B: ProgressBackend + ?Sized,
{
    drop(tracker);
    let mut signals = Vec::new();
    while let Some(signal) = rx.recv().await {
        signals.push(signal);
    }
    signals
}

fn failure(email: &str, error: &str) -> FailureRecord {
    FailureRecord::for_row(json!({ "email": email }), error).unwrap()
}

#[tokio::test]
async fn ten_batch_import_completes_once() {
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-10", 1000, 10).await.unwrap();
    tracker
        .store_metadata(
            "imp-10",
            &ImportMetadata::new("fin-1", "user-7", "imports/users.csv"),
        )
        .await
        .unwrap();

    for _ in 0..9 {
        let outcome = tracker
            .update_batch_progress("imp-10", &BatchReport::new(100, 0))
            .await
            .unwrap();
        assert!(!outcome.completed_import());
    }

    let snapshot = tracker.get_snapshot("imp-10").await.unwrap().unwrap();
    assert_eq!(snapshot.counters.processed_batches, 9);
    assert_eq!(snapshot.counters.processed_rows, 900);
    assert_eq!(snapshot.session.completed_at, None);
    assert_eq!(snapshot.state(), ImportState::Active);

    let failure_a = failure("user1@example.com", "Email already exists");
    let failure_b = failure("user2@example.com", "Invalid email format");
    let last = BatchReport::new(100, 2)
        .with_failures([failure_a.clone(), failure_b.clone()]);
    let outcome = tracker.update_batch_progress("imp-10", &last).await.unwrap();
    assert_eq!(
        outcome,
        BatchOutcome::Applied {
            processed_batches: 10,
            total_batches: 10,
            completion: CompletionVerdict::Claimed,
        }
    );

    let snapshot = tracker.get_snapshot("imp-10").await.unwrap().unwrap();
    assert_eq!(
        snapshot.counters,
        BatchCounters {
            processed_batches: 10,
            processed_rows: 1000,
            failed_rows: 2,
        }
    );
    assert_eq!(snapshot.failures, vec![failure_a, failure_b]);
    assert!(snapshot.session.completed_at.is_some());
    assert_eq!(snapshot.state(), ImportState::Completed);

    let signals = drain(tracker, rx).await;
    assert_eq!(signals.len(), 1);
    let signal = &signals[0];
    assert_eq!(signal.import_id, "imp-10");
    assert_eq!(signal.total_rows, 1000);
    assert_eq!(signal.financer_id.as_deref(), Some("fin-1"));
    assert_eq!(signal.user_id.as_deref(), Some("user-7"));
    assert_eq!(signal.file_path.as_deref(), Some("imports/users.csv"));
    assert_eq!(signal.snapshot.counters.failed_rows, 2);
}

#[tokio::test(start_paused = true)]
async fn metadata_stored_during_delay_reaches_signal() {
    let (tracker, mut rx) = tracker_over(
        Arc::new(InMemoryBackend::new()),
        TrackerSettings::default(),
    );
    tracker.initialize("imp-late", 1000, 10).await.unwrap();

    let mut last = None;
    for _ in 0..10 {
        last = Some(
            tracker
                .update_batch_progress("imp-late", &BatchReport::new(100, 0))
                .await
                .unwrap(),
        );
    }
    assert!(last.unwrap().completed_import());

    tracker
        .store_metadata("imp-late", &ImportMetadata::new("fin", "usr", "f.csv"))
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());

    let signal = rx.recv().await.unwrap();
    assert_eq!(signal.import_id, "imp-late");
    assert_eq!(signal.total_rows, 1000);
    assert_eq!(signal.financer_id.as_deref(), Some("fin"));
    assert_eq!(signal.user_id.as_deref(), Some("usr"));
    assert_eq!(signal.file_path.as_deref(), Some("f.csv"));
    assert!(drain(tracker, rx).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cleanup_during_delay_drops_signal() {
    let (tracker, rx) = tracker_over(
        Arc::new(InMemoryBackend::new()),
        TrackerSettings::default(),
    );
    tracker.initialize("imp-cut", 10, 1).await.unwrap();
    let outcome = tracker
        .update_batch_progress("imp-cut", &BatchReport::new(10, 0))
        .await
        .unwrap();
    assert!(outcome.completed_import());

    tracker.cleanup("imp-cut").await.unwrap();
    assert!(drain(tracker, rx).await.is_empty());
}

#[tokio::test]
async fn snapshot_is_stable_without_updates() {
    let (tracker, _rx) = memory_tracker();
    tracker.initialize("imp-stable", 50, 5).await.unwrap();
    tracker
        .update_batch_progress(
            "imp-stable",
            &BatchReport::new(10, 1).with_failures([failure("x@y.z", "bad")]),
        )
        .await
        .unwrap();

    // Pin the derived duration by completing first.
    for _ in 0..4 {
        tracker
            .update_batch_progress("imp-stable", &BatchReport::new(10, 0))
            .await
            .unwrap();
    }

    let first = tracker.get_snapshot("imp-stable").await.unwrap();
    let second = tracker.get_snapshot("imp-stable").await.unwrap();
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn one_short_of_total_never_completes() {
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-short", 40, 4).await.unwrap();
    for _ in 0..3 {
        let outcome = tracker
            .update_batch_progress("imp-short", &BatchReport::new(10, 0))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            BatchOutcome::Applied {
                completion: CompletionVerdict::Pending,
                ..
            }
        ));
    }
    let snapshot = tracker.get_snapshot("imp-short").await.unwrap().unwrap();
    assert_eq!(snapshot.remaining_batches(), 1);
    assert_eq!(snapshot.session.completed_at, None);
    assert!(drain(tracker, rx).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reports_sum_and_complete_once() {
    const WORKERS: u64 = 64;
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-par", WORKERS * 25, WORKERS).await.unwrap();

    let handles: Vec<_> = (0..WORKERS)
        .map(|n| {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let report = BatchReport::new(25, 2).with_failures([
                    FailureRecord::new(json!({ "batch": n, "line": 1 })),
                    FailureRecord::new(json!({ "batch": n, "line": 2 })),
                ]);
                tracker.update_batch_progress("imp-par", &report).await
            })
        })
        .collect();

    let mut claimed = 0;
    for outcome in futures::future::join_all(handles).await {
        let outcome = outcome.unwrap().unwrap();
        if outcome.completed_import() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);

    let snapshot = tracker.get_snapshot("imp-par").await.unwrap().unwrap();
    assert_eq!(
        snapshot.counters,
        BatchCounters {
            processed_batches: WORKERS,
            processed_rows: WORKERS * 25,
            failed_rows: WORKERS * 2,
        }
    );
    assert_eq!(snapshot.failures.len() as u64, WORKERS * 2);

    assert_eq!(drain(tracker, rx).await.len(), 1);
}

/// Reports every increment as the one that reached the total, so all
/// concurrent callers race for the claim at once.
struct ThresholdStorm {
    inner: InMemoryBackend,
}

#[async_trait]
impl ProgressBackend for ThresholdStorm {
    async fn initialize(
        &self,
        keys: &ImportKeys,
        info: &[(String, String)],
        counters: &[(String, String)],
        ttl: Duration,
    ) -> csvtally_core::Result<()> {
        self.inner.initialize(keys, info, counters, ttl).await
    }

    async fn merge_info(
        &self,
        keys: &ImportKeys,
        fields: &[(String, String)],
    ) -> csvtally_core::Result<bool> {
        self.inner.merge_info(keys, fields).await
    }

    async fn apply_batch(
        &self,
        keys: &ImportKeys,
        delta: &BatchDelta,
    ) -> csvtally_core::Result<BatchApplied> {
        match self.inner.apply_batch(keys, delta).await? {
            BatchApplied::Applied { total_batches, .. } => {
                Ok(BatchApplied::Applied {
                    processed_batches: total_batches.unwrap_or(0),
                    total_batches,
                })
            }
            other => Ok(other),
        }
    }

    async fn claim_completion(
        &self,
        keys: &ImportKeys,
        completed_at: &str,
    ) -> csvtally_core::Result<bool> {
        tokio::task::yield_now().await;
        self.inner.claim_completion(keys, completed_at).await
    }

    async fn read(&self, keys: &ImportKeys) -> csvtally_core::Result<RawSnapshot> {
        self.inner.read(keys).await
    }

    async fn delete(&self, key: &str) -> csvtally_core::Result<()> {
        self.inner.delete(key).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_threshold_observers_fire_once() {
    let backend = Arc::new(ThresholdStorm {
        inner: InMemoryBackend::new(),
    });
    let (tracker, rx) = tracker_over(backend, settings());
    tracker.initialize("imp-storm", 100, 10).await.unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .update_batch_progress("imp-storm", &BatchReport::new(10, 0))
                    .await
            })
        })
        .collect();

    let verdicts: Vec<CompletionVerdict> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined.unwrap().unwrap() {
            BatchOutcome::Applied { completion, .. } => completion,
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();

    assert_eq!(
        verdicts
            .iter()
            .filter(|v| **v == CompletionVerdict::Claimed)
            .count(),
        1
    );
    assert_eq!(
        verdicts
            .iter()
            .filter(|v| **v == CompletionVerdict::AlreadyClaimed)
            .count(),
        9
    );
    assert_eq!(drain(tracker, rx).await.len(), 1);
}

/// Fails the first completion claim after the counter was already
/// incremented, the way a dropped connection would.
struct FlakyClaim {
    inner: InMemoryBackend,
    fail_next_claim: AtomicBool,
}

impl FlakyClaim {
    fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            fail_next_claim: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl ProgressBackend for FlakyClaim {
    async fn initialize(
        &self,
        keys: &ImportKeys,
        info: &[(String, String)],
        counters: &[(String, String)],
        ttl: Duration,
    ) -> csvtally_core::Result<()> {
        self.inner.initialize(keys, info, counters, ttl).await
    }

    async fn merge_info(
        &self,
        keys: &ImportKeys,
        fields: &[(String, String)],
    ) -> csvtally_core::Result<bool> {
        self.inner.merge_info(keys, fields).await
    }

    async fn apply_batch(
        &self,
        keys: &ImportKeys,
        delta: &BatchDelta,
    ) -> csvtally_core::Result<BatchApplied> {
        self.inner.apply_batch(keys, delta).await
    }

    async fn claim_completion(
        &self,
        keys: &ImportKeys,
        completed_at: &str,
    ) -> csvtally_core::Result<bool> {
        if self.fail_next_claim.swap(false, Ordering::SeqCst) {
            return Err(TrackerError::Unavailable(
                "connection reset during claim".to_string(),
            ));
        }
        self.inner.claim_completion(keys, completed_at).await
    }

    async fn read(&self, keys: &ImportKeys) -> csvtally_core::Result<RawSnapshot> {
        self.inner.read(keys).await
    }

    async fn delete(&self, key: &str) -> csvtally_core::Result<()> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn retry_after_failed_claim_completes_once() {
    let (tracker, rx) = tracker_over(Arc::new(FlakyClaim::new()), settings());
    tracker.initialize("imp-flaky", 20, 2).await.unwrap();

    let first = tracker
        .update_batch_progress("imp-flaky", &BatchReport::new(10, 0))
        .await
        .unwrap();
    assert!(!first.completed_import());

    let err = tracker
        .update_batch_progress("imp-flaky", &BatchReport::new(10, 0))
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let retry = tracker
        .update_batch_progress("imp-flaky", &BatchReport::new(10, 0))
        .await
        .unwrap();
    assert_eq!(
        retry,
        BatchOutcome::Applied {
            processed_batches: 3,
            total_batches: 2,
            completion: CompletionVerdict::Claimed,
        }
    );

    let again = tracker
        .update_batch_progress("imp-flaky", &BatchReport::new(10, 0))
        .await
        .unwrap();
    assert!(matches!(
        again,
        BatchOutcome::Applied {
            completion: CompletionVerdict::Overshot,
            ..
        }
    ));

    let signals = drain(tracker, rx).await;
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].import_id, "imp-flaky");
}

#[tokio::test]
async fn numbered_retry_after_failed_claim_completes_once() {
    let (tracker, rx) = tracker_over(Arc::new(FlakyClaim::new()), settings());
    tracker.initialize("imp-flaky-n", 20, 2).await.unwrap();

    tracker
        .update_batch_progress(
            "imp-flaky-n",
            &BatchReport::new(10, 0).for_batch(0),
        )
        .await
        .unwrap();
    let last = BatchReport::new(10, 0).for_batch(1);
    assert!(tracker.update_batch_progress("imp-flaky-n", &last).await.is_err());

    let retry = tracker
        .update_batch_progress("imp-flaky-n", &last)
        .await
        .unwrap();
    assert_eq!(
        retry,
        BatchOutcome::Skipped {
            reason: SkipReason::DuplicateBatch,
            completion: Some(CompletionVerdict::Claimed),
        }
    );
    assert!(retry.completed_import());

    let replay = tracker
        .update_batch_progress("imp-flaky-n", &last)
        .await
        .unwrap();
    assert_eq!(
        replay,
        BatchOutcome::Skipped {
            reason: SkipReason::DuplicateBatch,
            completion: Some(CompletionVerdict::AlreadyClaimed),
        }
    );

    let snapshot = tracker.get_snapshot("imp-flaky-n").await.unwrap().unwrap();
    assert_eq!(snapshot.counters.processed_batches, 2);
    assert_eq!(snapshot.counters.processed_rows, 20);
    assert!(snapshot.session.completed_at.is_some());
    assert_eq!(drain(tracker, rx).await.len(), 1);
}

#[tokio::test]
async fn duplicate_before_total_reports_no_completion() {
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-early", 30, 3).await.unwrap();
    let report = BatchReport::new(10, 0).for_batch(0);
    tracker.update_batch_progress("imp-early", &report).await.unwrap();

    let replay = tracker.update_batch_progress("imp-early", &report).await.unwrap();
    assert_eq!(
        replay,
        BatchOutcome::Skipped {
            reason: SkipReason::DuplicateBatch,
            completion: None,
        }
    );
    assert!(drain(tracker, rx).await.is_empty());
}

#[test]
fn skipped_outcome_serializes_without_empty_completion() {
    let outcome = BatchOutcome::Skipped {
        reason: SkipReason::DuplicateBatch,
        completion: None,
    };
    assert_eq!(
        serde_json::to_value(outcome).unwrap(),
        json!({ "outcome": "skipped", "reason": "duplicate_batch" })
    );
    let recovered = BatchOutcome::Skipped {
        reason: SkipReason::DuplicateBatch,
        completion: Some(CompletionVerdict::Claimed),
    };
    assert_eq!(
        serde_json::to_value(recovered).unwrap(),
        json!({ "outcome": "skipped", "reason": "duplicate_batch", "completion": "claimed" })
    );
}

#[tokio::test]
async fn uninitialized_update_is_a_soft_skip() {
    let (tracker, rx) = memory_tracker();
    let outcome = tracker
        .update_batch_progress(
            "never-started",
            &BatchReport::new(5, 1).with_failures([failure("a@b.c", "bad")]),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        BatchOutcome::Skipped {
            reason: SkipReason::NotInitialized,
            completion: None,
        }
    );
    assert_eq!(tracker.backend().key_count().await, 0);
    assert!(tracker.get_snapshot("never-started").await.unwrap().is_none());
    assert!(drain(tracker, rx).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_expires_after_ttl() {
    let backend = Arc::new(InMemoryBackend::new());
    let (tracker, _rx) = tracker_over(
        Arc::clone(&backend),
        TrackerSettings {
            ttl: Duration::from_secs(3600),
            ..settings()
        },
    );
    tracker.initialize("imp-ttl", 20, 2).await.unwrap();
    tracker
        .update_batch_progress(
            "imp-ttl",
            &BatchReport::new(10, 1)
                .for_batch(0)
                .with_failures([failure("a@b.c", "bad")]),
        )
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(3599)).await;
    assert!(tracker.get_snapshot("imp-ttl").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(tracker.get_snapshot("imp-ttl").await.unwrap().is_none());
    assert_eq!(backend.key_count().await, 0);

    let late = tracker
        .update_batch_progress("imp-ttl", &BatchReport::new(10, 0))
        .await
        .unwrap();
    assert_eq!(
        late,
        BatchOutcome::Skipped {
            reason: SkipReason::NotInitialized,
            completion: None,
        }
    );
}

#[tokio::test]
async fn writes_never_extend_the_ttl() {
    let backend = Arc::new(InMemoryBackend::new());
    let (tracker, _rx) = tracker_over(Arc::clone(&backend), settings());
    tracker.initialize("imp-fixed", 20, 4).await.unwrap();
    let keys = tracker.keys_for("imp-fixed");
    let before = backend.ttl(&keys.counters).await.unwrap();

    tracker
        .update_batch_progress("imp-fixed", &BatchReport::new(5, 0))
        .await
        .unwrap();
    let after = backend.ttl(&keys.counters).await.unwrap();
    assert!(after <= before);
}

#[tokio::test]
async fn cache_outage_is_a_hard_error() {
    let backend = Arc::new(InMemoryBackend::new());
    let (tracker, _rx) = tracker_over(Arc::clone(&backend), settings());
    tracker.initialize("imp-down", 20, 2).await.unwrap();

    backend.set_unavailable(true);
    let err = tracker
        .update_batch_progress("imp-down", &BatchReport::new(10, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Unavailable(_)));
    assert!(err.is_transient());
    assert!(tracker.cleanup("imp-down").await.is_err());

    backend.set_unavailable(false);
    let snapshot = tracker.get_snapshot("imp-down").await.unwrap().unwrap();
    assert_eq!(snapshot.counters.processed_batches, 0);
}

#[tokio::test]
async fn numbered_duplicates_are_ignored() {
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-dup", 30, 3).await.unwrap();

    for batch in [0, 1, 1, 0, 2] {
        tracker
            .update_batch_progress(
                "imp-dup",
                &BatchReport::new(10, 0).for_batch(batch),
            )
            .await
            .unwrap();
    }

    let snapshot = tracker.get_snapshot("imp-dup").await.unwrap().unwrap();
    assert_eq!(snapshot.counters.processed_batches, 3);
    assert_eq!(snapshot.counters.processed_rows, 30);
    assert_eq!(snapshot.state(), ImportState::Completed);
    assert_eq!(drain(tracker, rx).await.len(), 1);
}

#[tokio::test]
async fn unnumbered_duplicates_overshoot_without_refiring() {
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-over", 20, 2).await.unwrap();

    let mut verdicts = Vec::new();
    for _ in 0..4 {
        match tracker
            .update_batch_progress("imp-over", &BatchReport::new(10, 0))
            .await
            .unwrap()
        {
            BatchOutcome::Applied { completion, .. } => verdicts.push(completion),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(
        verdicts,
        vec![
            CompletionVerdict::Pending,
            CompletionVerdict::Claimed,
            CompletionVerdict::Overshot,
            CompletionVerdict::Overshot,
        ]
    );
    assert_eq!(drain(tracker, rx).await.len(), 1);
}

#[tokio::test]
async fn reinitialize_starts_from_zero() {
    let (tracker, rx) = memory_tracker();
    tracker.initialize("imp-again", 10, 2).await.unwrap();
    tracker
        .update_batch_progress(
            "imp-again",
            &BatchReport::new(9, 1)
                .for_batch(0)
                .with_failures([failure("a@b.c", "bad")]),
        )
        .await
        .unwrap();

    tracker.initialize("imp-again", 10, 1).await.unwrap();
    let snapshot = tracker.get_snapshot("imp-again").await.unwrap().unwrap();
    assert_eq!(snapshot.counters, BatchCounters::default());
    assert!(snapshot.failures.is_empty());
    assert_eq!(snapshot.session.completed_at, None);

    assert_eq!(snapshot.session.total_batches, 1);

    // The ledger was cleared too, so batch 0 counts again.
    let outcome = tracker
        .update_batch_progress(
            "imp-again",
            &BatchReport::new(10, 0).for_batch(0),
        )
        .await
        .unwrap();
    assert!(outcome.completed_import());
    assert_eq!(drain(tracker, rx).await.len(), 1);
}

#[tokio::test]
async fn cleanup_removes_the_whole_group() {
    let (tracker, _rx) = memory_tracker();
    tracker.initialize("imp-gone", 10, 2).await.unwrap();
    tracker
        .update_batch_progress(
            "imp-gone",
            &BatchReport::new(5, 1)
                .for_batch(0)
                .with_failures([failure("a@b.c", "bad")]),
        )
        .await
        .unwrap();
    assert!(tracker.backend().key_count().await > 0);

    tracker.cleanup("imp-gone").await.unwrap();
    assert_eq!(tracker.backend().key_count().await, 0);
    assert!(tracker.get_snapshot("imp-gone").await.unwrap().is_none());
}

#[tokio::test]
async fn metadata_does_not_touch_counters() {
    let (tracker, _rx) = memory_tracker();
    tracker.initialize("imp-meta", 10, 2).await.unwrap();
    tracker
        .update_batch_progress("imp-meta", &BatchReport::new(5, 0))
        .await
        .unwrap();
    tracker
        .store_metadata(
            "imp-meta",
            &ImportMetadata::new("fin", "usr", "f.csv").with_extra("locale", "fr-FR"),
        )
        .await
        .unwrap();

    let snapshot = tracker.get_snapshot("imp-meta").await.unwrap().unwrap();
    assert_eq!(snapshot.counters.processed_rows, 5);
    assert_eq!(snapshot.session.total_batches, 2);
    assert_eq!(
        snapshot.session.metadata.extra.get("locale").map(String::as_str),
        Some("fr-FR")
    );
}
