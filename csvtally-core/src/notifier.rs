//! Hand-off of completion signals to the downstream collaborator.

use std::{any::type_name_of_val, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::model::CompletionSignal;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("completion receiver closed")]
    Closed,

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Turns a completion signal into whatever the application does next
/// (email, webhook, job enqueue). Delivery is at-least-once at best.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, signal: CompletionSignal) -> Result<(), NotifyError>;
}

/// Forwards signals onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<CompletionSignal>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletionSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CompletionNotifier for ChannelNotifier {
    async fn notify(&self, signal: CompletionSignal) -> Result<(), NotifyError> {
        self.tx.send(signal).map_err(|_| NotifyError::Closed)
    }
}

/// Drops every signal. Useful when only status queries matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CompletionNotifier for NoopNotifier {
    async fn notify(&self, signal: CompletionSignal) -> Result<(), NotifyError> {
        debug!(import_id = %signal.import_id, "completion signal dropped");
        Ok(())
    }
}

/// Delivers on a spawned task after a fixed delay so the reporting worker
/// never waits on the downstream collaborator.
#[derive(Clone)]
pub struct DelayedNotifier {
    inner: Arc<dyn CompletionNotifier>,
    delay: Duration,
}

impl fmt::Debug for DelayedNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedNotifier")
            .field("inner", &type_name_of_val(self.inner.as_ref()))
            .field("delay", &self.delay)
            .finish()
    }
}

impl DelayedNotifier {
    pub fn new(inner: Arc<dyn CompletionNotifier>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, signal: CompletionSignal) {
        let import_id = signal.import_id.clone();
        self.schedule_with(import_id, async move { Ok(Some(signal)) });
    }

    /// Waits out the delay, then builds the signal with `load` and
    /// delivers it. Whatever `load` reads reflects writes made during the
    /// delay. `Ok(None)` means the import is gone and nothing is sent.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule_with<F>(&self, import_id: String, load: F)
    where
        F: Future<Output = crate::error::Result<Option<CompletionSignal>>>
            + Send
            + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let delay = self.delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let signal = match load.await {
                Ok(Some(signal)) => signal,
                Ok(None) => {
                    error!(import_id = %import_id, "Could not retrieve import data for completion");
                    return;
                }
                Err(err) => {
                    error!(import_id = %import_id, error = %err, "Could not retrieve import data for completion");
                    return;
                }
            };
            match inner.notify(signal).await {
                Ok(()) => {
                    debug!(import_id = %import_id, "completion signal delivered")
                }
                Err(err) => {
                    error!(import_id = %import_id, error = %err, "completion signal lost")
                }
            }
        });
    }
}

#[async_trait]
impl CompletionNotifier for DelayedNotifier {
    async fn notify(&self, signal: CompletionSignal) -> Result<(), NotifyError> {
        self.schedule(signal);
        Ok(())
    }
}
