//! Progress reporting abstraction
//!
//! The conversion engine notifies an observer after every item state
//! transition. Delivery is fire-and-forget: a slow or closed observer never
//! blocks or fails the mutation that triggered the notification.

use crate::modules::converter::BatchProgress;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Progress reporter for batch operations
pub trait ProgressReporter: Send + Sync {
    /// Called after every item state transition with a full snapshot
    fn report(&self, progress: &BatchProgress);

    /// Called once with the final snapshot after a batch finishes
    fn report_complete(&self, progress: &BatchProgress);

    /// Called when a batch fails at the stage level
    fn report_error(&self, error: &str);
}

/// Outward notification emitted by the orchestration layer
///
/// Variants correspond to the `batch-progress`, `processing-complete` and
/// `processing-error` events consumed by a UI shell.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum BatchEvent {
    /// Snapshot after an item state transition
    BatchProgress(BatchProgress),
    /// Final snapshot for a finished batch
    ProcessingComplete(BatchProgress),
    /// Stage-level failure message
    ProcessingError(String),
}

/// Reporter that forwards events over an unbounded channel
///
/// Send failures (receiver dropped) are ignored so a disappearing consumer
/// cannot fail the batch.
pub struct ChannelReporter {
    sender: UnboundedSender<BatchEvent>,
}

impl ChannelReporter {
    /// Wrap an event channel sender
    #[must_use]
    pub const fn new(sender: UnboundedSender<BatchEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, progress: &BatchProgress) {
        let _ = self.sender.send(BatchEvent::BatchProgress(progress.clone()));
    }

    fn report_complete(&self, progress: &BatchProgress) {
        let _ = self
            .sender
            .send(BatchEvent::ProcessingComplete(progress.clone()));
    }

    fn report_error(&self, error: &str) {
        let _ = self
            .sender
            .send(BatchEvent::ProcessingError(error.to_owned()));
    }
}

/// Reporter that writes progress to the application log
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, progress: &BatchProgress) {
        log::debug!(
            "batch progress: {}/{} done ({} failed, {}%)",
            progress.completed + progress.failed,
            progress.total,
            progress.failed,
            progress.overall_progress
        );
    }

    fn report_complete(&self, progress: &BatchProgress) {
        log::info!(
            "batch complete: {} succeeded, {} failed",
            progress.completed,
            progress.failed
        );
    }

    fn report_error(&self, error: &str) {
        log::error!("batch error: {error}");
    }
}

/// Reporter that discards all notifications
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _progress: &BatchProgress) {}
    fn report_complete(&self, _progress: &BatchProgress) {}
    fn report_error(&self, _error: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::converter::BatchProgress;

    #[tokio::test]
    async fn test_channel_reporter_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reporter = ChannelReporter::new(tx);

        let snapshot = BatchProgress::new(Vec::new());
        reporter.report(&snapshot);
        reporter.report_complete(&snapshot);
        reporter.report_error("boom");

        assert!(matches!(
            rx.recv().await.unwrap(),
            BatchEvent::BatchProgress(_)
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            BatchEvent::ProcessingComplete(_)
        ));
        match rx.recv().await.unwrap() {
            BatchEvent::ProcessingError(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_channel_reporter_survives_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);

        let reporter = ChannelReporter::new(tx);
        // Must not panic or error
        reporter.report(&BatchProgress::new(Vec::new()));
        reporter.report_error("ignored");
    }

    #[test]
    fn test_event_serialization_uses_kebab_case() {
        let event = BatchEvent::ProcessingError("oops".to_owned());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("processing-error"));
        assert!(json.contains("oops"));
    }
}
