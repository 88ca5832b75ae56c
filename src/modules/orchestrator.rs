//! Batch orchestration: backup, convert, log
//!
//! Ties the pipeline stages together for one batch: validates input, takes
//! backups of the originals (aborting if the backup stage itself is broken),
//! runs the conversion engine with a registered cancellation token, then
//! appends the history log best-effort.

use crate::modules::backup::{BackupBatchResult, BackupManager};
use crate::modules::batch_log::LogManager;
use crate::modules::converter::{self, BatchProgress, ConversionOptions};
use crate::progress::ProgressReporter;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one fully orchestrated batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    /// Id the batch was registered under (usable for cancellation)
    pub batch_id: String,
    /// Human-readable result line
    pub message: String,
    /// Final conversion snapshot
    pub progress: BatchProgress,
    /// Per-file backup outcomes
    pub backup: BackupBatchResult,
}

/// Subscription tier gating the batch size a caller may submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Free tier
    Free,
    /// Basic tier
    Basic,
    /// Pro tier
    Pro,
}

impl SubscriptionTier {
    /// Maximum number of files per batch for this tier
    #[must_use]
    pub const fn max_batch_size(self) -> usize {
        match self {
            Self::Free => 10,
            Self::Basic => 50,
            Self::Pro => 200,
        }
    }

    /// Whether a batch of the given size is allowed
    ///
    /// Consulted by callers before submitting; the pipeline itself does not
    /// enforce it.
    #[must_use]
    pub const fn allows(self, batch_size: usize) -> bool {
        batch_size <= self.max_batch_size()
    }
}

/// Run one complete batch through backup, conversion and logging
///
/// Stage order and failure policy:
/// 1. an empty output directory fails validation before anything is touched;
/// 2. the backup stage runs first and a stage-level failure aborts the batch
///    before any conversion starts (per-file backup failures do not);
/// 3. the conversion engine runs with a freshly registered cancellation
///    token, removed again when the batch finishes;
/// 4. the log append is best-effort, its failure only produces a warning.
///
/// # Errors
///
/// Returns error when validation fails, the backup stage is unusable, or the
/// engine reports a batch-level fault
pub async fn start_batch_process(
    state: &AppState,
    backup: &BackupManager,
    log: &LogManager,
    files: &[String],
    output_dir: &str,
    options: &ConversionOptions,
    reporter: &dyn ProgressReporter,
) -> Result<ProcessSummary, String> {
    if output_dir.trim().is_empty() {
        let error = "no output directory".to_owned();
        reporter.report_error(&error);
        return Err(error);
    }

    let batch_id = Uuid::new_v4().to_string();
    log::info!("batch {batch_id}: {} file(s) queued", files.len());

    let backup_result = match backup
        .backup_batch(files, &|p| {
            log::debug!(
                "backup progress: {}/{} ({}%)",
                p.completed + p.failed,
                p.total,
                p.overall_progress
            );
        })
        .await
    {
        Ok(result) => result,
        Err(error) => {
            let error = format!("backup stage failed: {error}");
            log::error!("batch {batch_id}: {error}");
            reporter.report_error(&error);
            return Err(error);
        }
    };
    if backup_result.failed_count > 0 {
        log::warn!(
            "batch {batch_id}: {} file(s) could not be backed up",
            backup_result.failed_count
        );
    }

    let token = tokio_util::sync::CancellationToken::new();
    {
        let mut tokens = state.batch_tokens.lock().await;
        tokens.insert(batch_id.clone(), token.clone());
    }

    let engine_result =
        converter::process_batch(files, output_dir, options, &token, reporter).await;

    {
        let mut tokens = state.batch_tokens.lock().await;
        tokens.remove(&batch_id);
    }

    let progress = match engine_result {
        Ok(progress) => progress,
        Err(e) => {
            let error = e.to_string();
            reporter.report_error(&error);
            return Err(error);
        }
    };

    // History is best-effort; a broken log directory must not fail the batch
    if let Err(e) = log.append_batch_log(&progress, options) {
        log::warn!("batch {batch_id}: log append failed: {e}");
    }

    reporter.report_complete(&progress);

    let message = format!("{} succeeded, {} failed", progress.completed, progress.failed);
    log::info!("batch {batch_id}: {message}");

    Ok(ProcessSummary {
        batch_id,
        message,
        progress,
        backup: backup_result,
    })
}

/// Cancel an in-flight batch by id
///
/// The token stays registered until the engine finishes draining, so
/// repeated cancellation of a running batch is idempotent.
///
/// # Errors
///
/// Returns error when no batch with this id is in flight
pub async fn cancel_batch_process(state: &AppState, batch_id: &str) -> Result<(), String> {
    let tokens = state.batch_tokens.lock().await;
    match tokens.get(batch_id) {
        Some(token) => {
            token.cancel();
            log::info!("batch {batch_id}: cancellation requested");
            Ok(())
        }
        None => Err(format!("No batch in progress: {batch_id}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::converter::{ImageFormat, ItemStatus};
    use crate::progress::NullReporter;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_test_png(path: &Path, w: u32, h: u32) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([5, 5, 5, 255]));
        img.save(path).unwrap();
    }

    fn options(format: ImageFormat) -> ConversionOptions {
        ConversionOptions {
            format,
            quality: 80,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
            compression_level: None,
        }
    }

    fn managers(root: &Path) -> (BackupManager, LogManager) {
        (
            BackupManager::new(root.join("backup")),
            LogManager::new(root.join("logs")),
        )
    }

    #[tokio::test]
    async fn test_empty_output_dir_rejected_before_any_stage() {
        let temp_dir = TempDir::new().unwrap();
        let (backup, log) = managers(temp_dir.path());
        let state = AppState::new();

        let result = start_batch_process(
            &state,
            &backup,
            &log,
            &["whatever.png".to_owned()],
            "  ",
            &options(ImageFormat::Webp),
            &NullReporter,
        )
        .await;

        assert_eq!(result.unwrap_err(), "no output directory");
        // Nothing was touched
        assert!(!temp_dir.path().join("backup").exists());
        assert!(!temp_dir.path().join("logs").exists());
    }

    #[tokio::test]
    async fn test_full_pipeline_backs_up_converts_and_logs() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("cat.png");
        write_test_png(&input, 8, 8);

        let (backup, log) = managers(temp_dir.path());
        let state = AppState::new();
        let out_dir = temp_dir.path().join("out");

        let summary = start_batch_process(
            &state,
            &backup,
            &log,
            &[input.to_string_lossy().to_string()],
            &out_dir.to_string_lossy(),
            &options(ImageFormat::Jpg),
            &NullReporter,
        )
        .await
        .unwrap();

        assert_eq!(summary.message, "1 succeeded, 0 failed");
        assert_eq!(summary.progress.overall_progress, 100);
        assert_eq!(summary.backup.success_count, 1);
        assert!(out_dir.join("cat.jpg").exists());
        assert_eq!(backup.list_backups(None).unwrap().len(), 1);
        assert_eq!(log.get_log_history(None, None).unwrap().len(), 1);

        // Token was cleaned up
        assert!(state.batch_tokens.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_backup_stage_failure_aborts_conversion() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("cat.png");
        write_test_png(&input, 8, 8);

        // Put a plain file where the backup root should be
        let backup_root = temp_dir.path().join("backup");
        std::fs::write(&backup_root, b"in the way").unwrap();

        let backup = BackupManager::new(&backup_root);
        let log = LogManager::new(temp_dir.path().join("logs"));
        let state = AppState::new();
        let out_dir = temp_dir.path().join("out");

        let result = start_batch_process(
            &state,
            &backup,
            &log,
            &[input.to_string_lossy().to_string()],
            &out_dir.to_string_lossy(),
            &options(ImageFormat::Webp),
            &NullReporter,
        )
        .await;

        assert!(result.unwrap_err().contains("backup stage failed"));
        // No conversion output was produced
        assert!(!out_dir.join("cat.webp").exists());
    }

    #[tokio::test]
    async fn test_per_file_backup_failure_does_not_abort() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.png");
        write_test_png(&good, 8, 8);

        let (backup, log) = managers(temp_dir.path());
        let state = AppState::new();
        let out_dir = temp_dir.path().join("out");

        let files = vec![
            good.to_string_lossy().to_string(),
            temp_dir.path().join("ghost.png").to_string_lossy().to_string(),
        ];
        let summary = start_batch_process(
            &state,
            &backup,
            &log,
            &files,
            &out_dir.to_string_lossy(),
            &options(ImageFormat::Png),
            &NullReporter,
        )
        .await
        .unwrap();

        assert_eq!(summary.backup.failed_count, 1);
        // Conversion still ran for both; the missing file failed there too
        assert_eq!(summary.progress.completed, 1);
        assert_eq!(summary.progress.failed, 1);
        assert!(out_dir.join("good.png").exists());
    }

    #[tokio::test]
    async fn test_broken_log_directory_is_best_effort() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("cat.png");
        write_test_png(&input, 8, 8);

        let backup = BackupManager::new(temp_dir.path().join("backup"));
        // Put a plain file where the log root should be
        let log_root = temp_dir.path().join("logs");
        std::fs::write(&log_root, b"in the way").unwrap();
        let log = LogManager::new(&log_root);

        let state = AppState::new();
        let out_dir = temp_dir.path().join("out");

        let summary = start_batch_process(
            &state,
            &backup,
            &log,
            &[input.to_string_lossy().to_string()],
            &out_dir.to_string_lossy(),
            &options(ImageFormat::Jpg),
            &NullReporter,
        )
        .await
        .unwrap();

        // Batch succeeded even though nothing could be logged
        assert_eq!(summary.progress.completed, 1);
        assert!(out_dir.join("cat.jpg").exists());
    }

    #[tokio::test]
    async fn test_cancel_unknown_batch_errors() {
        let state = AppState::new();
        let result = cancel_batch_process(&state, "nonexistent").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("No batch in progress"));
    }

    #[tokio::test]
    async fn test_cancel_registered_batch() {
        let state = AppState::new();
        let token = tokio_util::sync::CancellationToken::new();
        {
            let mut tokens = state.batch_tokens.lock().await;
            tokens.insert("batch-1".to_owned(), token.clone());
        }

        cancel_batch_process(&state, "batch-1").await.unwrap();
        assert!(token.is_cancelled());

        // Idempotent while still registered
        cancel_batch_process(&state, "batch-1").await.unwrap();
    }

    #[test]
    fn test_tier_limits() {
        assert_eq!(SubscriptionTier::Free.max_batch_size(), 10);
        assert_eq!(SubscriptionTier::Basic.max_batch_size(), 50);
        assert_eq!(SubscriptionTier::Pro.max_batch_size(), 200);

        assert!(SubscriptionTier::Free.allows(10));
        assert!(!SubscriptionTier::Free.allows(11));
        assert!(SubscriptionTier::Pro.allows(200));
        assert!(!SubscriptionTier::Pro.allows(201));
    }
}
