//! Conversion engine: sequential batch image transcoding
//!
//! One call to [`process_batch`] is one batch: a list of input files sharing
//! a single set of options. Items are processed strictly in input order, one
//! at a time. Per-item failures are recorded and never abort the batch;
//! cancellation drains the remaining items as failed so the final snapshot is
//! always closed (no item left pending or processing).

use crate::error::AppError;
use crate::modules::codec;
use crate::modules::file_utils::timestamp_ms;
use crate::progress::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Error message recorded on items drained after a cancellation
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// WebP (lossless in the current codec backend)
    Webp,
    /// AVIF
    Avif,
    /// JPEG
    Jpg,
    /// PNG
    Png,
    /// GIF
    Gif,
    /// BMP
    Bmp,
    /// TIFF
    Tiff,
}

impl ImageFormat {
    /// File extension used for output naming
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "tiff" | "tif" => Ok(Self::Tiff),
            other => Err(AppError::InvalidData(format!(
                "unsupported output format: {other}"
            ))),
        }
    }
}

/// Options for one batch, immutable for its duration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Target format
    pub format: ImageFormat,
    /// Quality 0-100 (meaning depends on the target format)
    pub quality: u8,
    /// Resize width in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Resize height in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Fit inside the target box instead of stretching to it
    #[serde(default)]
    pub maintain_aspect_ratio: bool,
    /// Compression effort 0-9 (higher is slower but smaller)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<u8>,
}

/// Processing state of one batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Created, not yet visited by the engine
    Pending,
    /// Currently being converted
    Processing,
    /// Converted successfully
    Completed,
    /// Conversion failed or was cancelled before starting
    Failed,
}

/// One file's conversion unit within a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    /// Unique item id
    pub id: String,
    /// Source file path
    pub input_path: String,
    /// Deterministically derived destination path
    pub output_path: String,
    /// Current state; transitions are monotonic, never regressing
    pub status: ItemStatus,
    /// Per-item progress 0-100
    pub progress: u8,
    /// Failure description when status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Input file size in bytes, recorded when the item starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    /// Output file size in bytes, recorded on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_size: Option<u64>,
    /// Start timestamp, milliseconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// End timestamp, milliseconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl BatchItem {
    /// Create a pending item for one input file
    #[must_use]
    pub fn new(input_path: &str, output_dir: &Path, format: ImageFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input_path: input_path.to_owned(),
            output_path: generate_output_path(Path::new(input_path), output_dir, format)
                .to_string_lossy()
                .to_string(),
            status: ItemStatus::Pending,
            progress: 0,
            error: None,
            original_size: None,
            converted_size: None,
            start_time: None,
            end_time: None,
        }
    }
}

/// Aggregate state of one in-flight batch
///
/// Exclusively owned by the engine for the duration of one `process_batch`
/// call; observers only see it through snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// Total number of items
    pub total: usize,
    /// Items converted successfully
    pub completed: usize,
    /// Items failed or cancelled
    pub failed: usize,
    /// Items currently processing (0 or 1 in sequential execution)
    pub processing: usize,
    /// Overall progress 0-100
    pub overall_progress: u8,
    /// All items, in input order
    pub items: Vec<BatchItem>,
}

impl BatchProgress {
    /// Initialize a snapshot for the given items
    #[must_use]
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            total: items.len(),
            completed: 0,
            failed: 0,
            processing: 0,
            overall_progress: 0,
            items,
        }
    }

    /// Recompute the overall percentage from the settled item counts
    pub fn recompute_overall(&mut self) {
        self.overall_progress = if self.total == 0 {
            0
        } else {
            (100.0 * (self.completed + self.failed) as f64 / self.total as f64).round() as u8
        };
    }
}

/// Basic information about a produced file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Full path
    pub path: String,
    /// File name with extension
    pub name: String,
    /// Extension without the leading dot
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Pixel width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Derive the output path for one input file
///
/// `{output_dir}/{input stem}.{format extension}`. Deterministic: two inputs
/// with the same stem in different directories map to the same output path
/// (caller responsibility, not deduplicated here).
#[must_use]
pub fn generate_output_path(input: &Path, output_dir: &Path, format: ImageFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().to_string());
    output_dir.join(format!("{stem}.{}", format.extension()))
}

/// Convert a single image file
///
/// Verifies the input exists, creates the output directory if missing, runs
/// the codec on a blocking thread and stats the result.
///
/// # Errors
///
/// Returns error if the input is missing, the codec rejects it, or the
/// output cannot be written
pub async fn process_image(
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> Result<FileInfo, AppError> {
    if tokio::fs::metadata(input).await.is_err() {
        return Err(AppError::FileNotFound {
            path: input.to_string_lossy().to_string(),
        });
    }

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let input_buf = input.to_path_buf();
    let output_buf = output.to_path_buf();
    let opts = options.clone();
    let (width, height) = tokio::task::spawn_blocking(move || {
        codec::convert_image(&input_buf, &output_buf, &opts)
    })
    .await
    .map_err(|e| AppError::InvalidData(format!("codec task failed: {e}")))??;

    let meta = tokio::fs::metadata(output).await?;
    Ok(FileInfo {
        path: output.to_string_lossy().to_string(),
        name: output
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().to_string()),
        extension: output
            .extension()
            .map_or_else(String::new, |e| e.to_string_lossy().to_string()),
        size: meta.len(),
        width: Some(width),
        height: Some(height),
    })
}

/// Convert a list of files sequentially, reporting progress and honoring
/// cancellation
///
/// The initial snapshot is reported before any conversion starts; after that
/// every item state transition produces one report. Once the token is
/// cancelled, the remaining items are drained as failed (the in-flight codec
/// call is allowed to finish first). Per-item failures are recorded on the
/// item and never returned as `Err`.
///
/// # Errors
///
/// Returns error only for batch-level faults; individual file failures are
/// visible via the `failed` count of the returned snapshot
pub async fn process_batch(
    files: &[String],
    output_dir: &str,
    options: &ConversionOptions,
    cancel_token: &CancellationToken,
    reporter: &dyn ProgressReporter,
) -> Result<BatchProgress, AppError> {
    let output_dir_path = Path::new(output_dir);

    let items: Vec<BatchItem> = files
        .iter()
        .map(|f| BatchItem::new(f, output_dir_path, options.format))
        .collect();
    let mut progress = BatchProgress::new(items);

    log::info!(
        "starting batch: {} file(s) -> {} ({})",
        progress.total,
        output_dir,
        options.format.extension()
    );

    // Initial snapshot before any conversion starts
    reporter.report(&progress);

    for idx in 0..progress.items.len() {
        if cancel_token.is_cancelled() {
            // Drain: mark failed without invoking the codec so the final
            // snapshot stays closed
            {
                let item = &mut progress.items[idx];
                item.status = ItemStatus::Failed;
                item.error = Some(AppError::Cancelled.to_string());
                item.end_time = Some(timestamp_ms());
            }
            progress.failed += 1;
            progress.recompute_overall();
            reporter.report(&progress);
            continue;
        }

        let (input_path, output_path) = {
            let item = &mut progress.items[idx];
            item.status = ItemStatus::Processing;
            item.start_time = Some(timestamp_ms());
            item.original_size = tokio::fs::metadata(&item.input_path)
                .await
                .ok()
                .map(|m| m.len());
            (
                PathBuf::from(&item.input_path),
                PathBuf::from(&item.output_path),
            )
        };
        progress.processing += 1;
        reporter.report(&progress);

        let result = process_image(&input_path, &output_path, options).await;

        progress.processing -= 1;
        {
            let item = &mut progress.items[idx];
            item.end_time = Some(timestamp_ms());
            match result {
                Ok(info) => {
                    item.status = ItemStatus::Completed;
                    item.progress = 100;
                    item.converted_size = Some(info.size);
                }
                Err(e) => {
                    item.status = ItemStatus::Failed;
                    item.error = Some(e.to_string());
                    log::debug!("item failed: {} ({e})", item.input_path);
                }
            }
        }
        match progress.items[idx].status {
            ItemStatus::Completed => progress.completed += 1,
            _ => progress.failed += 1,
        }
        progress.recompute_overall();
        reporter.report(&progress);
    }

    log::info!(
        "batch finished: {} succeeded, {} failed",
        progress.completed,
        progress.failed
    );

    Ok(progress)
}
