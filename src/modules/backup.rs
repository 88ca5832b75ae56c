//! Backup stage: copies of originals taken before a conversion batch runs
//!
//! Backups land in dated folders (`YYYY-MM-DD/`) under the backup root, each
//! copy named `{stem}_{YYYYMMDD_HHMMSS}{ext}` and verified against the
//! source with a SHA-256 checksum. Every backup gets a JSON metadata sidecar
//! and an entry in the global `metadata_index.json`.

use crate::modules::file_utils::{calculate_file_hash, format_file_size, verify_checksum};
use crate::utils::file_ops;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

const MAX_RETRY_ATTEMPTS: usize = 3;
const INDEX_FILE: &str = "metadata_index.json";
const INDEX_VERSION: &str = "1.0";

/// Lifecycle state of one backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// Backup exists and has not been restored
    Active,
    /// Backup has been restored at least once
    Restored,
}

/// Metadata for one backed-up file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Unique backup id
    pub backup_id: String,
    /// Path the file was backed up from
    pub original_path: String,
    /// Path of the backup copy
    pub backup_path: String,
    /// Original file name
    pub filename: String,
    /// Size in bytes
    pub file_size: u64,
    /// Human-readable size
    pub file_size_readable: String,
    /// When the backup was taken
    pub backup_date: DateTime<Utc>,
    /// SHA-256 of the backup copy, prefixed `sha256:`
    pub hash: String,
    /// Current state
    pub status: BackupStatus,
    /// When the backup was last restored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

/// One file that could not be backed up or restored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    /// Input path (or backup id for restores)
    pub file_path: String,
    /// Failure description
    pub error: String,
}

/// Per-file outcomes of one backup or restore batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBatchResult {
    /// Files handled successfully
    pub success_count: usize,
    /// Files that failed
    pub failed_count: usize,
    /// Metadata of successful backups (empty for restores)
    pub success_backups: Vec<BackupInfo>,
    /// Failures with their reasons
    pub failed_files: Vec<FailedFile>,
}

/// Progress of an in-flight backup or restore batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    /// Total files in the batch
    pub total: usize,
    /// Files handled successfully so far
    pub completed: usize,
    /// Files failed so far
    pub failed: usize,
    /// Files currently being copied (0 or 1)
    pub processing: usize,
    /// Overall percentage 0-100
    pub overall_progress: u8,
    /// File currently being handled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

/// Persistent index of all backups under one root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupIndex {
    /// Index schema version
    pub version: String,
    /// Last write time
    pub last_updated: DateTime<Utc>,
    /// Number of backups
    pub total_backups: usize,
    /// Sum of backup sizes in bytes
    pub total_size: u64,
    /// All backup records
    pub backups: Vec<BackupInfo>,
}

impl BackupIndex {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION.to_owned(),
            last_updated: Utc::now(),
            total_backups: 0,
            total_size: 0,
            backups: Vec::new(),
        }
    }

    fn refresh_totals(&mut self) {
        self.total_backups = self.backups.len();
        self.total_size = self.backups.iter().map(|b| b.file_size).sum();
        self.last_updated = Utc::now();
    }
}

/// Sort key for backup listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// By backup date
    Date,
    /// By file size
    Size,
    /// By original file name
    Filename,
}

/// Sort direction for backup listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

/// Filters for [`BackupManager::list_backups`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFilters {
    /// Keep backups taken at or after this instant
    pub start_date: Option<DateTime<Utc>>,
    /// Keep backups taken at or before this instant
    pub end_date: Option<DateTime<Utc>>,
    /// Substring match on the original file name, case-insensitive
    pub filename: Option<String>,
    /// Keep backups in this state only
    pub status: Option<BackupStatus>,
    /// Sort key
    pub sort_by: Option<SortBy>,
    /// Sort direction, descending when unset
    pub sort_order: Option<SortOrder>,
}

/// Progress sink for backup/restore batches
pub type BackupProgressSink<'a> = &'a (dyn Fn(&BackupProgress) + Send + Sync);

/// Backup storage rooted at one directory
pub struct BackupManager {
    backup_dir: PathBuf,
    index_path: PathBuf,
}

impl BackupManager {
    /// Create a manager rooted at the given directory
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        let backup_dir = backup_dir.into();
        let index_path = backup_dir.join(INDEX_FILE);
        Self {
            backup_dir,
            index_path,
        }
    }

    /// Create a manager under the default per-user location
    ///
    /// # Errors
    ///
    /// Returns error if no home directory can be resolved
    pub fn default_location() -> Result<Self, String> {
        let home = crate::modules::file_utils::get_home_dir()?;
        Ok(Self::new(home.join("PixelBoost").join("backup")))
    }

    /// Root directory of this manager
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up a single file into the dated folder for today
    ///
    /// # Errors
    ///
    /// Returns error if the source is missing, the copy cannot be verified
    /// after retries, or the index cannot be updated
    pub async fn backup_file(&self, file_path: &Path) -> Result<BackupInfo, String> {
        if tokio::fs::metadata(file_path).await.is_err() {
            return Err(format!("File not found: {}", file_path.display()));
        }

        let meta = file_ops::metadata(file_path).await?;
        let filename = file_path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().to_string());

        let now = Local::now();
        let date_dir = self.backup_dir.join(now.format("%Y-%m-%d").to_string());
        file_ops::create_dir_all(&date_dir).await?;

        let backup_name = backup_file_name(&filename, &now);
        let backup_path = date_dir.join(&backup_name);

        copy_with_retry(file_path, &backup_path).await?;

        let hash = calculate_file_hash(&backup_path).await?;
        let backup_id = format!(
            "backup_{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().to_string()[..8]
        );

        let info = BackupInfo {
            backup_id,
            original_path: file_path.to_string_lossy().to_string(),
            backup_path: backup_path.to_string_lossy().to_string(),
            filename,
            file_size: meta.len(),
            file_size_readable: format_file_size(meta.len()),
            backup_date: Utc::now(),
            hash: format!("sha256:{hash}"),
            status: BackupStatus::Active,
            restored_at: None,
        };

        self.write_sidecar(&backup_path, &info)?;
        self.update_index(&info)?;

        Ok(info)
    }

    /// Back up a list of files sequentially
    ///
    /// Per-file failures are recorded in the result and do not fail the
    /// batch; `Err` means the stage itself is unusable (e.g. the backup root
    /// cannot be created).
    ///
    /// # Errors
    ///
    /// Returns error if the backup root cannot be prepared
    pub async fn backup_batch(
        &self,
        files: &[String],
        on_progress: BackupProgressSink<'_>,
    ) -> Result<BackupBatchResult, String> {
        // Fail the stage up front when the root is unusable; per-file errors
        // below stay soft
        file_ops::create_dir_all(&self.backup_dir).await?;

        let mut result = BackupBatchResult::default();
        let total = files.len();

        for file_path in files {
            on_progress(&BackupProgress {
                total,
                completed: result.success_count,
                failed: result.failed_count,
                processing: 1,
                overall_progress: batch_percent(result.success_count, total),
                current_file: Path::new(file_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string()),
            });

            match self.backup_file(Path::new(file_path)).await {
                Ok(info) => {
                    result.success_count += 1;
                    result.success_backups.push(info);
                }
                Err(error) => {
                    log::warn!("backup failed for {file_path}: {error}");
                    result.failed_count += 1;
                    result.failed_files.push(FailedFile {
                        file_path: file_path.clone(),
                        error,
                    });
                }
            }
        }

        on_progress(&BackupProgress {
            total,
            completed: result.success_count,
            failed: result.failed_count,
            processing: 0,
            overall_progress: 100,
            current_file: None,
        });

        Ok(result)
    }

    /// Restore one backup, to its original path unless a target is given
    ///
    /// # Errors
    ///
    /// Returns error if the backup is unknown, its copy is missing, or the
    /// restore copy fails
    pub async fn restore_file(
        &self,
        backup_id: &str,
        target_path: Option<&Path>,
    ) -> Result<PathBuf, String> {
        let mut info = self
            .find_backup_by_id(backup_id)?
            .ok_or_else(|| format!("Backup not found: {backup_id}"))?;

        let backup_path = PathBuf::from(&info.backup_path);
        if tokio::fs::metadata(&backup_path).await.is_err() {
            return Err(format!(
                "Backup file is damaged or deleted: {}",
                info.backup_path
            ));
        }

        let restore_path =
            target_path.map_or_else(|| PathBuf::from(&info.original_path), Path::to_path_buf);

        if restore_path.exists() {
            log::warn!("overwriting existing file: {}", restore_path.display());
        }

        if let Some(parent) = restore_path.parent() {
            file_ops::create_dir_all(parent).await?;
        }

        file_ops::copy_file(&backup_path, &restore_path).await?;

        info.status = BackupStatus::Restored;
        info.restored_at = Some(Utc::now());
        self.write_sidecar(&backup_path, &info)?;
        self.update_index(&info)?;

        Ok(restore_path)
    }

    /// Restore a list of backups sequentially
    ///
    /// # Errors
    ///
    /// Returns error only for stage-level faults; per-backup failures are
    /// recorded in the result
    pub async fn restore_batch(
        &self,
        backup_ids: &[String],
        on_progress: BackupProgressSink<'_>,
    ) -> Result<BackupBatchResult, String> {
        let mut result = BackupBatchResult::default();
        let total = backup_ids.len();

        for backup_id in backup_ids {
            on_progress(&BackupProgress {
                total,
                completed: result.success_count,
                failed: result.failed_count,
                processing: 1,
                overall_progress: batch_percent(result.success_count, total),
                current_file: Some(backup_id.clone()),
            });

            match self.restore_file(backup_id, None).await {
                Ok(_) => result.success_count += 1,
                Err(error) => {
                    result.failed_count += 1;
                    result.failed_files.push(FailedFile {
                        file_path: backup_id.clone(),
                        error,
                    });
                }
            }
        }

        on_progress(&BackupProgress {
            total,
            completed: result.success_count,
            failed: result.failed_count,
            processing: 0,
            overall_progress: 100,
            current_file: None,
        });

        Ok(result)
    }

    /// List backups, optionally filtered and sorted
    ///
    /// # Errors
    ///
    /// Returns error if the index cannot be read
    pub fn list_backups(&self, filters: Option<&BackupFilters>) -> Result<Vec<BackupInfo>, String> {
        let index = self.load_index()?;
        let mut backups = index.backups;

        if let Some(filters) = filters {
            if let Some(start) = filters.start_date {
                backups.retain(|b| b.backup_date >= start);
            }
            if let Some(end) = filters.end_date {
                backups.retain(|b| b.backup_date <= end);
            }
            if let Some(name) = &filters.filename {
                let needle = name.to_lowercase();
                backups.retain(|b| b.filename.to_lowercase().contains(&needle));
            }
            if let Some(status) = filters.status {
                backups.retain(|b| b.status == status);
            }
            if let Some(sort_by) = filters.sort_by {
                sort_backups(
                    &mut backups,
                    sort_by,
                    filters.sort_order.unwrap_or(SortOrder::Desc),
                );
            }
        }

        Ok(backups)
    }

    /// Delete one backup: its copy, its sidecar, and its index entry
    ///
    /// # Errors
    ///
    /// Returns error if the backup is unknown or the index cannot be updated
    pub async fn delete_backup(&self, backup_id: &str) -> Result<(), String> {
        let info = self
            .find_backup_by_id(backup_id)?
            .ok_or_else(|| format!("Backup not found: {backup_id}"))?;

        let backup_path = PathBuf::from(&info.backup_path);
        if backup_path.exists() {
            file_ops::remove_file(&backup_path).await?;
        }

        let sidecar = sidecar_path(&backup_path);
        if sidecar.exists() {
            file_ops::remove_file(&sidecar).await?;
        }

        self.remove_from_index(backup_id)?;
        self.clean_empty_directories();

        Ok(())
    }

    // Index helpers

    fn load_index(&self) -> Result<BackupIndex, String> {
        if !self.index_path.exists() {
            return Ok(BackupIndex::empty());
        }

        let data = std::fs::read_to_string(&self.index_path).map_err(|e| e.to_string())?;
        match serde_json::from_str(&data) {
            Ok(index) => Ok(index),
            Err(e) => {
                log::warn!("backup index unreadable, starting fresh: {e}");
                Ok(BackupIndex::empty())
            }
        }
    }

    fn save_index(&self, index: &BackupIndex) -> Result<(), String> {
        std::fs::create_dir_all(&self.backup_dir).map_err(|e| e.to_string())?;
        let json_data = serde_json::to_string_pretty(index).map_err(|e| e.to_string())?;

        // Write and sync to ensure the index is persisted immediately
        let mut file = std::fs::File::create(&self.index_path).map_err(|e| e.to_string())?;
        file.write_all(json_data.as_bytes())
            .map_err(|e| e.to_string())?;
        file.sync_all().map_err(|e| e.to_string())?;
        Ok(())
    }

    fn update_index(&self, info: &BackupInfo) -> Result<(), String> {
        let mut index = self.load_index()?;

        if let Some(existing) = index
            .backups
            .iter_mut()
            .find(|b| b.backup_id == info.backup_id)
        {
            *existing = info.clone();
        } else {
            index.backups.push(info.clone());
        }

        index.refresh_totals();
        self.save_index(&index)
    }

    fn remove_from_index(&self, backup_id: &str) -> Result<(), String> {
        let mut index = self.load_index()?;
        index.backups.retain(|b| b.backup_id != backup_id);
        index.refresh_totals();
        self.save_index(&index)
    }

    fn find_backup_by_id(&self, backup_id: &str) -> Result<Option<BackupInfo>, String> {
        let index = self.load_index()?;
        Ok(index
            .backups
            .into_iter()
            .find(|b| b.backup_id == backup_id))
    }

    fn write_sidecar(&self, backup_path: &Path, info: &BackupInfo) -> Result<(), String> {
        let json_data = serde_json::to_string_pretty(info).map_err(|e| e.to_string())?;
        std::fs::write(sidecar_path(backup_path), json_data).map_err(|e| e.to_string())
    }

    fn clean_empty_directories(&self) {
        let Ok(entries) = std::fs::read_dir(&self.backup_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                // remove_dir only succeeds on empty directories
                let _ = std::fs::remove_dir(&path);
            }
        }
    }
}

/// Backup copy with retry and checksum verification
async fn copy_with_retry(src: &Path, dest: &Path) -> Result<u64, String> {
    let retry_strategy = ExponentialBackoff::from_millis(10)
        .map(jitter)
        .take(MAX_RETRY_ATTEMPTS);

    Retry::spawn(retry_strategy, || async {
        let size = file_ops::copy_file(src, dest).await?;

        match verify_checksum(src, dest).await {
            Ok(true) => Ok(size),
            Ok(false) => {
                // Checksum mismatch - drop the copy and retry
                let _ = tokio::fs::remove_file(dest).await;
                Err("Checksum verification failed".to_owned())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(format!("Checksum calculation failed: {e}"))
            }
        }
    })
    .await
}

/// `{stem}_{YYYYMMDD_HHMMSS}{ext}`
fn backup_file_name(filename: &str, when: &DateTime<Local>) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().to_string());
    let ext = path
        .extension()
        .map_or_else(String::new, |e| format!(".{}", e.to_string_lossy()));
    format!("{stem}_{}{ext}", when.format("%Y%m%d_%H%M%S"))
}

fn sidecar_path(backup_path: &Path) -> PathBuf {
    let mut name = backup_path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().to_string());
    name.push_str(".json");
    backup_path.with_file_name(name)
}

fn batch_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        0
    } else {
        (100.0 * completed as f64 / total as f64).round() as u8
    }
}

fn sort_backups(backups: &mut [BackupInfo], sort_by: SortBy, order: SortOrder) {
    backups.sort_by(|a, b| {
        let cmp = match sort_by {
            SortBy::Date => a.backup_date.cmp(&b.backup_date),
            SortBy::Size => a.file_size.cmp(&b.file_size),
            SortBy::Filename => a.filename.cmp(&b.filename),
        };
        match order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    });
}
