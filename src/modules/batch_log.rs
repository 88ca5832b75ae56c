//! Log stage: per-batch conversion history
//!
//! Every finished batch appends one row per settled item to a daily CSV file
//! (`YYYY-MM-DD_batch-log.csv`) under the log root, and mirrors the entry
//! into `log_index.json`. The index is the queryable source for history and
//! exports; the CSV files are for humans.

use crate::modules::converter::{
    BatchProgress, ConversionOptions, ImageFormat, ItemStatus,
};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "log_index.json";
const INDEX_VERSION: &str = "1.0";
const CSV_HEADER: &str = "id,timestamp,filename,inputPath,outputPath,originalSize,convertedSize,compressionRatio,format,quality,status,error,processingTimeMs";

/// One logged conversion outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Sequential id across the whole log
    pub id: u64,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Input file name
    pub filename: String,
    /// Full input path
    pub input_path: String,
    /// Full output path
    pub output_path: String,
    /// Input size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    /// Output size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_size: Option<u64>,
    /// Size reduction percentage, negative when the output grew
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    /// Target format of the batch
    pub format: ImageFormat,
    /// Quality setting of the batch
    pub quality: u8,
    /// Final item status (completed or failed)
    pub status: ItemStatus,
    /// Failure description for failed items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock processing time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
}

/// Persistent mirror of all log entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogIndex {
    /// Index schema version
    pub version: String,
    /// Last write time
    pub last_updated: DateTime<Utc>,
    /// Number of entries
    pub total_entries: u64,
    /// All entries in append order
    pub entries: Vec<LogEntry>,
}

impl LogIndex {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION.to_owned(),
            last_updated: Utc::now(),
            total_entries: 0,
            entries: Vec::new(),
        }
    }
}

/// Aggregate statistics over an exported range
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    /// Entries exported
    pub total: usize,
    /// Completed entries
    pub succeeded: usize,
    /// Failed entries
    pub failed: usize,
    /// Mean compression ratio over entries that have one
    pub average_compression: f64,
    /// Total bytes saved (input minus output, successful entries)
    pub bytes_saved: i64,
}

/// Conversion history rooted at one directory
pub struct LogManager {
    log_dir: PathBuf,
    index_path: PathBuf,
}

impl LogManager {
    /// Create a manager rooted at the given directory
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        let index_path = log_dir.join(INDEX_FILE);
        Self {
            log_dir,
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
        Ok(Self::new(home.join("PixelBoost").join("logs")))
    }

    /// Root directory of this manager
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Append one row per settled item of a finished batch
    ///
    /// Pending or processing items are skipped; a closed batch has none.
    /// Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// Returns error if the log directory, daily file or index cannot be
    /// written
    pub fn append_batch_log(
        &self,
        progress: &BatchProgress,
        options: &ConversionOptions,
    ) -> Result<usize, String> {
        std::fs::create_dir_all(&self.log_dir).map_err(|e| e.to_string())?;

        let mut index = self.load_index()?;
        let mut rows = Vec::new();
        let now = Utc::now();

        for item in &progress.items {
            if !matches!(item.status, ItemStatus::Completed | ItemStatus::Failed) {
                continue;
            }

            index.total_entries += 1;
            let entry = LogEntry {
                id: index.total_entries,
                timestamp: now,
                filename: Path::new(&item.input_path)
                    .file_name()
                    .map_or_else(String::new, |n| n.to_string_lossy().to_string()),
                input_path: item.input_path.clone(),
                output_path: item.output_path.clone(),
                original_size: item.original_size,
                converted_size: item.converted_size,
                compression_ratio: compression_ratio(item.original_size, item.converted_size),
                format: options.format,
                quality: options.quality,
                status: item.status,
                error: item.error.clone(),
                processing_time_ms: match (item.start_time, item.end_time) {
                    (Some(start), Some(end)) => Some(end - start),
                    _ => None,
                },
            };
            rows.push(csv_row(&entry));
            index.entries.push(entry);
        }

        if rows.is_empty() {
            return Ok(0);
        }

        self.append_daily_rows(&rows)?;
        self.save_index(&index)?;

        log::info!("logged {} entr(ies) to {}", rows.len(), self.log_dir.display());
        Ok(rows.len())
    }

    /// Entries within the given range, newest first
    ///
    /// # Errors
    ///
    /// Returns error if the index cannot be read
    pub fn get_log_history(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>, String> {
        let index = self.load_index()?;
        let mut entries: Vec<LogEntry> = index
            .entries
            .into_iter()
            .filter(|e| start.is_none_or(|s| e.timestamp >= s))
            .filter(|e| end.is_none_or(|t| e.timestamp <= t))
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Export the given range as one CSV file with a statistics footer
    ///
    /// # Errors
    ///
    /// Returns error if the index cannot be read or the target cannot be
    /// written
    pub fn export_csv(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        target: &Path,
    ) -> Result<ExportStats, String> {
        let mut entries = self.get_log_history(start, end)?;
        // Export in chronological order
        entries.reverse();

        let stats = compute_stats(&entries);

        let mut out = String::new();
        out.push_str(CSV_HEADER);
        out.push('\n');
        for entry in &entries {
            out.push_str(&csv_row(entry));
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&format!("total,{}\n", stats.total));
        out.push_str(&format!("succeeded,{}\n", stats.succeeded));
        out.push_str(&format!("failed,{}\n", stats.failed));
        out.push_str(&format!(
            "averageCompression,{:.2}%\n",
            stats.average_compression
        ));
        out.push_str(&format!("bytesSaved,{}\n", stats.bytes_saved));

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(target, out).map_err(|e| e.to_string())?;

        Ok(stats)
    }

    fn append_daily_rows(&self, rows: &[String]) -> Result<(), String> {
        let path = self.daily_log_path(&Local::now());
        let needs_header = !path.exists();

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| e.to_string())?;

        if needs_header {
            writeln!(file, "{CSV_HEADER}").map_err(|e| e.to_string())?;
        }
        for row in rows {
            writeln!(file, "{row}").map_err(|e| e.to_string())?;
        }
        file.sync_all().map_err(|e| e.to_string())?;
        Ok(())
    }

    fn daily_log_path(&self, when: &DateTime<Local>) -> PathBuf {
        self.log_dir
            .join(format!("{}_batch-log.csv", when.format("%Y-%m-%d")))
    }

    fn load_index(&self) -> Result<LogIndex, String> {
        if !self.index_path.exists() {
            return Ok(LogIndex::empty());
        }

        let data = std::fs::read_to_string(&self.index_path).map_err(|e| e.to_string())?;
        match serde_json::from_str(&data) {
            Ok(index) => Ok(index),
            Err(e) => {
                log::warn!("log index unreadable, starting fresh: {e}");
                Ok(LogIndex::empty())
            }
        }
    }

    fn save_index(&self, index: &LogIndex) -> Result<(), String> {
        let mut index = index.clone();
        index.last_updated = Utc::now();

        let json_data = serde_json::to_string_pretty(&index).map_err(|e| e.to_string())?;
        let mut file = std::fs::File::create(&self.index_path).map_err(|e| e.to_string())?;
        file.write_all(json_data.as_bytes())
            .map_err(|e| e.to_string())?;
        file.sync_all().map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Size reduction percentage: positive when the output is smaller
fn compression_ratio(original: Option<u64>, converted: Option<u64>) -> Option<f64> {
    match (original, converted) {
        (Some(orig), Some(conv)) if orig > 0 => {
            Some((orig as f64 - conv as f64) / orig as f64 * 100.0)
        }
        _ => None,
    }
}

fn compute_stats(entries: &[LogEntry]) -> ExportStats {
    let succeeded = entries
        .iter()
        .filter(|e| e.status == ItemStatus::Completed)
        .count();
    let ratios: Vec<f64> = entries.iter().filter_map(|e| e.compression_ratio).collect();
    let average_compression = if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };
    let bytes_saved = entries
        .iter()
        .filter(|e| e.status == ItemStatus::Completed)
        .filter_map(|e| Some(e.original_size? as i64 - e.converted_size? as i64))
        .sum();

    ExportStats {
        total: entries.len(),
        succeeded,
        failed: entries.len() - succeeded,
        average_compression,
        bytes_saved,
    }
}

fn csv_row(entry: &LogEntry) -> String {
    let status = match entry.status {
        ItemStatus::Completed => "completed",
        _ => "failed",
    };
    [
        entry.id.to_string(),
        entry.timestamp.to_rfc3339(),
        csv_escape(&entry.filename),
        csv_escape(&entry.input_path),
        csv_escape(&entry.output_path),
        entry
            .original_size
            .map_or_else(String::new, |s| s.to_string()),
        entry
            .converted_size
            .map_or_else(String::new, |s| s.to_string()),
        entry
            .compression_ratio
            .map_or_else(String::new, |r| format!("{r:.2}")),
        entry.format.extension().to_owned(),
        entry.quality.to_string(),
        status.to_owned(),
        entry
            .error
            .as_deref()
            .map_or_else(String::new, csv_escape),
        entry
            .processing_time_ms
            .map_or_else(String::new, |ms| ms.to_string()),
    ]
    .join(",")
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
