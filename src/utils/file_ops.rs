//! File operations using `spawn_blocking` for sync I/O
//!
//! Use these for simple one-shot operations (copy, remove, metadata).
//! Operations that need cancellation or per-chunk progress use `tokio::fs`
//! directly instead.

use std::path::Path;

/// Copy file using `spawn_blocking` (more efficient for simple copies)
///
/// # Errors
///
/// Returns error if the copy fails or the blocking task is aborted
pub async fn copy_file(source: &Path, dest: &Path) -> Result<u64, String> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || std::fs::copy(&source, &dest))
        .await
        .map_err(|e| format!("Task join error: {e}"))?
        .map_err(|e| format!("Copy failed: {e}"))
}

/// Remove file using `spawn_blocking`
///
/// # Errors
///
/// Returns error if the removal fails or the blocking task is aborted
pub async fn remove_file(path: &Path) -> Result<(), String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || std::fs::remove_file(&path))
        .await
        .map_err(|e| format!("Task join error: {e}"))?
        .map_err(|e| format!("Remove failed: {e}"))
}

/// Get file metadata using `spawn_blocking`
///
/// # Errors
///
/// Returns error if the stat fails or the blocking task is aborted
pub async fn metadata(path: &Path) -> Result<std::fs::Metadata, String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || std::fs::metadata(&path))
        .await
        .map_err(|e| format!("Task join error: {e}"))?
        .map_err(|e| format!("Metadata failed: {e}"))
}

/// Create directory (and parents) using `spawn_blocking`
///
/// # Errors
///
/// Returns error if creation fails or the blocking task is aborted
pub async fn create_dir_all(path: &Path) -> Result<(), String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || std::fs::create_dir_all(&path))
        .await
        .map_err(|e| format!("Task join error: {e}"))?
        .map_err(|e| format!("Create dir failed: {e}"))
}
