//! Shared file helpers: hashing, sizes, timestamps, format checks

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 4 * 1024 * 1024; // 4MB chunks

/// Extensions the codec accepts as conversion input
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "avif", "svg", "heif", "heic",
];

/// Calculate SHA-256 hash of a file
///
/// # Errors
///
/// Returns error if the file cannot be opened or read
pub async fn calculate_file_hash(path: &Path) -> Result<String, String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| e.to_string())?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await.map_err(|e| e.to_string())?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify file integrity using SHA-256 checksum
///
/// # Errors
///
/// Returns error if either file cannot be hashed
pub async fn verify_checksum(src: &Path, dest: &Path) -> Result<bool, String> {
    let src_hash = calculate_file_hash(src).await?;
    let dest_hash = calculate_file_hash(dest).await?;
    Ok(src_hash == dest_hash)
}

/// Check whether a path carries a supported input extension
#[must_use]
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_INPUT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Format a byte count as a human-readable string (e.g. "5.00 MB")
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let exponent = ((bytes as f64).ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(units.len() - 1);
    let size = bytes as f64 / 1024_f64.powi(exponent as i32);
    format!("{size:.2} {}", units[exponent])
}

/// Current wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Get home directory (cross-platform)
///
/// # Errors
///
/// Returns error if no home directory can be resolved
pub fn get_home_dir() -> Result<PathBuf, String> {
    #[cfg(unix)]
    {
        std::env::var_os("HOME")
            .and_then(|h| if h.is_empty() { None } else { Some(h) })
            .map(PathBuf::from)
            .ok_or_else(|| "Failed to get home directory".to_owned())
    }

    #[cfg(windows)]
    {
        std::env::var_os("USERPROFILE")
            .or_else(|| {
                // Fallback: combine HOMEDRIVE and HOMEPATH
                std::env::var_os("HOMEDRIVE").and_then(|drive| {
                    std::env::var_os("HOMEPATH").map(|path| {
                        let mut full_path = PathBuf::from(drive);
                        full_path.push(path);
                        full_path.into_os_string()
                    })
                })
            })
            .and_then(|h| if h.is_empty() { None } else { Some(h) })
            .map(PathBuf::from)
            .ok_or_else(|| "Failed to get home directory".to_owned())
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err("Unsupported platform for home directory detection".to_owned())
    }
}
