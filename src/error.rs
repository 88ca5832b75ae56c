//! Error types for the `PixelBoost` conversion pipeline
//!
//! This module provides a unified error type using thiserror for better error
//! handling and context preservation throughout the application.

use thiserror::Error;

/// Application error type that wraps all possible errors
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Input file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was looked up
        path: String,
    },

    /// Batch cancelled by the user
    #[error("Cancelled by user")]
    Cancelled,

    /// Invalid data or state
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Convert `AppError` to String for the public pipeline boundary
///
/// Public pipeline entry points return Result<T, String>, so we need to
/// convert `AppError` to String
impl From<AppError> for String {
    fn from(err: AppError) -> Self {
        err.to_string()
    }
}
