//! Application state management
//!
//! Provides centralized state for in-flight batch operations. Every batch
//! registers its own cancellation token here, keyed by batch id, so
//! concurrent batches stay independently cancellable.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Type alias for per-batch cancellation tokens
pub type BatchTokens = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Centralized application state shared by the orchestration layer
#[derive(Default)]
pub struct AppState {
    /// Cancellation tokens for in-flight batches, keyed by batch id
    pub batch_tokens: BatchTokens,
}

impl AppState {
    /// Create a fresh state with no in-flight batches
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
