//! Batch image optimization engine
//!
//! Converts lists of image files to a target format sequentially, with
//! originals backed up before the batch runs, progress reported after every
//! item state transition, per-batch cancellation, and a persistent
//! conversion history. The [`modules::orchestrator`] module ties the stages
//! together; [`progress::ProgressReporter`] is the seam a UI shell or CLI
//! plugs into.

pub mod error;
pub mod modules;
pub mod progress;
pub mod state;
pub mod utils;

pub use error::AppError;
pub use modules::backup::BackupManager;
pub use modules::batch_log::LogManager;
pub use modules::converter::{BatchProgress, ConversionOptions, ImageFormat};
pub use modules::orchestrator::{
    cancel_batch_process, start_batch_process, ProcessSummary, SubscriptionTier,
};
pub use progress::{BatchEvent, ChannelReporter, LogReporter, NullReporter, ProgressReporter};
pub use state::AppState;
