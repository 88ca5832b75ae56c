//! Pipeline modules

pub mod backup;
pub mod batch_log;
pub mod codec;
pub mod converter;
pub mod file_utils;
pub mod orchestrator;
