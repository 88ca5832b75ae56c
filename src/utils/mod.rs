//! Small shared utilities

pub mod file_ops;
