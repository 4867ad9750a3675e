//! Core error types used across the system

use thiserror::Error;

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}
