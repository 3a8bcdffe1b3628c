//! # Error Types
//!
//! This module provides the error types used throughout the dvbcore library.
//! It defines a central error type `DvbError` that encapsulates all possible
//! failures that can occur while acquiring a transport stream, parsing its
//! PSI/SI tables, or driving the tuner/player/demux boundary.
//!
//! ## Example Usage
//!
//! ```rust
//! use dvbcore::error::{Result, DvbError};
//!
//! fn check_section(buffer: &[u8]) -> Result<()> {
//!     if buffer.is_empty() {
//!         return Err(DvbError::Parse("empty section buffer".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the dvbcore library
#[derive(Error, Debug)]
pub enum DvbError {
    /// I/O errors from loading the configuration file
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed, truncated, or wrong-table-id section data
    #[error("parse error: {0}")]
    Parse(String),

    /// A section declared more records than the bounded table capacity
    #[error("{table} capacity exceeded (limit {limit})")]
    CapacityExceeded {
        /// Name of the table whose capacity was exceeded (`"PAT"`, `"PMT"`, `"EIT"`)
        table: &'static str,
        /// The bounded capacity that was exceeded
        limit: usize,
    },

    /// A condition wait (tuner lock, PAT/PMT/EIT section) exceeded its deadline
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),

    /// A tuner/player/demux driver call returned a nonzero/error status
    #[error("driver error: {0}")]
    Driver(String),

    /// Worker task spawn or join failure
    #[error("thread error: {0}")]
    Thread(String),

    /// An operation was attempted before `StreamController::init` completed
    #[error("stream controller is not initialized")]
    NotInitialized,
}

/// A specialized Result type for dvbcore operations.
pub type Result<T> = std::result::Result<T, DvbError>;
