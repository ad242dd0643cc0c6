//! Error types for CASC storage operations.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Entry not found for {0}")]
    EntryNotFound(String),

    #[error("Archive {0} not found")]
    ArchiveNotFound(u16),

    /// Structural impossibility: bad magic, unknown version, or fields that
    /// cannot describe a valid file.
    #[error("Bad format: {0}")]
    BadFormat(String),

    /// Well-formed data whose verification hash does not match.
    #[error("File corrupt: {0}")]
    FileCorrupt(String),

    /// Recognized format with parameters outside the supported range.
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid storage handle")]
    InvalidHandle,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Decompression error: {0}")]
    Decompression(String),
}

pub type Result<T> = std::result::Result<T, CascError>;
