//! Error types for lyrebird-player
//!
//! Module-specific error types using thiserror for clear error propagation.
//!
//! The taxonomy mirrors the recovery policy: `Transport` always escalates
//! to a full stop, `Decode` drops the offending segment and continues,
//! `Export` is reported without touching playback state.

use thiserror::Error;

/// Main error type for the player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Wire chunk decoding errors (bad base64, odd byte count,
    /// channel divisibility)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Session transport errors (connection dropped, command channel closed)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Recording export errors
    #[error("Export error: {0}")]
    Export(String),

    /// Preset storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Shared library errors
    #[error(transparent)]
    Common(#[from] lyrebird_common::Error),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
