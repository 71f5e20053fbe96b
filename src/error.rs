//! Error types for the streaming surface.
//!
//! Only recoverable conditions are expressed as errors. Contract violations
//! (reset or sum after close, a misaligned padded tail) are programmer
//! errors and panic instead of returning.

use thiserror::Error;

/// Errors surfaced by [`crate::Md5Hasher`] write operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// The stream was closed; it accepts no further input.
    #[error("md5 stream is closed")]
    Closed,

    /// The scheduling server shut down while the stream was still active.
    #[error("md5 scheduling server disconnected")]
    Disconnected,
}
