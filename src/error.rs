use std::io;

use thiserror::Error;

/// Errors that can end an upload run.
///
/// Everything transient is retried in place by the retry policy and never
/// surfaces here; these variants are the escalations that reach the top-level
/// handler.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Rejected configuration, detected before any I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input stream itself failed mid-read.
    #[error("error reading input stream: {source}")]
    StreamRead { source: io::Error },

    /// Staging storage I/O failure for a specific chunk.
    #[error("chunk {index}: staging file error: {source}")]
    Staging { index: u64, source: io::Error },

    /// The staged file's on-disk size disagrees with the bytes written to it.
    #[error("chunk {index}: staged file size ({on_disk}) does not equal expected size ({written})")]
    StagingSizeMismatch { index: u64, written: u64, on_disk: u64 },

    /// More read increments consumed than --expected-size allows.
    #[error("read count overflow: {reads} reads exceeds the {limit} expected from the declared input size")]
    ReadOverflow { reads: u64, limit: u64 },

    /// A session operation failed on every permitted attempt.
    #[error("{what}: retries exceeded after {attempts} attempts: {reason}")]
    RetriesExceeded { what: String, attempts: u32, reason: String },

    /// The shared abort signal was raised; the session has been aborted.
    #[error("multipart upload aborted due to error(s)")]
    Aborted,
}
