//! Error types for speed measurement
//!
//! One taxonomy covers both samplers and the metadata lookup. Recovery policy
//! lives with the callers: the download sampler treats per-candidate errors as
//! recoverable and only surfaces `AllSourcesFailed`, while the upload sampler
//! swallows everything into a zero result.

use thiserror::Error;

/// Errors produced by the transfer samplers and the metadata lookup
#[derive(Debug, Error)]
pub enum SpeedTestError {
    /// A download candidate responded, but cannot be measured against: the
    /// status was not successful, or no positive Content-Length was declared
    /// so progress would have no denominator
    #[error("download source unusable ({url}): {reason}")]
    TransferUnavailable { url: String, reason: String },

    /// Every configured download candidate was attempted and failed
    #[error("all {attempted} download source(s) failed")]
    AllSourcesFailed { attempted: usize },

    /// Connection-level or mid-stream failure from the HTTP client
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The network metadata endpoint could not be reached, returned an error
    /// status, or produced a body that does not parse as JSON
    #[error("network metadata lookup failed: {reason}")]
    LookupFailed { reason: String },
}
