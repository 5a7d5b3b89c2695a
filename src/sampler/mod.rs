//! Transfer sampling module
//!
//! The measurement core of speedprobe: active download/upload throughput
//! sampling over HTTP plus the shared rate math.
//!
//! ## Module Organization
//!
//! - `rate`: windowed instantaneous-rate estimation and the whole-run average
//! - `download`: streamed GET sampling with candidate fallback
//! - `upload`: lazy chunked POST sampling with graceful degradation
//! - `errors`: the error taxonomy shared with the metadata lookup
//!
//! Samplers report interim readings through a [`ProgressFn`] callback and
//! return a single averaged number; sequencing, display and persistence stay
//! with the caller.

pub mod download;
pub mod errors;
pub mod rate;
pub mod upload;

pub use download::DownloadSampler;
pub use errors::SpeedTestError;
pub use rate::{
    MIN_SAMPLE_INTERVAL, RateEstimator, RateSample, average_mbps, format_mbps, round_mbps,
};
pub use upload::{
    ChunkPlan, DEFAULT_UPLOAD_CHUNK_BYTES, DEFAULT_UPLOAD_TOTAL_BYTES, UploadSampler,
};

/// Progress callback invoked by samplers as a transfer advances
///
/// Receives `(bytes_transferred, total_bytes, instantaneous_mbps)`. Called
/// zero or more times per run, at most once per [`MIN_SAMPLE_INTERVAL`], and
/// never after the run's final average has been returned.
pub type ProgressFn = Box<dyn FnMut(u64, u64, f64) + Send>;
