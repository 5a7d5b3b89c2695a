//! Upload throughput sampling
//!
//! Synthesizes a fixed-size payload and streams it to a remote sink in
//! bounded chunks, measuring how fast the transport drains it. Chunk
//! production is lazy: bytes are only spent as the connection accepts them,
//! with a cooperative yield between hand-offs so the caller's progress
//! handling is never starved.
//!
//! Upload measurement degrades gracefully. Whatever goes wrong mid-stream is
//! logged and reported as a zero result; a broken upload sink must not take
//! the download half of a test run down with it.

use bytes::Bytes;
use futures_util::{Stream, stream};
use log::{debug, info, warn};
use reqwest::{Body, Client, StatusCode, header};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::sampler::ProgressFn;
use crate::sampler::errors::SpeedTestError;
use crate::sampler::rate::{RateEstimator, average_mbps};

/// Default total payload size for one upload run: 10 MiB
pub const DEFAULT_UPLOAD_TOTAL_BYTES: u64 = 10 * 1024 * 1024;

/// Default chunk size for payload hand-offs: 64 KiB
pub const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Finite, non-restartable schedule of payload chunks for one upload run
///
/// Yields zero-filled buffers of the configured chunk size; when the total is
/// not an exact multiple, the final chunk shrinks to the remainder. Every
/// chunk is a view into one shared allocation, so producing one is a refcount
/// bump rather than a copy.
pub struct ChunkPlan {
    template: Bytes,
    total_bytes: u64,
    produced_bytes: u64,
}

impl ChunkPlan {
    /// Creates a plan covering `total_bytes` in chunks of `chunk_bytes`
    ///
    /// A zero chunk size is clamped to one byte so the plan always makes
    /// forward progress.
    pub fn new(total_bytes: u64, chunk_bytes: usize) -> Self {
        Self {
            template: Bytes::from(vec![0u8; chunk_bytes.max(1)]),
            total_bytes,
            produced_bytes: 0,
        }
    }

    /// Number of hand-offs this plan performs in total
    pub fn chunk_count(&self) -> u64 {
        self.total_bytes.div_ceil(self.template.len() as u64)
    }

    /// Bytes handed out so far
    pub fn produced_bytes(&self) -> u64 {
        self.produced_bytes
    }
}

impl Iterator for ChunkPlan {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.produced_bytes >= self.total_bytes {
            return None;
        }
        let remaining = self.total_bytes - self.produced_bytes;
        let len = remaining.min(self.template.len() as u64) as usize;
        self.produced_bytes += len as u64;
        Some(self.template.slice(..len))
    }
}

/// Measurement state owned by the producing stream for one run
///
/// Single-writer by construction: only the stream touches the estimator and
/// the callback, and the run observes the byte count through the shared
/// atomic after the transport finishes.
struct UploadProgress {
    estimator: RateEstimator,
    uploaded: Arc<AtomicU64>,
    on_progress: Option<ProgressFn>,
}

/// Wraps a chunk plan into a streamed request body that accounts each
/// hand-off against the estimator and yields between emissions
fn chunk_body_stream(
    plan: ChunkPlan,
    estimator: RateEstimator,
    uploaded: Arc<AtomicU64>,
    on_progress: Option<ProgressFn>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let progress = UploadProgress {
        estimator,
        uploaded,
        on_progress,
    };

    stream::unfold((plan, progress), |(mut plan, mut progress)| async move {
        let chunk = plan.next()?;

        // Accounting happens at hand-off to the transport. This measures
        // enqueue speed, not confirmed delivery; the final average is still
        // honest because it is computed after the whole request resolves.
        let sent = progress
            .uploaded
            .fetch_add(chunk.len() as u64, Ordering::AcqRel)
            + chunk.len() as u64;
        if let Some(sample) = progress.estimator.observe(sent, Instant::now()) {
            if let Some(callback) = progress.on_progress.as_mut() {
                callback(
                    sample.bytes_transferred,
                    sample.total_bytes,
                    sample.instantaneous_mbps,
                );
            }
        }

        // Give the transport and the caller a scheduling opportunity between
        // chunk emissions instead of flooding the connection in one poll.
        tokio::task::yield_now().await;

        Some((Ok::<Bytes, Infallible>(chunk), (plan, progress)))
    })
}

/// Measures upload throughput by streaming a synthetic payload
///
/// Each run owns its accumulator state, so a sampler can be reused across
/// sequential runs and two runs never influence each other.
pub struct UploadSampler {
    client: Client,
    endpoint: String,
    total_bytes: u64,
    chunk_bytes: usize,
}

impl UploadSampler {
    /// Builds a sampler from settings, constructing its own HTTP client
    ///
    /// Like the download client, this carries only a connect timeout so the
    /// transfer itself stays unbounded.
    pub fn from_settings(settings: &Settings) -> Result<Self, SpeedTestError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()?;
        Ok(Self::new(
            client,
            settings.upload_url.clone(),
            settings.upload_total_bytes,
            settings.upload_chunk_bytes,
        ))
    }

    /// Creates a sampler posting `total_bytes` in `chunk_bytes` chunks
    pub fn new(client: Client, endpoint: String, total_bytes: u64, chunk_bytes: usize) -> Self {
        Self {
            client,
            endpoint,
            total_bytes,
            chunk_bytes,
        }
    }

    /// Payload size posted per run
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Runs one upload measurement
    ///
    /// # Arguments
    ///
    /// * `on_progress` - Optional callback invoked with
    ///   `(bytes_transferred, total_bytes, instantaneous_mbps)` at most once
    ///   per minimum sampling interval
    ///
    /// # Returns
    ///
    /// The whole-run average in Mbit/s, rounded to two decimals. This never
    /// fails: any transport error is logged and reported as `0.0`.
    pub async fn run(&self, on_progress: Option<ProgressFn>) -> f64 {
        let run_started = Instant::now();
        let uploaded = Arc::new(AtomicU64::new(0));
        info!(
            "Starting upload measurement: {} bytes in {} chunk(s) to {}",
            self.total_bytes,
            ChunkPlan::new(self.total_bytes, self.chunk_bytes).chunk_count(),
            self.endpoint
        );

        match self.send_payload(Arc::clone(&uploaded), on_progress).await {
            Ok(status) => {
                let sent = uploaded.load(Ordering::Acquire);
                let elapsed = run_started.elapsed();
                // The sink's status and body are irrelevant to the
                // measurement; the bytes already crossed the wire.
                debug!("Upload sink responded with status {status}");
                let average = average_mbps(sent, elapsed);
                info!(
                    "Upload measurement complete: {sent} bytes in {:.3}s -> {average:.2} Mbit/s",
                    elapsed.as_secs_f64()
                );
                average
            }
            Err(err) => {
                let sent = uploaded.load(Ordering::Acquire);
                warn!("Upload measurement failed after {sent} bytes, reporting zero: {err}");
                0.0
            }
        }
    }

    /// Posts the streamed payload and returns the sink's response status
    async fn send_payload(
        &self,
        uploaded: Arc<AtomicU64>,
        on_progress: Option<ProgressFn>,
    ) -> Result<StatusCode, SpeedTestError> {
        let plan = ChunkPlan::new(self.total_bytes, self.chunk_bytes);
        let estimator = RateEstimator::new(self.total_bytes);
        let body = chunk_body_stream(plan, estimator, uploaded, on_progress);

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(body))
            .send()
            .await?;
        Ok(response.status())
    }
}
