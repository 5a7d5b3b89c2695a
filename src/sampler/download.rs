//! Download throughput sampling
//!
//! Streams a remote resource of known size and reports how fast the bytes
//! arrived. Candidate URLs are tried in order so a dead mirror never aborts
//! the whole measurement; only when every candidate fails does the run fail.

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::{Client, header};
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::sampler::ProgressFn;
use crate::sampler::errors::SpeedTestError;
use crate::sampler::rate::{RateEstimator, average_mbps};

/// Measures download throughput by streaming candidate resources
///
/// Each run is independent: all measurement state lives in locals owned by the
/// run, so a sampler can be reused or shared freely between sequential runs.
pub struct DownloadSampler {
    client: Client,
    sources: Vec<String>,
}

impl DownloadSampler {
    /// Builds a sampler from settings, constructing its own HTTP client
    ///
    /// The client carries only a connect timeout: a dead endpoint fails fast,
    /// but a slow transfer is allowed to take as long as it takes.
    pub fn from_settings(settings: &Settings) -> Result<Self, SpeedTestError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()?;
        Ok(Self::new(client, settings.download_urls.clone()))
    }

    /// Creates a sampler over an existing client and ordered candidate list
    pub fn new(client: Client, sources: Vec<String>) -> Self {
        Self { client, sources }
    }

    /// Candidate URLs in the order they will be attempted
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Runs one download measurement
    ///
    /// # Arguments
    ///
    /// * `on_progress` - Optional callback invoked with
    ///   `(bytes_transferred, total_bytes, instantaneous_mbps)` at most once
    ///   per minimum sampling interval
    ///
    /// # Returns
    ///
    /// The whole-run average in Mbit/s, rounded to two decimals. The elapsed
    /// clock starts before the first candidate is contacted, so time burned on
    /// failed candidates counts against the result. Fails only with
    /// [`SpeedTestError::AllSourcesFailed`] once every candidate has been
    /// attempted.
    pub async fn run(&self, mut on_progress: Option<ProgressFn>) -> Result<f64, SpeedTestError> {
        let run_started = Instant::now();
        info!(
            "Starting download measurement across {} candidate source(s)",
            self.sources.len()
        );

        for url in &self.sources {
            match self
                .sample_candidate(url, run_started, on_progress.as_mut())
                .await
            {
                Ok(average) => {
                    info!("Download measurement complete: {average:.2} Mbit/s via {url}");
                    return Ok(average);
                }
                Err(err) => {
                    warn!("Download candidate {url} failed: {err}");
                }
            }
        }

        Err(SpeedTestError::AllSourcesFailed {
            attempted: self.sources.len(),
        })
    }

    /// Streams one candidate to completion and computes its average
    ///
    /// Every error returned here is recoverable from the run's point of view;
    /// the caller moves on to the next candidate.
    async fn sample_candidate(
        &self,
        url: &str,
        run_started: Instant,
        mut on_progress: Option<&mut ProgressFn>,
    ) -> Result<f64, SpeedTestError> {
        debug!("Requesting download candidate: {url}");
        let response = self
            .client
            .get(url)
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeedTestError::TransferUnavailable {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }

        // Progress reporting needs a known denominator, so a response that
        // does not declare a positive length is rejected before any body
        // bytes are read.
        let total_bytes = match response.content_length() {
            Some(length) if length > 0 => length,
            _ => {
                return Err(SpeedTestError::TransferUnavailable {
                    url: url.to_string(),
                    reason: "missing or zero Content-Length header".to_string(),
                });
            }
        };
        debug!("Candidate {url} accepted: {total_bytes} bytes declared");

        let mut estimator = RateEstimator::new(total_bytes);
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            received += chunk.len() as u64;
            if let Some(sample) = estimator.observe(received, Instant::now()) {
                if let Some(callback) = on_progress.as_deref_mut() {
                    callback(
                        sample.bytes_transferred,
                        sample.total_bytes,
                        sample.instantaneous_mbps,
                    );
                }
            }
        }

        let elapsed = run_started.elapsed();
        debug!(
            "Candidate {url} streamed {received} bytes in {:.3}s",
            elapsed.as_secs_f64()
        );
        Ok(average_mbps(received, elapsed))
    }
}
