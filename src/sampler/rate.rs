//! Windowed instantaneous-rate estimation for transfer sampling
//!
//! This module contains the rate math shared by the download and upload samplers:
//! turning a monotonically increasing byte counter into throttled instantaneous
//! throughput samples, and computing the whole-run average a sampler reports.

use log::trace;
use std::time::{Duration, Instant};

/// Minimum time between emitted instantaneous samples
///
/// Observations arriving closer together than this are absorbed into the next
/// window instead of producing a sample, keeping readings stable under bursty
/// chunk arrival.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Divisor converting bits per second into megabits per second (1024 * 1024)
const BITS_PER_MEGABIT: f64 = 1_048_576.0;

/// A single instantaneous throughput reading emitted by [`RateEstimator`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Bytes transferred since the start of the run
    pub bytes_transferred: u64,
    /// Declared total size of the transfer in bytes
    pub total_bytes: u64,
    /// Throughput over the window since the previous sample, in Mbit/s
    pub instantaneous_mbps: f64,
}

/// Accumulator turning `(bytes_transferred, timestamp)` observations into
/// rate samples spaced at least [`MIN_SAMPLE_INTERVAL`] apart
///
/// The estimator owns its `(bytes, instant)` baseline explicitly; one instance
/// belongs to exactly one sampler run, so concurrent runs can never share
/// measurement state. Feeding it is cheap enough to do on every received chunk.
pub struct RateEstimator {
    /// Declared total size of the transfer, carried into every sample
    total_bytes: u64,
    /// Byte counter at the last emitted sample (or at creation)
    last_bytes: u64,
    /// Timestamp of the last emitted sample (or of creation)
    last_instant: Instant,
    /// Minimum window width between samples
    min_interval: Duration,
    /// Number of samples emitted so far, for trace logging
    samples_emitted: u64,
}

impl RateEstimator {
    /// Creates an estimator for a transfer of `total_bytes`, with the baseline
    /// anchored at the current instant
    pub fn new(total_bytes: u64) -> Self {
        Self::with_min_interval(total_bytes, MIN_SAMPLE_INTERVAL)
    }

    /// Creates an estimator with a custom minimum sampling interval
    ///
    /// Production samplers use [`MIN_SAMPLE_INTERVAL`]; a shorter interval is
    /// useful when exercising the estimator against synthetic timelines.
    pub fn with_min_interval(total_bytes: u64, min_interval: Duration) -> Self {
        Self {
            total_bytes,
            last_bytes: 0,
            last_instant: Instant::now(),
            min_interval,
            samples_emitted: 0,
        }
    }

    /// Feeds one observation of the running byte counter
    ///
    /// # Arguments
    ///
    /// * `bytes_transferred` - Total bytes moved since the run started; expected
    ///   to be non-decreasing across calls
    /// * `now` - Timestamp of the observation
    ///
    /// # Returns
    ///
    /// `Some(RateSample)` when at least the minimum interval has elapsed since
    /// the previous sample, `None` otherwise. Emitting a sample resets the
    /// baseline to `(bytes_transferred, now)`, so the next window is measured
    /// from this observation.
    ///
    /// A zero or negative elapsed time never produces a sample, so the rate
    /// division cannot blow up on identical or out-of-order timestamps.
    pub fn observe(&mut self, bytes_transferred: u64, now: Instant) -> Option<RateSample> {
        let elapsed = now.saturating_duration_since(self.last_instant);
        if elapsed < self.min_interval {
            return None;
        }

        let elapsed_secs = elapsed.as_secs_f64();
        if elapsed_secs <= 0.0 {
            return None;
        }

        // Counters are expected to grow; saturate rather than wrap if a caller
        // ever feeds a smaller value, producing a zero-rate sample instead of
        // a nonsense one.
        let delta = bytes_transferred.saturating_sub(self.last_bytes);
        let instantaneous_mbps = (delta as f64 * 8.0) / elapsed_secs / BITS_PER_MEGABIT;

        self.last_bytes = bytes_transferred;
        self.last_instant = now;
        self.samples_emitted += 1;

        trace!(
            "Rate sample #{}: {} bytes over {:.3}s window -> {:.2} Mbit/s ({}/{} bytes total)",
            self.samples_emitted, delta, elapsed_secs, instantaneous_mbps, bytes_transferred,
            self.total_bytes
        );

        Some(RateSample {
            bytes_transferred,
            total_bytes: self.total_bytes,
            instantaneous_mbps,
        })
    }
}

/// Computes the whole-run average throughput in Mbit/s, rounded to two decimals
///
/// This is the single authoritative result of a sampler run: total bytes over
/// total wall-clock time, independent of whatever instantaneous samples were
/// emitted along the way. A zero elapsed time yields 0.0 rather than a
/// division error.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use speedprobe::sampler::average_mbps;
///
/// // 10 MiB in 8 seconds is exactly 10 Mbit/s on the mebibit scale
/// assert_eq!(average_mbps(10_485_760, Duration::from_secs(8)), 10.0);
/// assert_eq!(average_mbps(0, Duration::from_secs(1)), 0.0);
/// ```
pub fn average_mbps(bytes_transferred: u64, elapsed: Duration) -> f64 {
    let elapsed_secs = elapsed.as_secs_f64();
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    round_mbps((bytes_transferred as f64 * 8.0) / elapsed_secs / BITS_PER_MEGABIT)
}

/// Rounds a throughput value to two decimal places, the precision reported to
/// callers and stored in history
pub fn round_mbps(mbps: f64) -> f64 {
    (mbps * 100.0).round() / 100.0
}

/// Formats a throughput value for display
///
/// # Examples
///
/// ```
/// use speedprobe::sampler::format_mbps;
///
/// assert_eq!(format_mbps(12.5), "12.50 Mbit/s");
/// assert_eq!(format_mbps(0.0), "0.00 Mbit/s");
/// ```
pub fn format_mbps(mbps: f64) -> String {
    format!("{mbps:.2} Mbit/s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_below_min_interval_emits_nothing() {
        // Taking the reference instant before the estimator exists guarantees
        // these observations land inside the minimum window.
        let start = Instant::now();
        let mut estimator = RateEstimator::new(1_000_000);

        // 50ms after the baseline is below the 100ms window
        let sample = estimator.observe(64_000, start + Duration::from_millis(50));
        assert!(sample.is_none(), "sample emitted before minimum interval elapsed");

        // 99ms is still below the window
        let sample = estimator.observe(128_000, start + Duration::from_millis(99));
        assert!(sample.is_none(), "sample emitted at 99ms, below the 100ms minimum");
    }

    #[test]
    fn test_observe_emits_after_min_interval() {
        let mut estimator = RateEstimator::new(2_097_152);
        let start = Instant::now();

        // The first window opens at creation time, so only the window between
        // two emitted samples has an exactly known width.
        estimator
            .observe(262_144, start + Duration::from_secs(1))
            .expect("sample should be emitted after a full second");

        let sample = estimator
            .observe(1_310_720, start + Duration::from_secs(2))
            .expect("sample should be emitted after a full second");

        // 1 MiB over exactly 1 second is 8 Mbit/s on the mebibit scale
        assert!((sample.instantaneous_mbps - 8.0).abs() < 1e-9);
        assert_eq!(sample.bytes_transferred, 1_310_720);
        assert_eq!(sample.total_bytes, 2_097_152);
    }

    #[test]
    fn test_observe_resets_baseline_after_sample() {
        let mut estimator = RateEstimator::new(10_000_000);
        let start = Instant::now();

        let first = estimator
            .observe(500_000, start + Duration::from_secs(1))
            .expect("first sample");
        assert!(first.instantaneous_mbps > 0.0);

        // The window restarts at (500_000, t+1s); the next sample sees only
        // the delta, not the running total.
        let second = estimator
            .observe(1_500_000, start + Duration::from_secs(2))
            .expect("second sample");
        let expected = (1_000_000.0 * 8.0) / 1_048_576.0;
        assert!((second.instantaneous_mbps - expected).abs() < 1e-9);
    }

    #[test]
    fn test_no_two_samples_closer_than_min_interval() {
        let mut estimator = RateEstimator::new(100_000_000);
        let start = Instant::now();
        let mut last_emitted_at: Option<Duration> = None;

        // Feed observations every 30ms; emitted samples must still be spaced
        // at least 100ms apart.
        for step in 1..=50u64 {
            let offset = Duration::from_millis(step * 30);
            if let Some(sample) = estimator.observe(step * 50_000, start + offset) {
                assert!(sample.instantaneous_mbps >= 0.0);
                if let Some(previous) = last_emitted_at {
                    let gap = offset - previous;
                    assert!(
                        gap >= MIN_SAMPLE_INTERVAL,
                        "samples emitted {}ms apart, below the minimum interval",
                        gap.as_millis()
                    );
                }
                last_emitted_at = Some(offset);
            }
        }

        assert!(last_emitted_at.is_some(), "no samples emitted at all");
    }

    #[test]
    fn test_samples_are_finite_and_non_negative() {
        let mut estimator = RateEstimator::new(u64::MAX);
        let start = Instant::now();
        let mut bytes = 0u64;

        // Irregular but monotone byte growth with irregular timing
        for step in 1..=200u64 {
            bytes += (step % 7) * 13_337;
            let offset = Duration::from_millis(step * 17);
            if let Some(sample) = estimator.observe(bytes, start + offset) {
                assert!(sample.instantaneous_mbps.is_finite());
                assert!(sample.instantaneous_mbps >= 0.0);
            }
        }
    }

    #[test]
    fn test_zero_elapsed_never_divides() {
        // Even with the interval check disabled, an observation at the exact
        // baseline instant must not produce a sample.
        let mut estimator = RateEstimator::with_min_interval(1_000, Duration::ZERO);
        let baseline = estimator.last_instant;
        assert!(estimator.observe(500, baseline).is_none());
    }

    #[test]
    fn test_decreasing_counter_saturates_to_zero_rate() {
        let mut estimator = RateEstimator::new(1_000_000);
        let start = Instant::now();

        estimator
            .observe(800_000, start + Duration::from_secs(1))
            .expect("first sample");

        // A shrinking counter violates the caller contract; the estimator
        // reports a zero rate rather than wrapping.
        let sample = estimator
            .observe(400_000, start + Duration::from_secs(2))
            .expect("sample after counter went backwards");
        assert_eq!(sample.instantaneous_mbps, 0.0);
    }

    #[test]
    fn test_average_mbps_formula() {
        // 10 MiB in 8 seconds: (10_485_760 * 8) / 8 / 1_048_576 = 10.0
        assert_eq!(average_mbps(10_485_760, Duration::from_secs(8)), 10.0);

        // Rounding to two decimals
        assert_eq!(average_mbps(3_333_333, Duration::from_secs(1)), 25.43);
    }

    #[test]
    fn test_average_mbps_zero_cases() {
        assert_eq!(average_mbps(0, Duration::from_secs(5)), 0.0);
        assert_eq!(average_mbps(1_000_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_round_mbps() {
        assert_eq!(round_mbps(12.344), 12.34);
        assert_eq!(round_mbps(12.346), 12.35);
        assert_eq!(round_mbps(0.0), 0.0);
        assert_eq!(round_mbps(100.0), 100.0);
    }

    #[test]
    fn test_rounded_value_survives_serialization() {
        // The reported value must be stable through serialize/parse: rounding
        // the parsed value changes nothing.
        for mbps in [0.0, 0.07, 5.55, 25.43, 94.12, 9999.99] {
            let rounded = round_mbps(mbps);
            let serialized = serde_json::to_string(&rounded).expect("serialize f64");
            let parsed: f64 = serde_json::from_str(&serialized).expect("parse f64");
            assert_eq!(parsed, rounded, "serialization changed {rounded}");
            assert_eq!(round_mbps(parsed), rounded, "re-rounding changed {rounded}");
        }
    }

    #[test]
    fn test_format_mbps() {
        assert_eq!(format_mbps(25.431), "25.43 Mbit/s");
        assert_eq!(format_mbps(8.0), "8.00 Mbit/s");
    }
}
