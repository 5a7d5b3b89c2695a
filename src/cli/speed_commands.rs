use anyhow::Result;
use chrono::Local;
use log::{debug, info, warn};
use std::io::{self, Write};

use crate::config::Settings;
use crate::dashboard::SpeedRating;
use crate::lookup::NetworkInfoLookup;
use crate::sampler::{DownloadSampler, ProgressFn, UploadSampler, format_mbps};
use crate::storage::{HistoryRecord, HistoryStore};

/// Handles the non-dashboard speed test commands
///
/// Each command builds its samplers from the loaded settings, prints a live
/// progress line while a transfer runs, and a short summary afterwards.
pub struct SpeedCommandHandler {
    settings: Settings,
}

impl SpeedCommandHandler {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Runs the full test: download phase, upload phase, then one history row
    pub async fn handle_run_command(&self, no_history: bool) -> Result<()> {
        let download_mbps = self.measure_download().await?;
        let upload_mbps = self.measure_upload().await;

        println!();
        println!("📊 Results");
        println!("{}", "═".repeat(44));
        print_rated(
            "Download",
            download_mbps,
            SpeedRating::for_download(download_mbps),
        );
        print_rated("Upload", upload_mbps, SpeedRating::for_upload(upload_mbps));

        if no_history {
            debug!("Skipping history write (--no-history)");
            return Ok(());
        }

        let store = HistoryStore::open(&self.settings.history_path)?;
        store.append(&HistoryRecord {
            recorded_at: Local::now(),
            download_mbps,
            upload_mbps,
        })?;
        println!();
        println!("📝 Recorded in {}", self.settings.history_path.display());

        Ok(())
    }

    pub async fn handle_download_command(&self) -> Result<()> {
        let mbps = self.measure_download().await?;
        println!();
        print_rated("Download", mbps, SpeedRating::for_download(mbps));
        Ok(())
    }

    pub async fn handle_upload_command(&self) -> Result<()> {
        let mbps = self.measure_upload().await;
        println!();
        print_rated("Upload", mbps, SpeedRating::for_upload(mbps));
        Ok(())
    }

    pub async fn handle_info_command(&self) -> Result<()> {
        println!("🌐 Looking up network metadata...");
        let lookup = NetworkInfoLookup::from_settings(&self.settings)?;
        let info = lookup.run().await?;

        println!();
        println!("Network Info");
        println!("{}", "═".repeat(44));
        println!("  IP:      {}", info.ip);
        println!("  ISP:     {}", info.isp);
        println!("  City:    {}", info.city);
        println!("  Region:  {}", info.region);
        println!("  Country: {}", info.country);

        Ok(())
    }

    pub async fn handle_history_command(&self, limit: Option<usize>) -> Result<()> {
        let store = HistoryStore::open(&self.settings.history_path)?;
        let mut records = store.recent()?;
        if let Some(limit) = limit {
            keep_newest(&mut records, limit);
        }

        if records.is_empty() {
            println!("No completed runs recorded yet. Try 'sp run' first.");
            return Ok(());
        }

        println!("📊 Recent Runs");
        println!("{}", "═".repeat(60));
        for record in &records {
            println!(
                "  {}  ↓ {:<14} ↑ {}",
                record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                format_mbps(record.download_mbps),
                format_mbps(record.upload_mbps),
            );
        }

        Ok(())
    }

    async fn measure_download(&self) -> Result<f64> {
        info!("Starting download measurement");
        println!("📥 Measuring download speed...");

        let sampler = DownloadSampler::from_settings(&self.settings)?;
        let mbps = sampler.run(Some(progress_line())).await?;
        clear_progress_line();
        Ok(mbps)
    }

    /// Upload measurement never fails the command; a broken upload leg is
    /// reported as zero
    async fn measure_upload(&self) -> f64 {
        info!("Starting upload measurement");

        let sampler = match UploadSampler::from_settings(&self.settings) {
            Ok(sampler) => sampler,
            Err(err) => {
                warn!("Upload sampler unavailable, reporting zero: {err}");
                return 0.0;
            }
        };
        println!(
            "📤 Measuring upload speed ({} payload)...",
            payload_size(sampler.total_bytes())
        );
        let mbps = sampler.run(Some(progress_line())).await;
        clear_progress_line();
        mbps
    }
}

/// Progress callback that repaints a single terminal line in place
fn progress_line() -> ProgressFn {
    Box::new(|loaded, total, mbps| {
        print!(
            "\r  {} at {}",
            transfer_position(loaded, total),
            format_mbps(mbps)
        );
        let _ = io::stdout().flush();
    })
}

/// Clears the repainted progress line so the summary starts clean
fn clear_progress_line() {
    print!("\r\x1B[2K");
    let _ = io::stdout().flush();
}

/// Formats the position part of the progress line
/// Falls back to a byte count when the transfer size is unknown
fn transfer_position(loaded: u64, total: u64) -> String {
    if total > 0 {
        format!("{:>3.0}%", loaded as f64 / total as f64 * 100.0)
    } else {
        format!("{} KiB", loaded / 1024)
    }
}

/// Formats a payload size for display in whole KiB or MiB
fn payload_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.0} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{} KiB", bytes / 1024)
    }
}

/// Prints one result line with its quality rating
fn print_rated(label: &str, mbps: f64, rating: SpeedRating) {
    println!(
        "  {:<10} {:<14} [{}]",
        format!("{label}:"),
        format_mbps(mbps),
        rating.label()
    );
}

/// Trims an oldest-first record list down to its newest entries
fn keep_newest(records: &mut Vec<HistoryRecord>, limit: usize) {
    let skip = records.len().saturating_sub(limit);
    records.drain(..skip);
}
