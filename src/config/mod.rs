//! Layered runtime settings
//!
//! Settings are resolved in three layers, later ones winning: built-in
//! defaults, an optional TOML file (an explicit `--config` path or a
//! `speedprobe.toml` next to the working directory), and environment
//! variables prefixed `SPEEDPROBE_`. An explicitly named file must exist;
//! the implicit one is allowed to be absent.

use ::config::{Config, Environment, File};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sampler::{DEFAULT_UPLOAD_CHUNK_BYTES, DEFAULT_UPLOAD_TOTAL_BYTES};

/// Base name searched for when no explicit config path is given
const DEFAULT_CONFIG_BASENAME: &str = "speedprobe";

/// Runtime configuration for samplers, lookup and history storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Download candidates, attempted in order until one is measurable
    pub download_urls: Vec<String>,
    /// Sink accepting the streamed upload payload
    pub upload_url: String,
    /// Geolocation endpoint for the network metadata lookup
    pub lookup_url: String,
    /// Total synthetic payload posted per upload run, in bytes
    pub upload_total_bytes: u64,
    /// Chunk size for upload hand-offs, in bytes
    pub upload_chunk_bytes: usize,
    /// Connect timeout for the transfer clients; the transfers themselves
    /// are not time-bounded
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for the metadata lookup
    pub lookup_timeout_secs: u64,
    /// SQLite file holding the bounded run history
    pub history_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_urls: vec![
                "https://storage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4"
                    .to_string(),
            ],
            upload_url: "https://httpbin.org/post".to_string(),
            lookup_url: "https://ipapi.co/json/".to_string(),
            upload_total_bytes: DEFAULT_UPLOAD_TOTAL_BYTES,
            upload_chunk_bytes: DEFAULT_UPLOAD_CHUNK_BYTES,
            connect_timeout_secs: 10,
            lookup_timeout_secs: 15,
            history_path: PathBuf::from("speedprobe_history.db"),
        }
    }
}

impl Settings {
    /// Loads settings from defaults, file and environment layers
    ///
    /// # Arguments
    ///
    /// * `config_path` - Explicit settings file; when `None`, a
    ///   `speedprobe.*` file in the working directory is picked up if present
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&Settings::default()).context("Failed to encode default settings")?,
        );

        builder = match config_path {
            Some(path) => {
                debug!("Loading settings file: {}", path.display());
                builder.add_source(File::from(path))
            }
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false)),
        };

        let settings: Settings = builder
            .add_source(Environment::with_prefix("SPEEDPROBE"))
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects configurations no measurement could run against
    fn validate(&self) -> Result<()> {
        if self.download_urls.is_empty() {
            anyhow::bail!("Invalid configuration: download_urls must list at least one source");
        }
        if self.upload_url.is_empty() {
            anyhow::bail!("Invalid configuration: upload_url must not be empty");
        }
        if self.upload_total_bytes == 0 {
            anyhow::bail!("Invalid configuration: upload_total_bytes must be positive");
        }
        if self.upload_chunk_bytes == 0 {
            anyhow::bail!("Invalid configuration: upload_chunk_bytes must be positive");
        }
        Ok(())
    }
}
