//! Internet speed measurement with live instantaneous rates
//!
//! Modules:
//! - `sampler`: download and upload throughput sampling with rate estimation
//! - `lookup`: public network metadata (IP, provider, location)
//! - `storage`: bounded SQLite history of completed runs
//! - `config`: layered settings (defaults, TOML file, environment)
//! - `dashboard`: interactive ratatui dashboard
//! - `cli`: clap command definitions and handlers

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod lookup;
pub mod sampler;
pub mod storage;
