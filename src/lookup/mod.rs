//! Network metadata lookup
//!
//! One GET against a geolocation endpoint, mapped into a fixed-shape
//! [`NetworkInfo`] snapshot: public IP, provider and coarse location. This is
//! display garnish for a measurement run, so it is deliberately a single
//! request with a short timeout and no retries.

use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Settings;
use crate::sampler::SpeedTestError;

/// Public connection metadata as reported by the geolocation endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip: String,
    pub isp: String,
    pub city: String,
    pub region: String,
    pub country: String,
}

/// Raw response shape of the geolocation endpoint
///
/// Field names follow the remote API. A field the endpoint omits becomes an
/// empty string instead of failing the whole lookup; only an unparseable body
/// is an error.
#[derive(Debug, Deserialize)]
struct GeoEndpointResponse {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    org: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country_name: String,
}

impl From<GeoEndpointResponse> for NetworkInfo {
    fn from(raw: GeoEndpointResponse) -> Self {
        Self {
            ip: raw.ip,
            isp: raw.org,
            city: raw.city,
            region: raw.region,
            country: raw.country_name,
        }
    }
}

/// Fetches public network metadata with a single JSON request
pub struct NetworkInfoLookup {
    client: Client,
    endpoint: String,
}

impl NetworkInfoLookup {
    /// Builds a lookup from settings with its own short-timeout client
    ///
    /// Unlike the transfer clients this one bounds the whole request; a stuck
    /// metadata call should fail, not hang a test run.
    pub fn from_settings(settings: &Settings) -> Result<Self, SpeedTestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.lookup_timeout_secs))
            .build()
            .map_err(|err| SpeedTestError::LookupFailed {
                reason: err.to_string(),
            })?;
        Ok(Self::new(client, settings.lookup_url.clone()))
    }

    /// Creates a lookup over an existing client and endpoint
    pub fn new(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    /// Performs the lookup
    ///
    /// Fails with [`SpeedTestError::LookupFailed`] when the request errors,
    /// the endpoint answers with a non-success status, or the body does not
    /// parse as JSON.
    pub async fn run(&self) -> Result<NetworkInfo, SpeedTestError> {
        debug!("Requesting network metadata from {}", self.endpoint);
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|err| SpeedTestError::LookupFailed {
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeedTestError::LookupFailed {
                reason: format!("status {status}"),
            });
        }

        let raw: GeoEndpointResponse =
            response
                .json()
                .await
                .map_err(|err| SpeedTestError::LookupFailed {
                    reason: format!("invalid response body: {err}"),
                })?;

        let info = NetworkInfo::from(raw);
        info!("Network metadata resolved: ip={}, isp={}", info.ip, info.isp);
        Ok(info)
    }
}
