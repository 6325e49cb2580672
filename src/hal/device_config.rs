use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// ADC front-end settings applied on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// e.g. `single_ended` or `differential`
    pub mode: String,
    /// PGA gain name, e.g. `ONE`, `TWO`, `TWOTHIRDS`
    pub gain: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            mode: "single_ended".to_string(),
            gain: "ONE".to_string(),
        }
    }
}

/// POST the settings to `http://{host}/config`. Not retried; the caller reports the outcome.
pub async fn push_device_settings(host: &str, settings: &DeviceSettings) -> Result<()> {
    let url = format!("http://{}/config", host.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(PUSH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    client
        .post(&url)
        .json(settings)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()
        .with_context(|| format!("Device rejected configuration at {}", url))?;

    info!("applied {:?} to {}", settings, url);
    Ok(())
}
