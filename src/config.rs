use serde::{Deserialize, Serialize};
use tracing::trace;

/// Smallest poll interval the settings surface may accept.
pub const MIN_POLL_INTERVAL_MS: u64 = 1000;

/// Acceptable value ranges for the three sensors.
///
/// Every paired bound must satisfy `min < max`; this is checked by
/// [`AcquisitionConfig::validate`] at the settings boundary, not by the
/// alert engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
    pub soil_moisture_min: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature_min: 15.0,
            temperature_max: 35.0,
            humidity_min: 30.0,
            humidity_max: 80.0,
            soil_moisture_min: 20.0,
        }
    }
}

/// Process-wide acquisition parameters.
///
/// Mutation is replace-whole-value through [`ConfigPatch`]; the poller
/// reschedules its loop when the interval or URL changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// Upper bound on a single fetch so the loop can never stall indefinitely.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub thresholds: AlertThresholds,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            endpoint_url: default_endpoint_url(),
            request_timeout_ms: default_request_timeout_ms(),
            thresholds: AlertThresholds::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    MIN_POLL_INTERVAL_MS
}

fn default_endpoint_url() -> String {
    String::from("http://192.168.1.7")
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl AcquisitionConfig {
    /// Check the invariants the core trusts its callers to uphold.
    ///
    /// The poller and alert engine never re-validate; every settings surface
    /// (config file, future API) must run this before handing a config or
    /// patch result to the core.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            anyhow::bail!(
                "poll interval must be at least {MIN_POLL_INTERVAL_MS}ms, got {}ms",
                self.poll_interval_ms
            );
        }

        if self.endpoint_url.is_empty() {
            anyhow::bail!("endpoint URL must not be empty");
        }

        if self.request_timeout_ms == 0 {
            anyhow::bail!("request timeout must be greater than zero");
        }

        let AlertThresholds {
            temperature_min,
            temperature_max,
            humidity_min,
            humidity_max,
            ..
        } = self.thresholds;

        if temperature_min >= temperature_max {
            anyhow::bail!(
                "temperature thresholds invalid: min {temperature_min} >= max {temperature_max}"
            );
        }

        if humidity_min >= humidity_max {
            anyhow::bail!("humidity thresholds invalid: min {humidity_min} >= max {humidity_max}");
        }

        Ok(())
    }
}

/// Partial configuration update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub poll_interval_ms: Option<u64>,
    pub endpoint_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub thresholds: Option<AlertThresholds>,
}

impl ConfigPatch {
    pub fn apply(self, config: &mut AcquisitionConfig) {
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }
        if let Some(endpoint_url) = self.endpoint_url {
            config.endpoint_url = endpoint_url;
        }
        if let Some(request_timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = request_timeout_ms;
        }
        if let Some(thresholds) = self.thresholds {
            config.thresholds = thresholds;
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<AcquisitionConfig> {
    let file_content = std::fs::read_to_string(path)?;
    let config: AcquisitionConfig = serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
