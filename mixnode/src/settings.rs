use std::path::PathBuf;
use std::time::Duration;

use anyhow::ensure;
use mix_strategy::MixSettings;
use serde::Deserialize;

const DEFAULT_SESSIONS: usize = 8;
const DEFAULT_PAYLOAD_SIZE: usize = 32;

/// Synthetic client traffic fed into the mix.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficSettings {
    /// How long the producers run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(with = "humantime_serde")]
    pub request_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub reply_interval: Duration,
    #[serde(default = "default_sessions")]
    pub sessions: usize,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

impl TrafficSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.request_interval.is_zero() && !self.reply_interval.is_zero(),
            "traffic intervals must not be zero"
        );
        ensure!(self.sessions > 0, "traffic needs at least one session");
        Ok(())
    }
}

fn default_sessions() -> usize {
    DEFAULT_SESSIONS
}

fn default_payload_size() -> usize {
    DEFAULT_PAYLOAD_SIZE
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    mix: serde_json::Value,
    traffic: TrafficSettings,
    output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub mix: MixSettings,
    pub traffic: TrafficSettings,
    /// CSV file receiving one row per released message.
    pub output: PathBuf,
}

impl NodeSettings {
    pub fn from_json_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let RawSettings {
            mix,
            traffic,
            output,
        } = serde_json::from_value(value)?;
        let mix = MixSettings::from_json_value(mix)?;
        traffic.validate()?;
        Ok(Self {
            mix,
            traffic,
            output,
        })
    }
}
