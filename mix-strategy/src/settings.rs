use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::ConfigError;
use crate::rng::RngKind;

pub const DEFAULT_POOL_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StrategyType {
    BasicBatch,
    TimedBatch,
    ThresholdOrTimedBatch,
    ThresholdAndTimedBatch,
    ThresholdPool,
    CottrellPool,
    CottrellTimedPool,
    BinomialPlusPool,
    SquareRootPool,
    MixminionPool,
    TimedDynamicPool,
    CottrellRandomDelay,
    ProportionalMethod,
}

impl StrategyType {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        Self::from_str(name.trim()).map_err(|_| ConfigError::UnknownStrategy(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSettings {
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimedBatchSettings {
    #[serde(with = "humantime_serde")]
    pub sending_rate: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdTimedBatchSettings {
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub sending_rate: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdPoolSettings {
    pub min_pool_size: usize,
    /// Pool size that triggers a release of `threshold - min_pool_size` messages.
    pub threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotPoolSettings {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CottrellTimedSettings {
    pub min_pool_size: usize,
    #[serde(with = "humantime_serde")]
    pub send_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinomialPlusSettings {
    pub min_pool_size: usize,
    /// Decay constant of the release bias.
    pub k: f64,
    #[serde(with = "humantime_serde")]
    pub send_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SquareRootSettings {
    #[serde(with = "humantime_serde")]
    pub send_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MixminionSettings {
    pub min_pool_size: usize,
    pub min_send: usize,
    /// Fraction of the pool sent per tick.
    pub send_rate: f64,
    #[serde(with = "humantime_serde")]
    pub send_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimedDynamicSettings {
    pub min_messages: usize,
    pub fraction: f64,
    #[serde(with = "humantime_serde")]
    pub send_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomDelaySettings {
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

/// Output strategy and its parameters, tagged by strategy name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategySettings {
    BasicBatch(BatchSettings),
    TimedBatch(TimedBatchSettings),
    ThresholdOrTimedBatch(ThresholdTimedBatchSettings),
    ThresholdAndTimedBatch(ThresholdTimedBatchSettings),
    ThresholdPool(ThresholdPoolSettings),
    CottrellPool(SlotPoolSettings),
    CottrellTimedPool(CottrellTimedSettings),
    BinomialPlusPool(BinomialPlusSettings),
    SquareRootPool(SquareRootSettings),
    MixminionPool(MixminionSettings),
    TimedDynamicPool(TimedDynamicSettings),
    CottrellRandomDelay(RandomDelaySettings),
    ProportionalMethod(SlotPoolSettings),
}

impl StrategySettings {
    pub fn strategy_type(&self) -> StrategyType {
        match self {
            Self::BasicBatch(_) => StrategyType::BasicBatch,
            Self::TimedBatch(_) => StrategyType::TimedBatch,
            Self::ThresholdOrTimedBatch(_) => StrategyType::ThresholdOrTimedBatch,
            Self::ThresholdAndTimedBatch(_) => StrategyType::ThresholdAndTimedBatch,
            Self::ThresholdPool(_) => StrategyType::ThresholdPool,
            Self::CottrellPool(_) => StrategyType::CottrellPool,
            Self::CottrellTimedPool(_) => StrategyType::CottrellTimedPool,
            Self::BinomialPlusPool(_) => StrategyType::BinomialPlusPool,
            Self::SquareRootPool(_) => StrategyType::SquareRootPool,
            Self::MixminionPool(_) => StrategyType::MixminionPool,
            Self::TimedDynamicPool(_) => StrategyType::TimedDynamicPool,
            Self::CottrellRandomDelay(_) => StrategyType::CottrellRandomDelay,
            Self::ProportionalMethod(_) => StrategyType::ProportionalMethod,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::BasicBatch(s) => positive("batch_size", s.batch_size),
            Self::TimedBatch(s) => nonzero_interval("sending_rate", s.sending_rate),
            Self::ThresholdOrTimedBatch(s) | Self::ThresholdAndTimedBatch(s) => {
                positive("batch_size", s.batch_size)?;
                nonzero_interval("sending_rate", s.sending_rate)
            }
            Self::ThresholdPool(s) => {
                if s.threshold <= s.min_pool_size {
                    return Err(ConfigError::invalid(
                        "threshold",
                        format!(
                            "must exceed min_pool_size ({} <= {})",
                            s.threshold, s.min_pool_size
                        ),
                    ));
                }
                Ok(())
            }
            Self::CottrellPool(s) | Self::ProportionalMethod(s) => {
                positive("pool_size", s.pool_size)
            }
            Self::CottrellTimedPool(s) => nonzero_interval("send_interval", s.send_interval),
            Self::BinomialPlusPool(s) => {
                if !s.k.is_finite() || s.k < 0.0 {
                    return Err(ConfigError::invalid(
                        "k",
                        format!("must be a finite non-negative number, got {}", s.k),
                    ));
                }
                nonzero_interval("send_interval", s.send_interval)
            }
            Self::SquareRootPool(s) => nonzero_interval("send_interval", s.send_interval),
            Self::MixminionPool(s) => {
                if s.min_pool_size.checked_add(s.min_send).is_none() {
                    return Err(ConfigError::invalid(
                        "min_send",
                        "min_pool_size + min_send overflows",
                    ));
                }
                unit_fraction("send_rate", s.send_rate)?;
                nonzero_interval("send_interval", s.send_interval)
            }
            Self::TimedDynamicPool(s) => {
                unit_fraction("fraction", s.fraction)?;
                nonzero_interval("send_interval", s.send_interval)
            }
            Self::CottrellRandomDelay(_) => Ok(()),
        }
    }
}

/// Settings of one mix node; both directions run the same strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MixSettings {
    pub strategy: StrategySettings,
    #[serde(default)]
    pub rng: RngKind,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Initial buffer sizing. Not a cap.
    #[serde(default = "default_pool_size")]
    pub capacity_hint: usize,
}

impl MixSettings {
    pub fn new(strategy: StrategySettings) -> Self {
        Self {
            strategy,
            rng: RngKind::default(),
            seed: None,
            capacity_hint: DEFAULT_POOL_SIZE,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_rng(mut self, rng: RngKind) -> Self {
        self.rng = rng;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()
    }

    /// Parses and validates settings from JSON.
    ///
    /// The strategy name is checked before the rest of the document so that
    /// an unknown name is reported as such rather than as a serde error.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        if let Some(name) = value
            .get("strategy")
            .and_then(|strategy| strategy.get("type"))
            .and_then(|name| name.as_str())
        {
            StrategyType::parse(name)?;
        }
        let settings: Self = serde_json::from_value(value)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::from_json_value(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let f = std::fs::File::open(path)?;
        Self::from_json_value(serde_json::from_reader(f)?)
    }
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn positive(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(name, "must be greater than zero"));
    }
    Ok(())
}

fn nonzero_interval(name: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::invalid(name, "interval must not be zero"));
    }
    Ok(())
}

fn unit_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            name,
            format!("must be within [0, 1], got {value}"),
        ));
    }
    Ok(())
}
