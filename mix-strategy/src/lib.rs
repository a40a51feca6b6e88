//! Output-strategy engine of a mix relay.
//!
//! Inbound requests and replies are buffered in one pool per direction. A
//! pluggable [`strategy::OutputStrategy`] decides when, and which, pooled
//! messages are handed to the downstream [`Sink`].

pub mod engine;
pub mod error;
pub mod message;
pub mod pool;
pub mod rng;
pub mod scheduler;
pub mod settings;
pub mod simplex;
pub mod sink;
pub mod strategy;

pub use engine::MixEngine;
pub use error::ConfigError;
pub use message::{Direction, Message, SequenceGenerator, SessionId};
pub use pool::PoolStats;
pub use rng::RngKind;
pub use settings::{MixSettings, StrategySettings, StrategyType};
pub use simplex::{Clock, SimplexMix};
pub use sink::{ChannelSink, Release, Sink};
