use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::ConfigError;
use crate::message::{Direction, Message};
use crate::pool::PoolStats;
use crate::rng::MixRng;
use crate::settings::MixSettings;
use crate::simplex::{Clock, SimplexMix};
use crate::sink::Sink;
use crate::strategy::new_strategy;

/// A mix node's output side: one independent pool per direction, both
/// running the configured strategy and releasing into the same sink.
pub struct MixEngine {
    settings: MixSettings,
    requests: SimplexMix,
    replies: SimplexMix,
}

impl MixEngine {
    pub fn new(settings: MixSettings, sink: Arc<dyn Sink>) -> Result<Self, ConfigError> {
        Self::with_clock(settings, sink, Clock::Wall)
    }

    pub fn with_clock(
        settings: MixSettings,
        sink: Arc<dyn Sink>,
        clock: Clock,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let strategy_type = settings.strategy.strategy_type();

        // Per-direction seeds come from one generator so a single seed
        // reproduces the whole node.
        let (request_seed, reply_seed) = match settings.seed {
            Some(seed) => {
                let mut seeds = StdRng::seed_from_u64(seed);
                (Some(seeds.next_u64()), Some(seeds.next_u64()))
            }
            None => (None, None),
        };
        let pool = |direction, seed| {
            SimplexMix::new(
                direction,
                strategy_type,
                new_strategy(&settings.strategy, settings.capacity_hint),
                MixRng::new(settings.rng, seed),
                clock,
                sink.clone(),
            )
        };
        let requests = pool(Direction::Request, request_seed);
        let replies = pool(Direction::Reply, reply_seed);

        tracing::info!(
            strategy = %strategy_type,
            rng = ?settings.rng,
            seed = ?settings.seed,
            ?clock,
            "mix engine started"
        );
        Ok(Self {
            settings,
            requests,
            replies,
        })
    }

    pub fn settings(&self) -> &MixSettings {
        &self.settings
    }

    pub fn add_request(&self, msg: Message) {
        self.add_expecting(Direction::Request, msg);
    }

    pub fn add_reply(&self, msg: Message) {
        self.add_expecting(Direction::Reply, msg);
    }

    fn add_expecting(&self, expected: Direction, msg: Message) {
        if msg.direction != expected {
            tracing::warn!(
                %expected,
                actual = %msg.direction,
                sequence = msg.sequence,
                "message rerouted to the pool of its direction"
            );
        }
        self.add(msg);
    }

    /// Routes `msg` to the pool of its own direction.
    pub fn add(&self, msg: Message) {
        self.pool(msg.direction).enqueue(msg);
    }

    pub fn pool(&self, direction: Direction) -> &SimplexMix {
        match direction {
            Direction::Request => &self.requests,
            Direction::Reply => &self.replies,
        }
    }

    pub fn stats(&self, direction: Direction) -> PoolStats {
        self.pool(direction).stats()
    }

    /// Runs one tick on both pools, outside the regular schedule.
    pub fn tick(&self) {
        self.requests.tick();
        self.replies.tick();
    }

    /// Advances both pools of a stepped engine.
    pub fn advance(&self, elapsed: Duration) {
        self.requests.advance(elapsed);
        self.replies.advance(elapsed);
    }

    /// Stops every timer. Messages still pooled stay there until
    /// [`MixEngine::drain`].
    pub fn shutdown(&self) {
        self.requests.shutdown();
        self.replies.shutdown();
    }

    /// Releases everything still pooled in both directions.
    pub fn drain(&self) {
        self.requests.drain();
        self.replies.drain();
    }
}
