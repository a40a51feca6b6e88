//! Output strategies: the policies deciding when and which pooled messages
//! leave the mix.
//!
//! Every strategy owns the buffer it schedules from and is only ever called
//! with the owning pool's lock held, so each call may decide and mutate in
//! one step.

mod batch;
mod delay;
mod probabilistic;
mod proportional;

use std::time::Duration;

pub use batch::{
    BasicBatch, ThresholdAndTimedBatch, ThresholdOrTimedBatch, ThresholdPool, TimedBatch,
};
pub use delay::CottrellRandomDelay;
pub use probabilistic::{
    binomial_plus_bias, mixminion_sendable, square_root_bias, timed_dynamic_sendable,
    BinomialPlusPool, CottrellPool, CottrellTimedPool, MixminionPool, SquareRootPool,
    TimedDynamicPool,
};
pub use proportional::ProportionalMethod;

use crate::message::Message;
use crate::rng::MixRng;
use crate::settings::StrategySettings;

/// What drives a strategy's flush decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Only arrivals trigger releases.
    OnArrival,
    /// Only a periodic timer triggers releases.
    Periodic(Duration),
    /// Arrivals and a periodic timer both trigger releases.
    ArrivalAndPeriodic(Duration),
    /// Each message carries its own release time.
    Deadlines,
}

impl Schedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Schedule::Periodic(interval) | Schedule::ArrivalAndPeriodic(interval) => {
                Some(*interval)
            }
            Schedule::OnArrival | Schedule::Deadlines => None,
        }
    }

    pub fn needs_timer(&self) -> bool {
        !matches!(self, Schedule::OnArrival)
    }
}

/// State a strategy may consult while deciding.
pub struct FlushContext<'a> {
    pub rng: &'a mut MixRng,
    /// Time since the pool was created, on the pool's clock.
    pub now: Duration,
}

pub trait OutputStrategy: Send {
    fn schedule(&self) -> Schedule;

    /// Takes ownership of an arriving message and returns whatever must be
    /// released because of it.
    fn on_arrival(&mut self, msg: Message, ctx: &mut FlushContext<'_>) -> Vec<Message>;

    /// Evaluates a timer tick.
    fn on_tick(&mut self, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        Vec::new()
    }

    /// Number of messages currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gives up every held message, for flush-on-exit.
    fn drain_all(&mut self) -> Vec<Message>;

    /// Earliest pending release time for [`Schedule::Deadlines`] strategies.
    fn next_deadline(&self) -> Option<Duration> {
        None
    }
}

/// Builds the strategy described by already validated settings.
pub fn new_strategy(settings: &StrategySettings, capacity_hint: usize) -> Box<dyn OutputStrategy> {
    match settings {
        StrategySettings::BasicBatch(s) => Box::new(BasicBatch::new(s.batch_size, capacity_hint)),
        StrategySettings::TimedBatch(s) => {
            Box::new(TimedBatch::new(s.sending_rate, capacity_hint))
        }
        StrategySettings::ThresholdOrTimedBatch(s) => Box::new(ThresholdOrTimedBatch::new(
            s.batch_size,
            s.sending_rate,
            capacity_hint,
        )),
        StrategySettings::ThresholdAndTimedBatch(s) => Box::new(ThresholdAndTimedBatch::new(
            s.batch_size,
            s.sending_rate,
            capacity_hint,
        )),
        StrategySettings::ThresholdPool(s) => Box::new(ThresholdPool::new(
            s.min_pool_size,
            s.threshold,
            capacity_hint,
        )),
        StrategySettings::CottrellPool(s) => {
            Box::new(CottrellPool::new(s.pool_size, capacity_hint))
        }
        StrategySettings::CottrellTimedPool(s) => Box::new(CottrellTimedPool::new(
            s.min_pool_size,
            s.send_interval,
            capacity_hint,
        )),
        StrategySettings::BinomialPlusPool(s) => Box::new(BinomialPlusPool::new(
            s.min_pool_size,
            s.k,
            s.send_interval,
            capacity_hint,
        )),
        StrategySettings::SquareRootPool(s) => {
            Box::new(SquareRootPool::new(s.send_interval, capacity_hint))
        }
        StrategySettings::MixminionPool(s) => Box::new(MixminionPool::new(
            s.min_pool_size,
            s.min_send,
            s.send_rate,
            s.send_interval,
            capacity_hint,
        )),
        StrategySettings::TimedDynamicPool(s) => Box::new(TimedDynamicPool::new(
            s.min_messages,
            s.fraction,
            s.send_interval,
            capacity_hint,
        )),
        StrategySettings::CottrellRandomDelay(s) => {
            Box::new(CottrellRandomDelay::new(s.max_delay))
        }
        StrategySettings::ProportionalMethod(s) => {
            Box::new(ProportionalMethod::new(s.pool_size, capacity_hint))
        }
    }
}
