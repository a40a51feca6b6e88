use std::time::Duration;

use super::{FlushContext, OutputStrategy, Schedule};
use crate::message::Message;
use crate::pool::MessagePool;

/// Releases the whole pool, sorted, as soon as it holds `batch_size` messages.
pub struct BasicBatch {
    pool: MessagePool,
    batch_size: usize,
}

impl BasicBatch {
    pub fn new(batch_size: usize, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            batch_size,
        }
    }
}

impl OutputStrategy for BasicBatch {
    fn schedule(&self) -> Schedule {
        Schedule::OnArrival
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        if self.pool.len() >= self.batch_size {
            self.pool.drain_sorted()
        } else {
            Vec::new()
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_sorted()
    }
}

/// Releases the whole pool, sorted, on every tick that finds it non-empty.
pub struct TimedBatch {
    pool: MessagePool,
    sending_rate: Duration,
}

impl TimedBatch {
    pub fn new(sending_rate: Duration, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            sending_rate,
        }
    }
}

impl OutputStrategy for TimedBatch {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.sending_rate)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.drain_sorted()
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_sorted()
    }
}

/// Whichever comes first: `batch_size` messages or a tick.
pub struct ThresholdOrTimedBatch {
    pool: MessagePool,
    batch_size: usize,
    sending_rate: Duration,
}

impl ThresholdOrTimedBatch {
    pub fn new(batch_size: usize, sending_rate: Duration, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            batch_size,
            sending_rate,
        }
    }
}

impl OutputStrategy for ThresholdOrTimedBatch {
    fn schedule(&self) -> Schedule {
        Schedule::ArrivalAndPeriodic(self.sending_rate)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        if self.pool.len() >= self.batch_size {
            self.pool.drain_sorted()
        } else {
            Vec::new()
        }
    }

    fn on_tick(&mut self, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.drain_sorted()
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_sorted()
    }
}

/// Timed mix that only fires once more than `batch_size` messages wait.
///
/// Arrivals never release, so the pool may sit above `batch_size` until the
/// next tick.
pub struct ThresholdAndTimedBatch {
    pool: MessagePool,
    batch_size: usize,
    sending_rate: Duration,
}

impl ThresholdAndTimedBatch {
    pub fn new(batch_size: usize, sending_rate: Duration, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            batch_size,
            sending_rate,
        }
    }
}

impl OutputStrategy for ThresholdAndTimedBatch {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.sending_rate)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        if self.pool.len() > self.batch_size {
            self.pool.drain_sorted()
        } else {
            Vec::new()
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_sorted()
    }
}

/// Once the pool reaches `threshold`, releases `threshold - min_pool_size`
/// random messages and keeps the rest as pool feedback.
pub struct ThresholdPool {
    pool: MessagePool,
    min_pool_size: usize,
    threshold: usize,
}

impl ThresholdPool {
    pub fn new(min_pool_size: usize, threshold: usize, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            min_pool_size,
            threshold,
        }
    }
}

impl OutputStrategy for ThresholdPool {
    fn schedule(&self) -> Schedule {
        Schedule::OnArrival
    }

    fn on_arrival(&mut self, msg: Message, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        if self.pool.len() >= self.threshold {
            let amount = self.pool.len() - self.min_pool_size;
            self.pool.drain_random(amount, ctx.rng)
        } else {
            Vec::new()
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}
