use std::time::Duration;

use rand::Rng;

use super::{FlushContext, OutputStrategy, Schedule};
use crate::message::Message;
use crate::pool::MessagePool;

/// Release bias of the binomial-plus pool.
///
/// `p = 1 - ((M - n) * e^(-k*M) + n) / M`, clamped to `[0, 1]` so that a
/// pool smaller than `n` never releases. Undefined for an empty pool.
pub fn binomial_plus_bias(pool_size: usize, min_pool_size: usize, k: f64) -> Option<f64> {
    if pool_size == 0 {
        return None;
    }
    let m = pool_size as f64;
    let n = min_pool_size as f64;
    let p = 1.0 - (((m - n) * (-k * m).exp() + n) / m);
    Some(p.clamp(0.0, 1.0))
}

/// Release bias of the square-root pool: `p = 1 - 1/sqrt(M)`.
pub fn square_root_bias(pool_size: usize) -> Option<f64> {
    if pool_size == 0 {
        return None;
    }
    Some((1.0 - 1.0 / (pool_size as f64).sqrt()).clamp(0.0, 1.0))
}

/// Messages a Mixminion timed dynamic pool sends on one tick.
///
/// Nothing is sent below `min_pool_size + min_send`; otherwise
/// `min(M - min_send, max(1, round(M * send_rate)))`.
pub fn mixminion_sendable(
    pool_size: usize,
    min_pool_size: usize,
    min_send: usize,
    send_rate: f64,
) -> usize {
    if pool_size < min_pool_size.saturating_add(min_send) {
        return 0;
    }
    let by_rate = ((pool_size as f64 * send_rate).round() as usize).max(1);
    (pool_size - min_send).min(by_rate)
}

/// Messages the fraction-based timed dynamic pool sends on one tick:
/// `floor(fraction * (M - min_messages))` when `M > min_messages`.
pub fn timed_dynamic_sendable(pool_size: usize, min_messages: usize, fraction: f64) -> usize {
    if pool_size <= min_messages {
        return 0;
    }
    (fraction * (pool_size - min_messages) as f64).floor() as usize
}

/// Cottrell's fixed-size pool. Once full, every arrival evicts one message:
/// a uniform draw over the `pool_size` slots plus the arrival itself.
pub struct CottrellPool {
    pool: MessagePool,
    pool_size: usize,
}

impl CottrellPool {
    pub fn new(pool_size: usize, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            pool_size,
        }
    }
}

impl OutputStrategy for CottrellPool {
    fn schedule(&self) -> Schedule {
        Schedule::OnArrival
    }

    fn on_arrival(&mut self, msg: Message, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        if self.pool.len() < self.pool_size {
            self.pool.push(msg);
            return Vec::new();
        }
        let slot = ctx.rng.gen_range(0..=self.pool_size);
        if slot == self.pool_size {
            vec![msg]
        } else {
            vec![self.pool.replace(slot, msg)]
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}

/// Releases everything above `min_pool_size`, chosen at random, each tick.
pub struct CottrellTimedPool {
    pool: MessagePool,
    min_pool_size: usize,
    send_interval: Duration,
}

impl CottrellTimedPool {
    pub fn new(min_pool_size: usize, send_interval: Duration, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            min_pool_size,
            send_interval,
        }
    }
}

impl OutputStrategy for CottrellTimedPool {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.send_interval)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        let amount = self.pool.len().saturating_sub(self.min_pool_size);
        self.pool.drain_random(amount, ctx.rng)
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}

pub struct BinomialPlusPool {
    pool: MessagePool,
    min_pool_size: usize,
    k: f64,
    send_interval: Duration,
}

impl BinomialPlusPool {
    pub fn new(
        min_pool_size: usize,
        k: f64,
        send_interval: Duration,
        capacity_hint: usize,
    ) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            min_pool_size,
            k,
            send_interval,
        }
    }
}

impl OutputStrategy for BinomialPlusPool {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.send_interval)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        match binomial_plus_bias(self.pool.len(), self.min_pool_size, self.k) {
            Some(p) => self.pool.drain_by_coin(p, ctx.rng),
            None => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}

pub struct SquareRootPool {
    pool: MessagePool,
    send_interval: Duration,
}

impl SquareRootPool {
    pub fn new(send_interval: Duration, capacity_hint: usize) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            send_interval,
        }
    }
}

impl OutputStrategy for SquareRootPool {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.send_interval)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        match square_root_bias(self.pool.len()) {
            Some(p) => self.pool.drain_by_coin(p, ctx.rng),
            None => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}

/// Mixminion's timed dynamic pool.
pub struct MixminionPool {
    pool: MessagePool,
    min_pool_size: usize,
    min_send: usize,
    send_rate: f64,
    send_interval: Duration,
}

impl MixminionPool {
    pub fn new(
        min_pool_size: usize,
        min_send: usize,
        send_rate: f64,
        send_interval: Duration,
        capacity_hint: usize,
    ) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            min_pool_size,
            min_send,
            send_rate,
            send_interval,
        }
    }
}

impl OutputStrategy for MixminionPool {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.send_interval)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        let amount = mixminion_sendable(
            self.pool.len(),
            self.min_pool_size,
            self.min_send,
            self.send_rate,
        );
        self.pool.drain_random(amount, ctx.rng)
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}

/// Timed dynamic pool sending a fixed fraction of the surplus per tick.
pub struct TimedDynamicPool {
    pool: MessagePool,
    min_messages: usize,
    fraction: f64,
    send_interval: Duration,
}

impl TimedDynamicPool {
    pub fn new(
        min_messages: usize,
        fraction: f64,
        send_interval: Duration,
        capacity_hint: usize,
    ) -> Self {
        Self {
            pool: MessagePool::with_capacity(capacity_hint),
            min_messages,
            fraction,
            send_interval,
        }
    }
}

impl OutputStrategy for TimedDynamicPool {
    fn schedule(&self) -> Schedule {
        Schedule::Periodic(self.send_interval)
    }

    fn on_arrival(&mut self, msg: Message, _ctx: &mut FlushContext<'_>) -> Vec<Message> {
        self.pool.push(msg);
        Vec::new()
    }

    fn on_tick(&mut self, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        let amount = timed_dynamic_sendable(self.pool.len(), self.min_messages, self.fraction);
        self.pool.drain_random(amount, ctx.rng)
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.pool.drain_all()
    }
}
