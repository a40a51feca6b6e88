use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use rand::Rng;

use super::{FlushContext, OutputStrategy, Schedule};
use crate::message::Message;

struct Delayed {
    due: Duration,
    // Arrival counter; keeps equal deadlines in a stable order.
    arrival: u64,
    msg: Message,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.arrival.cmp(&other.arrival))
    }
}

/// Holds every message for its own delay, drawn uniformly from
/// `[0, max_delay]`, and releases messages as their delays expire.
pub struct CottrellRandomDelay {
    max_delay: Duration,
    pending: BinaryHeap<Reverse<Delayed>>,
    arrivals: u64,
}

impl CottrellRandomDelay {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay,
            pending: BinaryHeap::new(),
            arrivals: 0,
        }
    }
}

impl OutputStrategy for CottrellRandomDelay {
    fn schedule(&self) -> Schedule {
        Schedule::Deadlines
    }

    fn on_arrival(&mut self, msg: Message, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        let delay = ctx.rng.gen_range(Duration::ZERO..=self.max_delay);
        self.pending.push(Reverse(Delayed {
            due: ctx.now + delay,
            arrival: self.arrivals,
            msg,
        }));
        self.arrivals += 1;
        Vec::new()
    }

    fn on_tick(&mut self, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        let mut released = Vec::new();
        while let Some(Reverse(next)) = self.pending.peek() {
            if next.due > ctx.now {
                break;
            }
            if let Some(Reverse(delayed)) = self.pending.pop() {
                released.push(delayed.msg);
            }
        }
        released
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn drain_all(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.pending)
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|Reverse(delayed)| delayed.msg)
            .collect()
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.pending.peek().map(|Reverse(next)| next.due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::{message, rng};

    #[test]
    fn releases_only_expired_messages() {
        let mut rng = rng(11);
        let max_delay = Duration::from_millis(100);
        let mut strategy = CottrellRandomDelay::new(max_delay);
        for i in 0..50 {
            let mut ctx = FlushContext {
                rng: &mut rng,
                now: Duration::ZERO,
            };
            assert!(strategy.on_arrival(message(i), &mut ctx).is_empty());
        }
        let first_due = strategy.next_deadline().unwrap();
        assert!(first_due <= max_delay);

        let mut released = 0;
        let mut last_due = Duration::ZERO;
        for step in 0..=10 {
            let now = Duration::from_millis(step * 10);
            let mut ctx = FlushContext { rng: &mut rng, now };
            released += strategy.on_tick(&mut ctx).len();
            if let Some(due) = strategy.next_deadline() {
                assert!(due > now);
                assert!(due >= last_due);
                last_due = due;
            }
        }
        assert_eq!(released, 50);
        assert_eq!(strategy.len(), 0);
        assert_eq!(strategy.next_deadline(), None);
    }

    #[test]
    fn release_order_is_not_arrival_order() {
        // Two back-to-back arrivals may leave in either order; over many
        // pairs both orders must show up.
        let mut rng = rng(12);
        let mut in_order = 0;
        let mut reversed = 0;
        for pair in 0..200u64 {
            let mut strategy = CottrellRandomDelay::new(Duration::from_secs(1));
            for i in [pair * 2, pair * 2 + 1] {
                let mut ctx = FlushContext {
                    rng: &mut rng,
                    now: Duration::ZERO,
                };
                strategy.on_arrival(message(i), &mut ctx);
            }
            let released = strategy.drain_all();
            if released[0].sequence < released[1].sequence {
                in_order += 1;
            } else {
                reversed += 1;
            }
        }
        assert!(in_order > 0);
        assert!(reversed > 0);
    }

    #[test]
    fn zero_max_delay_is_due_immediately() {
        let mut rng = rng(13);
        let mut strategy = CottrellRandomDelay::new(Duration::ZERO);
        let now = Duration::from_secs(5);
        let mut ctx = FlushContext { rng: &mut rng, now };
        strategy.on_arrival(message(0), &mut ctx);
        assert_eq!(strategy.next_deadline(), Some(now));
        assert_eq!(strategy.on_tick(&mut ctx).len(), 1);
    }
}
