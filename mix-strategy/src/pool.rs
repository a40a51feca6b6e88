use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::Serialize;

use crate::message::Message;

/// Snapshot of one direction's accounting.
///
/// `enqueued == released + pooled` holds for every snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub enqueued: u64,
    pub released: u64,
    pub pooled: u64,
}

impl PoolStats {
    pub fn is_balanced(&self) -> bool {
        self.enqueued == self.released + self.pooled
    }
}

/// Unordered buffer of messages waiting for release.
///
/// Slot positions are stable between calls unless a drain removes messages,
/// which the Cottrell family relies on when it swaps a single slot.
#[derive(Debug, Default)]
pub struct MessagePool {
    messages: Vec<Message>,
}

impl MessagePool {
    pub fn with_capacity(capacity_hint: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity_hint),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Puts `msg` into slot `idx` and returns the message that was there.
    pub fn replace(&mut self, idx: usize, msg: Message) -> Message {
        std::mem::replace(&mut self.messages[idx], msg)
    }

    /// Empties the pool, returning everything in ascending message order.
    pub fn drain_sorted(&mut self) -> Vec<Message> {
        let mut batch = std::mem::take(&mut self.messages);
        batch.sort();
        batch
    }

    /// Removes `amount` messages chosen uniformly without replacement.
    /// The returned messages are in random order.
    pub fn drain_random<R: Rng>(&mut self, amount: usize, rng: &mut R) -> Vec<Message> {
        let amount = amount.min(self.messages.len());
        if amount == 0 {
            return Vec::new();
        }
        let mut picked = index::sample(rng, self.messages.len(), amount).into_vec();
        // Removing from the back first keeps the remaining indices valid.
        picked.sort_unstable_by(|a, b| b.cmp(a));
        let mut released: Vec<Message> = picked
            .into_iter()
            .map(|idx| self.messages.swap_remove(idx))
            .collect();
        released.shuffle(rng);
        released
    }

    /// Flips an independent coin with bias `p` for every pooled message and
    /// removes the winners. The returned messages are in random order.
    pub fn drain_by_coin<R: Rng>(&mut self, p: f64, rng: &mut R) -> Vec<Message> {
        let p = p.clamp(0.0, 1.0);
        let (mut released, kept): (Vec<Message>, Vec<Message>) =
            std::mem::take(&mut self.messages)
                .into_iter()
                .partition(|_| rng.gen_bool(p));
        self.messages = kept;
        released.shuffle(rng);
        released
    }

    /// Empties the pool without imposing any order.
    pub fn drain_all(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::message::SessionId;

    fn filled(n: u64) -> MessagePool {
        let mut pool = MessagePool::with_capacity(n as usize);
        for i in 0..n {
            pool.push(Message::request(
                SessionId::from(i),
                vec![(n - i) as u8],
                i,
            ));
        }
        pool
    }

    #[test]
    fn drain_sorted_orders_by_payload_and_empties() {
        let mut pool = filled(5);
        let batch = pool.drain_sorted();
        assert!(pool.is_empty());
        let payloads: Vec<u8> = batch.iter().map(|m| m.payload[0]).collect();
        assert_eq!(payloads, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn drain_random_removes_exactly_amount_without_duplicates() {
        let mut rng = StdRng::seed_from_u64(0);
        for amount in 0..=10 {
            let mut pool = filled(10);
            let released = pool.drain_random(amount, &mut rng);
            assert_eq!(released.len(), amount);
            assert_eq!(pool.len(), 10 - amount);

            let mut seen: HashSet<u64> = released.iter().map(|m| m.sequence).collect();
            assert_eq!(seen.len(), amount);
            for msg in pool.drain_all() {
                assert!(seen.insert(msg.sequence));
            }
            assert_eq!(seen.len(), 10);
        }
    }

    #[test]
    fn drain_random_caps_at_pool_size() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = filled(3);
        assert_eq!(pool.drain_random(7, &mut rng).len(), 3);
        assert!(pool.is_empty());
    }

    #[test]
    fn drain_by_coin_extremes() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = filled(8);
        assert!(pool.drain_by_coin(0.0, &mut rng).is_empty());
        assert_eq!(pool.len(), 8);
        assert_eq!(pool.drain_by_coin(1.0, &mut rng).len(), 8);
        assert!(pool.is_empty());
    }

    #[test]
    fn replace_swaps_single_slot() {
        let mut pool = filled(3);
        let incoming = Message::request(SessionId::from(9u64), vec![42], 9);
        let evicted = pool.replace(1, incoming);
        assert_eq!(evicted.sequence, 1);
        assert_eq!(pool.len(), 3);
    }
}
