use std::collections::VecDeque;

use rand::Rng;

use super::{FlushContext, OutputStrategy, Schedule};
use crate::message::{Message, SessionId};

struct SessionQueue {
    owner: SessionId,
    queue: VecDeque<Message>,
}

impl SessionQueue {
    fn new(msg: Message) -> Self {
        Self {
            owner: msg.owner,
            queue: VecDeque::from([msg]),
        }
    }
}

/// Per-session proportional scheduling over a Cottrell pool of session slots.
///
/// Each slot holds one session's FIFO queue. Admission and eviction follow
/// [`super::CottrellPool`], except that the unit drawn is a session slot and
/// releasing a slot sends only that session's oldest message. A session whose
/// last message leaves frees its slot; sessions arriving while every slot is
/// taken wait, in arrival order, for a free slot.
pub struct ProportionalMethod {
    pool_size: usize,
    slots: Vec<SessionQueue>,
    waiting: VecDeque<SessionQueue>,
    len: usize,
}

impl ProportionalMethod {
    pub fn new(pool_size: usize, capacity_hint: usize) -> Self {
        Self {
            pool_size,
            slots: Vec::with_capacity(capacity_hint),
            waiting: VecDeque::new(),
            len: 0,
        }
    }

    pub fn occupied_slots(&self) -> usize {
        self.slots.len()
    }

    /// Files `msg` under its session. Returns `true` if it opened a new slot.
    fn admit(&mut self, msg: Message) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.owner == msg.owner) {
            slot.queue.push_back(msg);
            return false;
        }
        if let Some(waiting) = self.waiting.iter_mut().find(|s| s.owner == msg.owner) {
            waiting.queue.push_back(msg);
            return false;
        }
        if self.slots.len() < self.pool_size {
            self.slots.push(SessionQueue::new(msg));
            return true;
        }
        self.waiting.push_back(SessionQueue::new(msg));
        false
    }

    /// Sends the oldest message of slot `idx`, handing the slot to the next
    /// waiting session once it runs dry.
    fn release_slot(&mut self, idx: usize) -> Option<Message> {
        let msg = self.slots[idx].queue.pop_front();
        if self.slots[idx].queue.is_empty() {
            match self.waiting.pop_front() {
                Some(next) => self.slots[idx] = next,
                None => {
                    self.slots.remove(idx);
                }
            }
        }
        msg
    }

    /// Sends the oldest message of `owner`, wherever its queue lives.
    fn release_session(&mut self, owner: SessionId) -> Option<Message> {
        if let Some(idx) = self.slots.iter().position(|s| s.owner == owner) {
            return self.release_slot(idx);
        }
        let idx = self.waiting.iter().position(|s| s.owner == owner)?;
        let msg = self.waiting[idx].queue.pop_front();
        if self.waiting[idx].queue.is_empty() {
            self.waiting.remove(idx);
        }
        msg
    }
}

impl OutputStrategy for ProportionalMethod {
    fn schedule(&self) -> Schedule {
        Schedule::OnArrival
    }

    fn on_arrival(&mut self, msg: Message, ctx: &mut FlushContext<'_>) -> Vec<Message> {
        let owner = msg.owner;
        self.len += 1;
        if self.admit(msg) || self.slots.len() < self.pool_size {
            return Vec::new();
        }

        let slot = ctx.rng.gen_range(0..=self.pool_size);
        let released = if slot == self.pool_size {
            self.release_session(owner)
        } else {
            self.release_slot(slot)
        };
        match released {
            Some(msg) => {
                self.len -= 1;
                vec![msg]
            }
            None => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn drain_all(&mut self) -> Vec<Message> {
        self.len = 0;
        self.slots
            .drain(..)
            .chain(self.waiting.drain(..))
            .flat_map(|session| session.queue)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::strategy::testing::{rng, session_message};

    #[test]
    fn fills_slots_before_releasing() {
        let mut rng = rng(21);
        let mut strategy = ProportionalMethod::new(3, 0);
        let mut ctx = FlushContext {
            rng: &mut rng,
            now: Duration::ZERO,
        };
        // Two sessions, many messages: slots never fill, nothing leaves.
        for i in 0..10 {
            assert!(strategy
                .on_arrival(session_message(i % 2, i), &mut ctx)
                .is_empty());
        }
        assert_eq!(strategy.occupied_slots(), 2);
        // Third session takes the last slot without a release.
        assert!(strategy
            .on_arrival(session_message(2, 10), &mut ctx)
            .is_empty());
        assert_eq!(strategy.occupied_slots(), 3);
        assert_eq!(strategy.len(), 11);

        // Saturated: an arrival releases at most one message, and exactly one
        // while every slot stays taken.
        let mut total_released = 0;
        for i in 11..200 {
            let saturated = strategy.occupied_slots() == 3;
            let released = strategy.on_arrival(session_message(i % 5, i), &mut ctx);
            assert!(released.len() <= 1);
            if saturated && strategy.occupied_slots() == 3 {
                assert_eq!(released.len(), 1);
            }
            total_released += released.len();
            assert_eq!(strategy.len() + total_released, i as usize + 1);
            assert!(strategy.occupied_slots() <= 3);
        }
        assert!(total_released > 100);
    }

    #[test]
    fn sessions_release_in_fifo_order() {
        let mut rng = rng(22);
        let mut strategy = ProportionalMethod::new(2, 0);
        let mut ctx = FlushContext {
            rng: &mut rng,
            now: Duration::ZERO,
        };
        let mut released = Vec::new();
        for i in 0..300 {
            released.extend(strategy.on_arrival(session_message(i % 6, i), &mut ctx));
        }
        released.extend(strategy.drain_all());
        assert_eq!(released.len(), 300);
        assert_eq!(strategy.len(), 0);

        let mut last_per_session: HashMap<SessionId, u64> = HashMap::new();
        for msg in &released {
            if let Some(previous) = last_per_session.insert(msg.owner, msg.sequence) {
                assert!(previous < msg.sequence, "session order violated");
            }
        }
    }

    #[test]
    fn pass_through_releases_own_oldest() {
        let mut rng = rng(23);
        let mut strategy = ProportionalMethod::new(1, 0);
        let mut ctx = FlushContext {
            rng: &mut rng,
            now: Duration::ZERO,
        };
        strategy.on_arrival(session_message(0, 0), &mut ctx);
        for i in 1..50 {
            let released = strategy.on_arrival(session_message(0, i), &mut ctx);
            assert_eq!(released.len(), 1);
            // Single session: whatever is drawn, its oldest message leaves.
            assert_eq!(released[0].sequence, i - 1);
        }
    }
}
