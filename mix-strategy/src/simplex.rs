use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam::channel;
use parking_lot::Mutex;

use crate::message::{Direction, Message};
use crate::pool::PoolStats;
use crate::rng::MixRng;
use crate::scheduler::{spawn_deadline, spawn_periodic, Interval, LazyStart, TimerHandle};
use crate::settings::StrategyType;
use crate::sink::Sink;
use crate::strategy::{FlushContext, OutputStrategy, Schedule};

/// Time source of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Real time. Timers run on their own threads.
    #[default]
    Wall,
    /// Virtual time, moved forward only by [`SimplexMix::advance`].
    Stepped,
}

struct PoolState {
    strategy: Box<dyn OutputStrategy>,
    rng: MixRng,
    enqueued: u64,
    released: u64,
    // Virtual clock and lazily started interval, for `Clock::Stepped`.
    virtual_now: Duration,
    interval: Option<Interval>,
}

impl PoolState {
    fn stats(&self) -> PoolStats {
        PoolStats {
            enqueued: self.enqueued,
            released: self.released,
            pooled: self.strategy.len() as u64,
        }
    }

    fn account(&mut self, released: Vec<Message>) -> Flush {
        self.released += released.len() as u64;
        Flush {
            released,
            pooled: self.strategy.len(),
        }
    }
}

/// Messages taken out under the lock, with the pool size left behind.
struct Flush {
    released: Vec<Message>,
    pooled: usize,
}

struct Shared {
    direction: Direction,
    strategy_type: StrategyType,
    schedule: Schedule,
    clock: Clock,
    epoch: Instant,
    state: Mutex<PoolState>,
    sink: Arc<dyn Sink>,
}

impl Shared {
    fn now(&self, state: &PoolState) -> Duration {
        match self.clock {
            Clock::Wall => self.epoch.elapsed(),
            Clock::Stepped => state.virtual_now,
        }
    }

    fn tick(&self) {
        let flush = {
            let mut state = self.state.lock();
            let now = self.now(&state);
            let PoolState { strategy, rng, .. } = &mut *state;
            let released = strategy.on_tick(&mut FlushContext { rng, now });
            state.account(released)
        };
        self.deliver(flush, "tick");
    }

    fn next_deadline(&self) -> Option<Instant> {
        let state = self.state.lock();
        state
            .strategy
            .next_deadline()
            .map(|due| self.epoch + due)
    }

    fn deliver(&self, flush: Flush, trigger: &'static str) {
        let Flush { released, pooled } = flush;
        if released.is_empty() {
            return;
        }
        tracing::debug!(
            direction = %self.direction,
            strategy = %self.strategy_type,
            trigger,
            released = released.len(),
            pooled,
            "flushing pool"
        );
        self.sink.release(self.direction, released);
    }
}

/// Buffer, strategy and scheduler for one traffic direction.
///
/// Every decision and the matching removal happen under the pool lock; the
/// sink is called after the lock is released.
pub struct SimplexMix {
    shared: Arc<Shared>,
    timer_started: LazyStart,
    timer: Mutex<Option<TimerHandle>>,
    wake: Option<(channel::Sender<()>, channel::Receiver<()>)>,
}

impl SimplexMix {
    pub fn new(
        direction: Direction,
        strategy_type: StrategyType,
        strategy: Box<dyn OutputStrategy>,
        rng: MixRng,
        clock: Clock,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let schedule = strategy.schedule();
        let wake = (schedule == Schedule::Deadlines && clock == Clock::Wall)
            .then(|| channel::bounded(1));
        Self {
            shared: Arc::new(Shared {
                direction,
                strategy_type,
                schedule,
                clock,
                epoch: Instant::now(),
                state: Mutex::new(PoolState {
                    strategy,
                    rng,
                    enqueued: 0,
                    released: 0,
                    virtual_now: Duration::ZERO,
                    interval: None,
                }),
                sink,
            }),
            timer_started: LazyStart::default(),
            timer: Mutex::new(None),
            wake,
        }
    }

    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    pub fn schedule(&self) -> Schedule {
        self.shared.schedule
    }

    /// Accepts a message. Never blocks beyond lock contention and never
    /// rejects.
    pub fn enqueue(&self, msg: Message) {
        if msg.direction != self.shared.direction {
            tracing::warn!(
                pool = %self.shared.direction,
                received = %msg.direction,
                sequence = msg.sequence,
                "message pooled against its direction"
            );
        }
        tracing::trace!(
            direction = %self.shared.direction,
            sequence = msg.sequence,
            "enqueue"
        );
        let flush = {
            let mut state = self.shared.state.lock();
            state.enqueued += 1;
            let now = self.shared.now(&state);
            if self.shared.clock == Clock::Stepped && state.interval.is_none() {
                state.interval = self.shared.schedule.interval().map(Interval::new);
            }
            let PoolState { strategy, rng, .. } = &mut *state;
            let released = strategy.on_arrival(msg, &mut FlushContext { rng, now });
            state.account(released)
        };

        if self.shared.clock == Clock::Wall {
            self.ensure_timer();
        }
        if let Some((wake, _)) = &self.wake {
            // A full channel already has a wake-up pending.
            let _ = wake.try_send(());
        }
        self.shared.deliver(flush, "arrival");
    }

    /// Evaluates one timer tick right now, independent of the scheduler.
    pub fn tick(&self) {
        self.shared.tick();
    }

    /// Moves a stepped pool's clock forward and runs every tick that became
    /// due. Each tick is delivered as its own release.
    pub fn advance(&self, elapsed: Duration) {
        if self.shared.clock != Clock::Stepped {
            tracing::warn!(
                direction = %self.shared.direction,
                "advance ignored on a wall-clock pool"
            );
            return;
        }
        let batches = {
            let mut state = self.shared.state.lock();
            state.virtual_now += elapsed;
            let now = state.virtual_now;
            let ticks = match self.shared.schedule {
                Schedule::OnArrival => 0,
                Schedule::Deadlines => 1,
                Schedule::Periodic(_) | Schedule::ArrivalAndPeriodic(_) => state
                    .interval
                    .as_mut()
                    .map_or(0, |interval| interval.update(elapsed)),
            };
            let mut batches = Vec::new();
            for _ in 0..ticks {
                let PoolState { strategy, rng, .. } = &mut *state;
                let released = strategy.on_tick(&mut FlushContext { rng, now });
                batches.push(state.account(released));
            }
            batches
        };
        for flush in batches {
            self.shared.deliver(flush, "tick");
        }
    }

    /// Hands every pooled message to the sink.
    pub fn drain(&self) {
        let flush = {
            let mut state = self.shared.state.lock();
            let released = state.strategy.drain_all();
            state.account(released)
        };
        self.shared.deliver(flush, "drain");
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    /// Stops the timer thread, if one is running. Pooled messages stay put.
    pub fn shutdown(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.stop();
            tracing::info!(direction = %self.shared.direction, "pool timer stopped");
        }
    }

    fn ensure_timer(&self) {
        if !self.shared.schedule.needs_timer() || !self.timer_started.begin() {
            return;
        }
        let name = format!("mix-{}-timer", self.shared.direction);
        let spawned = match self.shared.schedule {
            Schedule::Periodic(interval) | Schedule::ArrivalAndPeriodic(interval) => {
                let shared = Arc::downgrade(&self.shared);
                spawn_periodic(name, interval, move || tick_if_alive(&shared))
            }
            Schedule::Deadlines => {
                let Some((_, wake)) = &self.wake else {
                    return;
                };
                let for_deadline = Arc::downgrade(&self.shared);
                let for_tick = Arc::downgrade(&self.shared);
                spawn_deadline(
                    name,
                    wake.clone(),
                    move || {
                        for_deadline
                            .upgrade()
                            .map(|shared| shared.next_deadline())
                    },
                    move || tick_if_alive(&for_tick),
                )
            }
            Schedule::OnArrival => return,
        };
        match spawned {
            Ok(timer) => {
                *self.timer.lock() = Some(timer);
                tracing::info!(
                    direction = %self.shared.direction,
                    strategy = %self.shared.strategy_type,
                    schedule = ?self.shared.schedule,
                    "pool timer started"
                );
            }
            Err(e) => {
                tracing::error!(
                    direction = %self.shared.direction,
                    "cannot start pool timer, retrying on next message: {e}"
                );
                self.timer_started.reset();
            }
        }
    }
}

impl Drop for SimplexMix {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tick_if_alive(shared: &Weak<Shared>) -> bool {
    match shared.upgrade() {
        Some(shared) => {
            shared.tick();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::message::SessionId;
    use crate::rng::RngKind;
    use crate::sink::{ChannelSink, Release};
    use crate::strategy::{
        BasicBatch, CottrellRandomDelay, ThresholdAndTimedBatch, ThresholdOrTimedBatch,
        TimedBatch,
    };

    fn request(i: u64) -> Message {
        Message::request(SessionId::from(i % 3), (u64::MAX - i).to_be_bytes().to_vec(), i)
    }

    fn simplex(
        strategy_type: StrategyType,
        strategy: Box<dyn OutputStrategy>,
        clock: Clock,
    ) -> (SimplexMix, channel::Receiver<Release>) {
        let (sink, releases) = ChannelSink::unbounded();
        let mix = SimplexMix::new(
            Direction::Request,
            strategy_type,
            strategy,
            MixRng::new(RngKind::Std, Some(0)),
            clock,
            Arc::new(sink),
        );
        (mix, releases)
    }

    #[test]
    fn basic_batch_emits_one_sorted_release() {
        let (mix, releases) = simplex(
            StrategyType::BasicBatch,
            Box::new(BasicBatch::new(4, 4)),
            Clock::Stepped,
        );
        for i in 0..4 {
            mix.enqueue(request(i));
        }
        let release = releases.try_recv().unwrap();
        assert_eq!(release.direction, Direction::Request);
        assert_eq!(
            release.messages.iter().map(|m| m.sequence).collect::<Vec<_>>(),
            vec![3, 2, 1, 0]
        );
        assert!(releases.try_recv().is_err());
        assert_eq!(
            mix.stats(),
            PoolStats {
                enqueued: 4,
                released: 4,
                pooled: 0
            }
        );
    }

    #[test]
    fn threshold_and_timed_on_stepped_clock() {
        let interval = Duration::from_secs(1);
        let (mix, releases) = simplex(
            StrategyType::ThresholdAndTimedBatch,
            Box::new(ThresholdAndTimedBatch::new(3, interval, 0)),
            Clock::Stepped,
        );

        // batch_size - 1 then a tick: nothing.
        mix.enqueue(request(0));
        mix.enqueue(request(1));
        mix.advance(interval);
        assert!(releases.try_recv().is_err());

        // batch_size + 1 then a tick: everything.
        mix.enqueue(request(2));
        mix.enqueue(request(3));
        mix.advance(interval);
        let release = releases.try_recv().unwrap();
        assert_eq!(release.messages.len(), 4);
        assert!(mix.stats().is_balanced());
        assert_eq!(mix.stats().pooled, 0);
    }

    #[test]
    fn stepped_interval_starts_on_first_message() {
        let interval = Duration::from_secs(2);
        let (mix, releases) = simplex(
            StrategyType::TimedBatch,
            Box::new(TimedBatch::new(interval, 0)),
            Clock::Stepped,
        );
        // Time passing before the first message does not count.
        mix.advance(Duration::from_secs(10));
        mix.enqueue(request(0));
        mix.advance(Duration::from_secs(1));
        assert!(releases.try_recv().is_err());
        mix.advance(Duration::from_secs(1));
        assert_eq!(releases.try_recv().unwrap().messages.len(), 1);
    }

    #[test]
    fn random_delay_on_stepped_clock() {
        let max_delay = Duration::from_millis(100);
        let (mix, releases) = simplex(
            StrategyType::CottrellRandomDelay,
            Box::new(CottrellRandomDelay::new(max_delay)),
            Clock::Stepped,
        );
        for i in 0..20 {
            mix.enqueue(request(i));
        }
        mix.advance(max_delay);
        let released: usize = releases.try_iter().map(|r| r.messages.len()).sum();
        assert_eq!(released, 20);
        assert_eq!(mix.stats().pooled, 0);
    }

    #[test]
    fn drain_flushes_remaining_messages() {
        let (mix, releases) = simplex(
            StrategyType::TimedBatch,
            Box::new(TimedBatch::new(Duration::from_secs(60), 0)),
            Clock::Stepped,
        );
        for i in 0..5 {
            mix.enqueue(request(i));
        }
        mix.drain();
        assert_eq!(releases.try_recv().unwrap().messages.len(), 5);
        assert!(mix.stats().is_balanced());
        // Draining an empty pool sends nothing.
        mix.drain();
        assert!(releases.try_recv().is_err());
    }

    #[test]
    fn wall_clock_timer_releases_after_interval() {
        let interval = Duration::from_millis(20);
        let (mix, releases) = simplex(
            StrategyType::TimedBatch,
            Box::new(TimedBatch::new(interval, 0)),
            Clock::Wall,
        );
        let start = Instant::now();
        mix.enqueue(request(0));
        mix.enqueue(request(1));
        let release = releases.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() >= interval);
        assert_eq!(release.messages.len(), 2);
        mix.shutdown();
    }

    #[test]
    fn wall_clock_random_delay_releases_everything() {
        let (mix, releases) = simplex(
            StrategyType::CottrellRandomDelay,
            Box::new(CottrellRandomDelay::new(Duration::from_millis(30))),
            Clock::Wall,
        );
        for i in 0..10 {
            mix.enqueue(request(i));
        }
        let mut seen = HashSet::new();
        while seen.len() < 10 {
            let release = releases.recv_timeout(Duration::from_secs(5)).unwrap();
            for msg in release.messages {
                assert!(seen.insert(msg.sequence));
            }
        }
        mix.shutdown();
        assert!(mix.stats().is_balanced());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn flush_event_reports_remaining_pool() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (mix, releases) = simplex(
                StrategyType::ThresholdAndTimedBatch,
                Box::new(ThresholdAndTimedBatch::new(1, Duration::from_secs(1), 0)),
                Clock::Stepped,
            );
            mix.enqueue(request(0));
            mix.enqueue(request(1));
            mix.advance(Duration::from_secs(1));
            assert_eq!(releases.try_recv().unwrap().messages.len(), 2);
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        let flush = output
            .lines()
            .find(|line| line.contains("flushing pool"))
            .unwrap();
        assert!(flush.contains("released=2"), "{flush}");
        assert!(flush.contains("pooled=0"), "{flush}");
    }

    #[test]
    fn foreign_direction_is_pooled_without_panicking() {
        let (mix, releases) = simplex(
            StrategyType::BasicBatch,
            Box::new(BasicBatch::new(1, 0)),
            Clock::Stepped,
        );
        mix.enqueue(Message::reply(SessionId::from(1u64), vec![1], 0));
        assert_eq!(releases.try_recv().unwrap().messages.len(), 1);
        assert!(mix.stats().is_balanced());
    }

    #[test]
    fn concurrent_producers_and_ticks_lose_nothing() {
        let (mix, releases) = simplex(
            StrategyType::ThresholdOrTimedBatch,
            Box::new(ThresholdOrTimedBatch::new(7, Duration::from_secs(3600), 0)),
            Clock::Wall,
        );
        let mix = Arc::new(mix);
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let mix = mix.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        mix.enqueue(request(p * 1000 + i));
                    }
                })
            })
            .collect();
        let ticker = {
            let mix = mix.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    mix.tick();
                    let stats = mix.stats();
                    assert!(stats.is_balanced());
                }
            })
        };
        for producer in producers {
            producer.join().unwrap();
        }
        ticker.join().unwrap();
        mix.drain();
        mix.shutdown();

        let mut seen = HashSet::new();
        for release in releases.try_iter() {
            assert!(!release.messages.is_empty());
            for msg in release.messages {
                assert!(seen.insert(msg.sequence), "duplicate release");
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(
            mix.stats(),
            PoolStats {
                enqueued: 1000,
                released: 1000,
                pooled: 0
            }
        );
    }
}
