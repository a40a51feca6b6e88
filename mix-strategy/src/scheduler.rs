use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel;

/// Virtual-time interval driven by the host's step clock.
///
/// Accumulates elapsed time and reports how many full periods have passed.
pub struct Interval {
    duration: Duration,
    current_elapsed: Duration,
}

impl Interval {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            current_elapsed: Duration::from_secs(0),
        }
    }

    /// Returns the number of ticks that became due during `elapsed`.
    pub fn update(&mut self, elapsed: Duration) -> u32 {
        self.current_elapsed += elapsed;
        let mut ticks = 0;
        while self.current_elapsed >= self.duration {
            self.current_elapsed -= self.duration;
            ticks += 1;
        }
        ticks
    }
}

/// One-shot latch for starting a timer on the first message.
#[derive(Debug, Default)]
pub struct LazyStart {
    started: AtomicBool,
}

impl LazyStart {
    /// Returns `true` for exactly one caller.
    pub fn begin(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Lets the next caller of [`LazyStart::begin`] try again.
    pub fn reset(&self) {
        self.started.store(false, Ordering::Release);
    }
}

/// Owns a timer thread. Dropping the handle stops the thread and joins it.
pub struct TimerHandle {
    stop: Option<channel::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the stop channel wakes the thread.
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs `on_tick` every `interval` until stopped or until `on_tick` returns
/// `false`. The first tick fires one full interval after the spawn.
pub fn spawn_periodic<F>(
    name: String,
    interval: Duration,
    mut on_tick: F,
) -> std::io::Result<TimerHandle>
where
    F: FnMut() -> bool + Send + 'static,
{
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    let thread = thread::Builder::new().name(name.clone()).spawn(move || {
        let ticker = channel::tick(interval);
        tracing::info!(timer = %name, ?interval, "periodic timer started");
        loop {
            crossbeam::select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    if !on_tick() {
                        break;
                    }
                },
            }
        }
        tracing::info!(timer = %name, "periodic timer stopped");
    })?;
    Ok(TimerHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    })
}

/// Sleeps until the instant returned by `next_deadline`, then runs `on_due`.
///
/// With no deadline pending the thread parks on `wake`; senders must poke
/// `wake` whenever a new deadline may be earlier than the current one.
pub fn spawn_deadline<N, F>(
    name: String,
    wake: channel::Receiver<()>,
    mut next_deadline: N,
    mut on_due: F,
) -> std::io::Result<TimerHandle>
where
    N: FnMut() -> Option<Option<Instant>> + Send + 'static,
    F: FnMut() -> bool + Send + 'static,
{
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    let thread = thread::Builder::new().name(name.clone()).spawn(move || {
        tracing::info!(timer = %name, "deadline timer started");
        loop {
            // Outer `None` means the owner is gone.
            let Some(deadline) = next_deadline() else {
                break;
            };
            match deadline {
                None => crossbeam::select! {
                    recv(stop_rx) -> _ => break,
                    recv(wake) -> msg => {
                        if msg.is_err() {
                            break;
                        }
                    },
                },
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    crossbeam::select! {
                        recv(stop_rx) -> _ => break,
                        recv(wake) -> msg => {
                            if msg.is_err() {
                                break;
                            }
                        },
                        default(timeout) => {
                            if !on_due() {
                                break;
                            }
                        },
                    }
                }
            }
        }
        tracing::info!(timer = %name, "deadline timer stopped");
    })?;
    Ok(TimerHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    })
}
