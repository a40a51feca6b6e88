use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel;
use mix_strategy::{Direction, Message, MixEngine, SequenceGenerator, SessionId};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::settings::TrafficSettings;

struct Producer {
    engine: Arc<MixEngine>,
    direction: Direction,
    interval: Duration,
    deadline: Instant,
    sessions: Arc<[SessionId]>,
    payload_size: usize,
    sequence: Arc<SequenceGenerator>,
    rng: ChaCha8Rng,
}

impl Producer {
    fn next_message(&mut self) -> Message {
        let owner = self.sessions[self.rng.gen_range(0..self.sessions.len())];
        let mut payload = vec![0u8; self.payload_size];
        self.rng.fill_bytes(&mut payload);
        Message::new(self.direction, owner, payload, self.sequence.next())
    }

    /// Sends one message per interval until the deadline passes or `stop`
    /// disconnects. Returns how many messages were sent.
    fn run(mut self, stop: channel::Receiver<()>) -> u64 {
        let ticker = channel::tick(self.interval);
        let deadline = channel::at(self.deadline);
        let mut sent = 0;
        loop {
            crossbeam::select! {
                recv(stop) -> _ => break,
                recv(deadline) -> _ => break,
                recv(ticker) -> _ => {
                    let msg = self.next_message();
                    self.engine.add(msg);
                    sent += 1;
                },
            }
        }
        tracing::info!(direction = %self.direction, sent, "producer stopped");
        sent
    }
}

/// Starts one request producer and one reply producer over a shared set of
/// sessions. Both stop after `settings.duration` or once `stop` disconnects.
pub fn spawn_producers(
    engine: Arc<MixEngine>,
    settings: &TrafficSettings,
    seed: Option<u64>,
    stop: channel::Receiver<()>,
) -> std::io::Result<Vec<JoinHandle<u64>>> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let sessions: Arc<[SessionId]> = (0..settings.sessions)
        .map(|_| {
            let mut id = [0u8; 16];
            rng.fill_bytes(&mut id);
            SessionId::from(id)
        })
        .collect();
    let sequence = Arc::new(SequenceGenerator::new());
    let deadline = Instant::now() + settings.duration;

    [
        (Direction::Request, settings.request_interval),
        (Direction::Reply, settings.reply_interval),
    ]
    .into_iter()
    .map(|(direction, interval)| {
        let producer = Producer {
            engine: engine.clone(),
            direction,
            interval,
            deadline,
            sessions: sessions.clone(),
            payload_size: settings.payload_size,
            sequence: sequence.clone(),
            rng: ChaCha8Rng::seed_from_u64(rng.next_u64()),
        };
        let stop = stop.clone();
        thread::Builder::new()
            .name(format!("{direction}-producer"))
            .spawn(move || producer.run(stop))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use mix_strategy::settings::{BatchSettings, StrategySettings};
    use mix_strategy::{ChannelSink, MixSettings};

    use super::*;

    fn settings(duration: Duration) -> TrafficSettings {
        TrafficSettings {
            duration,
            request_interval: Duration::from_millis(1),
            reply_interval: Duration::from_millis(2),
            sessions: 4,
            payload_size: 16,
        }
    }

    fn engine() -> (Arc<MixEngine>, channel::Receiver<mix_strategy::Release>) {
        let (sink, releases) = ChannelSink::unbounded();
        let mix = MixSettings::new(StrategySettings::BasicBatch(BatchSettings { batch_size: 1 }))
            .with_seed(5);
        (
            Arc::new(MixEngine::new(mix, Arc::new(sink)).unwrap()),
            releases,
        )
    }

    #[test]
    fn producers_stop_at_deadline() {
        let (engine, releases) = engine();
        let (_stop_tx, stop_rx) = channel::bounded::<()>(0);
        let producers = spawn_producers(
            engine.clone(),
            &settings(Duration::from_millis(50)),
            Some(1),
            stop_rx,
        )
        .unwrap();
        let sent: u64 = producers.into_iter().map(|p| p.join().unwrap()).sum();
        assert!(sent > 0);

        let enqueued =
            engine.stats(Direction::Request).enqueued + engine.stats(Direction::Reply).enqueued;
        assert_eq!(enqueued, sent);

        let mut sessions = HashSet::new();
        let mut sequences = HashSet::new();
        for release in releases.try_iter() {
            for msg in release.messages {
                assert_eq!(msg.payload.len(), 16);
                assert_eq!(msg.direction, release.direction);
                sessions.insert(msg.owner);
                assert!(sequences.insert(msg.sequence));
            }
        }
        assert_eq!(sequences.len() as u64, sent);
        assert!(sessions.len() <= 4);
    }

    #[test]
    fn dropping_stop_ends_producers() {
        let (engine, _releases) = engine();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let producers =
            spawn_producers(engine, &settings(Duration::from_secs(3600)), None, stop_rx).unwrap();
        thread::sleep(Duration::from_millis(10));
        let start = Instant::now();
        drop(stop_tx);
        for producer in producers {
            producer.join().unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
