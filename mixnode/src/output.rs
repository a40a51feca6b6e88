use std::io::Write;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel;
use mix_strategy::{Direction, Release};
use serde::Serialize;

#[derive(Serialize)]
struct ReleaseRecord {
    direction: Direction,
    session: String,
    sequence: u64,
    released_at_ms: u64,
    batch_size: usize,
}

/// Writes one CSV row per released message until every sender of
/// `releases` is gone. Returns the number of rows written.
pub fn write_releases<W: Write>(
    writer: &mut csv::Writer<W>,
    releases: channel::Receiver<Release>,
    epoch: Instant,
) -> csv::Result<u64> {
    let mut rows = 0;
    for Release {
        direction,
        messages,
    } in releases.iter()
    {
        let released_at_ms = epoch.elapsed().as_millis() as u64;
        let batch_size = messages.len();
        for msg in messages {
            writer.serialize(ReleaseRecord {
                direction,
                session: msg.owner.to_string(),
                sequence: msg.sequence,
                released_at_ms,
                batch_size,
            })?;
            rows += 1;
        }
        writer.flush()?;
    }
    Ok(rows)
}

/// Opens `path` and drains `releases` into it from a dedicated thread.
pub fn spawn_writer(
    path: &Path,
    releases: channel::Receiver<Release>,
    epoch: Instant,
) -> anyhow::Result<JoinHandle<csv::Result<u64>>> {
    let mut writer = csv::Writer::from_path(path)?;
    let handle = thread::Builder::new()
        .name("release-writer".to_string())
        .spawn(move || write_releases(&mut writer, releases, epoch))?;
    Ok(handle)
}
