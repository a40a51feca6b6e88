// std
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
// crates
use anyhow::Context;
use clap::Parser;
use crossbeam::channel;
use mix_strategy::{ChannelSink, Direction, MixEngine, StrategyType};
use serde::de::DeserializeOwned;
use strum::IntoEnumIterator;
// internal
use crate::settings::NodeSettings;

mod log;
mod output;
mod settings;
mod traffic;

/// Mix relay harness.
/// Feeds synthetic traffic through one mix engine and records every release.
#[derive(Parser)]
pub struct MixnodeApp {
    /// Json file path, on `NodeSettings` format
    #[clap(long, short, required_unless_present = "list_strategies")]
    input_settings: Option<PathBuf>,
    #[clap(long, default_value = "plain")]
    log_format: log::LogFormat,
    #[clap(long, default_value = "stdout")]
    log_to: log::LogOutput,
    /// Print every output strategy name and exit
    #[clap(long)]
    list_strategies: bool,
}

impl MixnodeApp {
    pub fn run(self) -> anyhow::Result<()> {
        let Self {
            input_settings,
            log_format: _,
            log_to: _,
            list_strategies,
        } = self;
        if list_strategies {
            for strategy_type in StrategyType::iter() {
                println!("{strategy_type}");
            }
            return Ok(());
        }
        let input_settings = input_settings.context("--input-settings is required")?;
        let settings = NodeSettings::from_json_value(load_json_from_file(&input_settings)?)
            .with_context(|| format!("invalid settings in {}", input_settings.display()))?;

        let epoch = Instant::now();
        let (sink, releases) = ChannelSink::unbounded();
        let writer = output::spawn_writer(&settings.output, releases, epoch)?;
        let engine = Arc::new(MixEngine::new(settings.mix.clone(), Arc::new(sink))?);

        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let producers = traffic::spawn_producers(
            engine.clone(),
            &settings.traffic,
            settings.mix.seed,
            stop_rx,
        )?;
        signal(&producers)?;
        // Disconnecting stops producers that are still running.
        drop(stop_tx);
        let mut sent = 0;
        for producer in producers {
            sent += producer
                .join()
                .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
        }

        engine.shutdown();
        for direction in [Direction::Request, Direction::Reply] {
            let stats = engine.stats(direction);
            tracing::info!(
                %direction,
                enqueued = stats.enqueued,
                released = stats.released,
                pooled = stats.pooled,
                "pool summary before drain"
            );
        }
        engine.drain();
        // The engine owns the last sink; dropping it ends the writer.
        drop(engine);

        let rows = writer
            .join()
            .map_err(|_| anyhow::anyhow!("release writer panicked"))??;
        tracing::info!(
            sent,
            rows,
            output = %settings.output.display(),
            "mix run finished"
        );
        Ok(())
    }
}

/// Waits for the producers to finish or for ctrl-c, whichever comes first.
fn signal<T>(producers: &[JoinHandle<T>]) -> anyhow::Result<()> {
    let (tx, rx) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    loop {
        crossbeam::select! {
            recv(rx) -> _ => {
                tracing::info!("gracefully shutdown the mix node");
                break;
            },
            default(Duration::from_millis(50)) => {
                if producers.iter().all(JoinHandle::is_finished) {
                    break;
                }
            },
        }
    }
    Ok(())
}

/// Generically load a json file
fn load_json_from_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(serde_json::from_reader(f)?)
}

fn main() -> anyhow::Result<()> {
    let app: MixnodeApp = MixnodeApp::parse();
    let maybe_guard = log::config_tracing(app.log_format, &app.log_to)?;

    if let Err(e) = app.run() {
        tracing::error!("error: {:#}", e);
        drop(maybe_guard);
        std::process::exit(1);
    }
    Ok(())
}
