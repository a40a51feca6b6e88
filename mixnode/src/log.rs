use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" => Ok(LogFormat::Plain),
            _ => Err(anyhow::anyhow!("Unknown log format")),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum LogOutput {
    #[default]
    StdOut,
    StdErr,
    File(PathBuf),
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::StdOut),
            "stderr" => Ok(Self::StdErr),
            _ => Ok(Self::File(PathBuf::from(s))),
        }
    }
}

/// Installs the global subscriber. The returned guard flushes buffered
/// records when dropped and must live until the app exits.
///
/// Verbosity follows `RUST_LOG`, defaulting to `info`.
pub fn config_tracing(fmt: LogFormat, log_to: &LogOutput) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = match log_to {
        LogOutput::StdOut => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::StdErr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log path {} has no file name", path.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
        }
    };
    let ansi = !matches!(log_to, LogOutput::File(_));

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match fmt {
        LogFormat::Plain => tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(guard)
}
