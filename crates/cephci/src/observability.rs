use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Registry;

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

/// Debug builds log everything by default
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";

#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "error";

/// Level the per-run log is written at, whatever the console shows.
const RUN_LOG_LEVEL: Level = Level::DEBUG;

type BoxedLayer = Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>;

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {}", unknown),
    }
}

/// `--log-level` wins over `--debug`.
fn detect_log_level(input: Option<String>, is_debug: bool) -> Result<Level> {
    let log_level: Cow<str> = match input {
        None if is_debug => "debug".into(),
        None => DEFAULT_LOG_LEVEL.into(),
        Some(level) => level.into(),
    };

    Ok(Level::from_str(log_level.as_ref())?)
}

/// `<dir>/cephci-<run>-<YYYYmmdd-HHMMSS>.log`
fn run_log_path(dir: &Path, run: &str, started: DateTime<Local>) -> PathBuf {
    dir.join(format!("cephci-{run}-{}.log", started.format("%Y%m%d-%H%M%S")))
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {path:?}"))
}

/// Formatting layer for `writer`. Only files get timestamps, and no colours.
fn fmt_layer<W>(format: LogFormat, writer: W, console: bool, level: Level) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = LevelFilter::from(level);
    match (format, console) {
        (LogFormat::Text, true) => tracing_subscriber::fmt::layer()
            .without_time()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, false) => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Json, _) => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_span_list(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

#[derive(Debug, Default)]
pub struct ObservabilityConfig {
    pub log_debug_flag: bool,
    pub log_level: Option<String>,
    /// Replaces the console output
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
    /// Directory receiving a debug level log of this run next to the
    /// console output
    pub log_dir: Option<PathBuf>,
    /// Names the per-run log, usually the subcommand
    pub run: String,
}

impl From<&crate::Opts> for ObservabilityConfig {
    fn from(opts: &crate::Opts) -> Self {
        let global = &opts.global;
        Self {
            log_debug_flag: global.debug,
            log_level: global.log_level.to_owned(),
            log_file: global.log.to_owned(),
            log_format: global.log_format.to_owned(),
            log_dir: global.log_dir.to_owned(),
            run: opts.subcmd.name().to_owned(),
        }
    }
}

/// Installs the global subscriber and returns the per-run log, if any.
pub fn init<T>(config: T) -> Result<Option<PathBuf>>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = detect_log_level(config.log_level, config.log_debug_flag)
        .with_context(|| "failed to parse log level")?;
    let log_format = detect_log_format(config.log_format.as_deref())
        .with_context(|| "failed to detect log format")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    match config.log_file.as_ref() {
        Some(path) => layers.push(fmt_layer(log_format, open_log(path)?, false, level)),
        None => layers.push(fmt_layer(log_format, std::io::stderr, true, level)),
    }

    let run_log = match config.log_dir.as_ref() {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("failed to create log directory {dir:?}"))?;
            let path = run_log_path(dir, &config.run, Local::now());
            layers.push(fmt_layer(log_format, open_log(&path)?, false, RUN_LOG_LEVEL.max(level)));
            Some(path)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;

    Ok(run_log)
}
