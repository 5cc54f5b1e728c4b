// Logging setup
//
// One daily-rolling file per prefix under the log directory, written off the
// calling thread through tracing_appender's non-blocking writer. Every line
// steamcmd prints is logged at debug level under the "steamcmd" target, so
// the file only carries tool output in debug mode.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Target used for raw steamcmd output lines.
pub const STEAMCMD_TARGET: &str = "steamcmd";

/// How the global subscriber is built.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions<'a> {
    pub dir: &'a Utf8Path,
    pub prefix: &'a str,
    /// Debug level, including steamcmd output
    pub debug: bool,
    /// Mirror records to stderr
    pub console: bool,
    /// One JSON object per line in the log file
    pub json: bool,
}

impl<'a> LogOptions<'a> {
    pub fn new(dir: &'a Utf8Path, prefix: &'a str) -> Self {
        Self {
            dir,
            prefix,
            debug: false,
            console: false,
            json: false,
        }
    }
}

fn ensure_log_dir(dir: &Utf8Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir))?;
    }
    Ok(())
}

fn default_directives(debug: bool) -> String {
    if debug {
        "debug".to_string()
    } else {
        format!("info,{}=warn", STEAMCMD_TARGET)
    }
}

/// `RUST_LOG` when set, otherwise the level chosen by `debug`.
fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(debug)))
}

/// Install the global subscriber.
///
/// # Returns
/// A guard that must be held for the duration of the program; dropping it
/// flushes and stops the file writer
pub fn init(options: &LogOptions<'_>) -> Result<WorkerGuard> {
    ensure_log_dir(options.dir)?;

    let file_appender = rolling::daily(options.dir, options.prefix);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let file_layer: Box<dyn Layer<Registry> + Send + Sync> = if options.json {
        base.json().boxed()
    } else {
        base.with_file(true).with_line_number(true).boxed()
    };

    // stderr keeps command output on stdout clean
    let console_layer = options.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(env_filter(options.debug))
        .with(console_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        options.dir,
        options.prefix,
        options.debug,
        options.console,
        options.json
    );

    Ok(guard)
}
