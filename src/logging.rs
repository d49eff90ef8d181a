//! Logger initialization.
//!
//! Library code logs through the `log` facade; the binary picks where the
//! records go.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indicatif::MultiProgress;
use log::{LevelFilter, Log, Metadata, Record};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Destination for log output.
pub enum LogDestination {
    /// Write to the terminal (stderr for warnings and errors).
    Terminal,
    /// Write to the given file.
    File(PathBuf),
    /// Write to both the terminal and the given file.
    Both(PathBuf),
}

/// Initialize the global logger.
///
/// The terminal only receives warnings and errors unless `level` is more
/// verbose, so progress bars stay readable; a log file gets everything at
/// `level`. Calling this twice keeps the first logger.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();
    let term_level = terminal_level(level);

    let loggers: Vec<Box<dyn SharedLogger>> = match destination {
        LogDestination::Terminal => vec![terminal_logger(term_level, config)],
        LogDestination::File(path) => match create_file_logger(level, config, &path) {
            Some(file_logger) => vec![file_logger],
            None => return,
        },
        LogDestination::Both(path) => {
            let mut loggers: Vec<Box<dyn SharedLogger>> =
                vec![terminal_logger(term_level, config.clone())];
            if let Some(file_logger) = create_file_logger(level, config, &path) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    let _ = CombinedLogger::init(loggers);
}

// Progress bars currently drawing. Terminal records are printed around them.
static ACTIVE_BARS: Mutex<Option<MultiProgress>> = Mutex::new(None);

/// Route terminal log output around `bars` until [`detach_progress`].
pub fn attach_progress(bars: &MultiProgress) {
    if let Ok(mut slot) = ACTIVE_BARS.lock() {
        *slot = Some(bars.clone());
    }
}

pub fn detach_progress() {
    if let Ok(mut slot) = ACTIVE_BARS.lock() {
        *slot = None;
    }
}

pub fn progress_attached() -> bool {
    ACTIVE_BARS.lock().map(|slot| slot.is_some()).unwrap_or(false)
}

fn active_bars() -> Option<MultiProgress> {
    ACTIVE_BARS.lock().ok().and_then(|slot| slot.clone())
}

/// Terminal logger that hides attached progress bars while it prints
struct BarAwareLogger {
    inner: Box<TermLogger>,
}

impl Log for BarAwareLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        match active_bars() {
            Some(bars) => bars.suspend(|| self.inner.log(record)),
            None => self.inner.log(record),
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

impl SharedLogger for BarAwareLogger {
    fn level(&self) -> LevelFilter {
        self.inner.level()
    }

    fn config(&self) -> Option<&Config> {
        self.inner.config()
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

fn terminal_logger(level: LevelFilter, config: Config) -> Box<dyn SharedLogger> {
    Box::new(BarAwareLogger {
        inner: TermLogger::new(level, config, TerminalMode::Mixed, ColorChoice::Auto),
    })
}

// Verbose runs (debug and above) show everything on the terminal too.
fn terminal_level(level: LevelFilter) -> LevelFilter {
    if level >= LevelFilter::Debug {
        level
    } else {
        level.min(LevelFilter::Warn)
    }
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(
    level: LevelFilter,
    config: Config,
    path: &Path,
) -> Option<Box<WriteLogger<File>>> {
    match File::create(path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!(
                "Warning: Could not create log file at {}: {}",
                path.display(),
                err
            );
            None
        }
    }
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
