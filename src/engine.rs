//! Handle to the external transcoding engine.
//!
//! The engine is an `ffmpeg` executable driven with plain argument lists. Each
//! [`FfmpegEngine`] owns a private sandbox directory; inputs are written into it
//! by name, invocations run with it as working directory, and outputs are read
//! back by name. Nothing outside the sandbox is touched.

use log::{debug, info};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command as ProcCommand, Stdio};
use tempfile::TempDir;
use thiserror::Error;

const REQUIRED_FILTERS: &[&str] = &["palettegen", "paletteuse"];

/// Lifecycle of an engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loaded,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not loaded")]
    NotLoaded,
    #[error("engine failed to initialize: {0}")]
    Init(String),
    #[error("invalid sandbox file name '{0}'")]
    InvalidName(String),
    #[error("sandbox file '{0}' does not exist")]
    NotFound(String),
    #[error("engine exited with {}", describe_exit(.code))]
    Exit { code: Option<i32> },
    #[error("engine i/o error: {0}")]
    Io(#[from] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Receives the events an engine emits while executing.
pub trait EngineListener {
    /// One diagnostic line printed by the engine
    fn on_log(&mut self, message: &str);
    /// Completion ratio of the running invocation, in `[0, 1]`
    fn on_progress(&mut self, ratio: f64);
}

/// Operations every engine binding offers.
///
/// All operations except [`Engine::load`] fail with [`EngineError::NotLoaded`]
/// until `load` has succeeded.
pub trait Engine {
    /// Locate and initialize the engine. Loading a loaded engine is a no-op.
    fn load(&mut self) -> Result<(), EngineError>;

    fn state(&self) -> EngineState;

    fn is_loaded(&self) -> bool {
        self.state() == EngineState::Loaded
    }

    /// Store `bytes` in the sandbox under `name`, replacing any previous file
    fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    /// Run one invocation to completion, forwarding log and progress events
    fn execute(
        &mut self,
        args: &[String],
        listener: &mut dyn EngineListener,
    ) -> Result<(), EngineError>;

    fn read_output(&mut self, name: &str) -> Result<Vec<u8>, EngineError>;

    fn delete_file(&mut self, name: &str) -> Result<(), EngineError>;
}

/// Engine binding backed by an `ffmpeg` executable
pub struct FfmpegEngine {
    program: PathBuf,
    state: EngineState,
    sandbox: Option<TempDir>,
}

impl FfmpegEngine {
    /// Create an unloaded handle for the given executable name or path
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            state: EngineState::Uninitialized,
            sandbox: None,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Directory holding the sandboxed files, once loaded
    pub fn sandbox_dir(&self) -> Option<&Path> {
        self.sandbox.as_ref().map(TempDir::path)
    }

    fn sandbox_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        let dir = self.sandbox.as_ref().ok_or(EngineError::NotLoaded)?;
        validate_name(name)?;
        Ok(dir.path().join(name))
    }

    fn probe(&self, args: &[&str]) -> Result<String, EngineError> {
        let output = ProcCommand::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| {
                EngineError::Init(format!("could not run {}: {}", self.program.display(), e))
            })?;
        if !output.status.success() {
            return Err(EngineError::Init(format!(
                "{} {} exited with {}",
                self.program.display(),
                args.join(" "),
                describe_exit(&output.status.code())
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Engine for FfmpegEngine {
    fn load(&mut self) -> Result<(), EngineError> {
        if self.state == EngineState::Loaded {
            debug!("engine already loaded");
            return Ok(());
        }

        let version = self.probe(&["-hide_banner", "-version"])?;
        let version_line = version.lines().next().unwrap_or("unknown version").to_string();

        let filters = self.probe(&["-hide_banner", "-filters"])?;
        for required in REQUIRED_FILTERS {
            if !has_filter(&filters, required) {
                return Err(EngineError::Init(format!(
                    "{} lacks the '{}' filter",
                    self.program.display(),
                    required
                )));
            }
        }

        let sandbox = tempfile::Builder::new()
            .prefix("gifbatch-")
            .tempdir()
            .map_err(|e| EngineError::Init(format!("creating sandbox: {}", e)))?;
        info!(
            "engine ready: {} (sandbox {})",
            version_line,
            sandbox.path().display()
        );
        self.sandbox = Some(sandbox);
        self.state = EngineState::Loaded;
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.sandbox_path(name)?;
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn execute(
        &mut self,
        args: &[String],
        listener: &mut dyn EngineListener,
    ) -> Result<(), EngineError> {
        let dir = self
            .sandbox
            .as_ref()
            .ok_or(EngineError::NotLoaded)?
            .path()
            .to_path_buf();
        debug!("{} {}", self.program.display(), args.join(" "));

        let mut child = ProcCommand::new(&self.program)
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut progress = ProgressParser::default();
        let read = match child.stderr.take() {
            Some(stderr) => for_each_line(&mut BufReader::new(stderr), |line| {
                listener.on_log(line);
                if let Some(ratio) = progress.feed(line) {
                    listener.on_progress(ratio);
                }
            }),
            None => Ok(()),
        };

        let status = child.wait()?;
        read?;
        if !status.success() {
            return Err(EngineError::Exit {
                code: status.code(),
            });
        }
        Ok(())
    }

    fn read_output(&mut self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.sandbox_path(name)?;
        fs::read(&path).map_err(|e| missing_or_io(e, name))
    }

    fn delete_file(&mut self, name: &str) -> Result<(), EngineError> {
        let path = self.sandbox_path(name)?;
        fs::remove_file(&path).map_err(|e| missing_or_io(e, name))
    }
}

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(|c| c == '/' || c == '\\')
    {
        return Err(EngineError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn missing_or_io(err: io::Error, name: &str) -> EngineError {
    if err.kind() == io::ErrorKind::NotFound {
        EngineError::NotFound(name.to_string())
    } else {
        EngineError::Io(err)
    }
}

// `ffmpeg -filters` rows look like " T.C palettegen  V->V  Find the optimal palette".
fn has_filter(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

/// Split engine output into lines on `\n` and `\r`.
///
/// ffmpeg rewrites its status line in place with `\r`, so both count as line
/// ends. Blank lines are skipped.
pub(crate) fn for_each_line<R: BufRead>(reader: &mut R, mut f: impl FnMut(&str)) -> io::Result<()> {
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            break;
        }
        let len = available.len();
        for &byte in available {
            if byte == b'\n' || byte == b'\r' {
                emit_line(&mut pending, &mut f);
            } else {
                pending.push(byte);
            }
        }
        reader.consume(len);
    }
    emit_line(&mut pending, &mut f);
    Ok(())
}

fn emit_line(pending: &mut Vec<u8>, f: &mut impl FnMut(&str)) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending);
    let line = line.trim_end();
    if !line.is_empty() {
        f(line);
    }
    pending.clear();
}

/// Derives a completion ratio from ffmpeg's `Duration:` and `time=` fields.
#[derive(Debug, Default)]
pub(crate) struct ProgressParser {
    duration: Option<f64>,
}

impl ProgressParser {
    pub(crate) fn feed(&mut self, line: &str) -> Option<f64> {
        // The first input's duration is the reference; later inputs are ignored.
        if self.duration.is_none() {
            if let Some(total) = field_after(line, "Duration: ").and_then(parse_timestamp) {
                if total > 0.0 {
                    self.duration = Some(total);
                }
                return None;
            }
        }
        let total = self.duration?;
        let elapsed = field_after(line, "time=").and_then(parse_timestamp)?;
        Some((elapsed / total).clamp(0.0, 1.0))
    }
}

fn field_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let end = rest
        .find(|c: char| c == ',' || c.is_whitespace())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Parse `HH:MM:SS.cc`, `MM:SS` or plain seconds. `N/A` yields `None`.
pub(crate) fn parse_timestamp(s: &str) -> Option<f64> {
    s.split(':')
        .rev()
        .enumerate()
        .try_fold(0.0, |acc, (i, v)| {
            v.parse::<f64>().ok().map(|n| acc + n.abs() * 60f64.powi(i as i32))
        })
}
