#![allow(dead_code)]

use gifbatch::{
    ConversionObserver, Engine, EngineError, EngineListener, EngineState, FileStatus, SelectedFile,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Contents that make the fake engine reject the input.
pub const CORRUPT: &[u8] = b"corrupt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Load,
    Write(String),
    Execute(Vec<String>),
    Read(String),
    Delete(String),
}

/// In-memory engine that mimics the palette/encode contract of ffmpeg.
pub struct FakeEngine {
    state: EngineState,
    files: HashMap<String, Vec<u8>>,
    fail_load: bool,
    pub calls: Vec<Call>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            files: HashMap::new(),
            fail_load: false,
            calls: Vec::new(),
        }
    }

    pub fn loaded() -> Self {
        let mut engine = Self::new();
        engine.load().unwrap();
        engine.calls.clear();
        engine
    }

    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    pub fn sandbox_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn executions(&self) -> Vec<Vec<String>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Execute(args) => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    fn ensure_loaded(&self) -> Result<(), EngineError> {
        if self.state == EngineState::Loaded {
            Ok(())
        } else {
            Err(EngineError::NotLoaded)
        }
    }
}

impl Engine for FakeEngine {
    fn load(&mut self) -> Result<(), EngineError> {
        self.calls.push(Call::Load);
        if self.fail_load {
            return Err(EngineError::Init("engine assets unavailable".to_string()));
        }
        self.state = EngineState::Loaded;
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.calls.push(Call::Write(name.to_string()));
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn execute(
        &mut self,
        args: &[String],
        listener: &mut dyn EngineListener,
    ) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.calls.push(Call::Execute(args.to_vec()));

        let input = self
            .files
            .get("input.mp4")
            .ok_or_else(|| EngineError::NotFound("input.mp4".to_string()))?;
        if input.as_slice() == CORRUPT {
            listener.on_log("input.mp4: Invalid data found when processing input");
            return Err(EngineError::Exit { code: Some(1) });
        }

        listener.on_log("  Duration: 00:00:02.00, start: 0.000000, bitrate: 800 kb/s");
        for ratio in [0.25, 0.5, 0.2, 1.0] {
            listener.on_progress(ratio);
        }

        let output = args.last().cloned().unwrap_or_default();
        match output.as_str() {
            "palette.png" => {
                self.files.insert(output, b"PNG-palette".to_vec());
            }
            "output.gif" => {
                if !self.files.contains_key("palette.png") {
                    return Err(EngineError::NotFound("palette.png".to_string()));
                }
                self.files.insert(output, b"GIF89a-fake-output".to_vec());
            }
            _ => return Err(EngineError::Exit { code: Some(2) }),
        }
        Ok(())
    }

    fn read_output(&mut self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.ensure_loaded()?;
        self.calls.push(Call::Read(name.to_string()));
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn delete_file(&mut self, name: &str) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.calls.push(Call::Delete(name.to_string()));
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Status(usize, FileStatus),
    Progress(usize, u8),
    Log(String),
}

#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn statuses(&self, index: usize) -> Vec<FileStatus> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Status(i, s) if *i == index => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self, index: usize) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(i, p) if *i == index => Some(*p),
                _ => None,
            })
            .collect()
    }
}

impl ConversionObserver for Recorder {
    fn on_status(&mut self, index: usize, status: FileStatus) {
        self.events.push(Event::Status(index, status));
    }

    fn on_progress(&mut self, index: usize, percent: u8) {
        self.events.push(Event::Progress(index, percent));
    }

    fn on_log(&mut self, line: &str) {
        self.events.push(Event::Log(line.to_string()));
    }
}

/// Write `contents` to `dir/name` and select it.
pub fn video_file(dir: &Path, name: &str, contents: &[u8]) -> SelectedFile {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    SelectedFile::from_path(&path).unwrap()
}
