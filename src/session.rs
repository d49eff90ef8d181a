//! Session state: the current selection, its progress records, the results of
//! the last batch and the engine log.
//!
//! All mutation goes through [`Session`]; observers only ever receive copies.

use log::warn;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::convert::{ConversionObserver, Converter};
use crate::engine::{Engine, EngineError};
use crate::intake::{intake, FileProgress, FileStatus, Intake, SelectedFile};
use crate::logbuf::LogBuffer;
use crate::results::{ConversionResult, DownloadOutcome, DownloadTarget, ResultStore};
use crate::GifOptions;

/// Applies orchestrator callbacks to the progress records before passing
/// them on.
struct Tracker<'a> {
    progress: &'a mut [FileProgress],
    logs: &'a mut LogBuffer,
    outer: &'a mut dyn ConversionObserver,
}

impl ConversionObserver for Tracker<'_> {
    fn on_status(&mut self, index: usize, status: FileStatus) {
        let Some(record) = self.progress.get_mut(index) else {
            warn!("status update for unknown file #{}", index);
            return;
        };
        let before = record.progress;
        if let Err(err) = record.transition(status) {
            warn!("{}: {}", record.file_name, err);
            return;
        }
        self.outer.on_status(index, status);
        if record.progress > before {
            self.outer.on_progress(index, record.progress);
        }
    }

    fn on_progress(&mut self, index: usize, percent: u8) {
        let Some(record) = self.progress.get_mut(index) else {
            return;
        };
        if record.status == FileStatus::Converting && record.advance(percent) {
            self.outer.on_progress(index, record.progress);
        }
    }

    fn on_log(&mut self, line: &str) {
        self.logs.push(line);
        self.outer.on_log(line);
    }
}

/// One conversion session bound to an engine
pub struct Session<E> {
    converter: Converter<E>,
    files: Vec<SelectedFile>,
    progress: Vec<FileProgress>,
    results: ResultStore,
    logs: LogBuffer,
}

impl<E: Engine> Session<E> {
    pub fn new(engine: E, options: GifOptions) -> Self {
        Self {
            converter: Converter::new(engine, options),
            files: Vec::new(),
            progress: Vec::new(),
            results: ResultStore::new(),
            logs: LogBuffer::default(),
        }
    }

    /// Keep at most `retention` engine log lines
    pub fn with_log_retention(mut self, retention: usize) -> Self {
        self.logs = LogBuffer::new(retention);
        self
    }

    pub fn load(&mut self) -> Result<(), EngineError> {
        self.converter.load()
    }

    pub fn is_loaded(&self) -> bool {
        self.converter.is_loaded()
    }

    pub fn options(&self) -> &GifOptions {
        self.converter.options()
    }

    pub fn set_options(&mut self, options: GifOptions) {
        self.converter.set_options(options);
    }

    pub fn engine(&self) -> &E {
        self.converter.engine()
    }

    /// Replace the selection. Non-video entries are dropped; the previous
    /// results are released and every record starts over as pending.
    pub fn select_files(&mut self, selection: impl IntoIterator<Item = SelectedFile>) -> &[FileProgress] {
        let Intake { files, progress } = intake(selection);
        self.results.clear();
        self.files = files;
        self.progress = progress;
        &self.progress
    }

    /// Convert the current selection.
    ///
    /// The results replace those of any earlier batch. An empty selection is a
    /// no-op.
    pub fn convert(
        &mut self,
        observer: &mut dyn ConversionObserver,
    ) -> Result<&[ConversionResult], EngineError> {
        if self.files.is_empty() {
            return Ok(self.results.results());
        }
        if !self.converter.is_loaded() {
            return Err(EngineError::NotLoaded);
        }

        if self.progress.iter().any(|p| p.status != FileStatus::Pending) {
            self.progress = self
                .files
                .iter()
                .map(|f| FileProgress::pending(f.name()))
                .collect();
        }
        self.logs.clear();

        let mut tracker = Tracker {
            progress: &mut self.progress,
            logs: &mut self.logs,
            outer: observer,
        };
        let results = self
            .converter
            .convert(&self.files, self.results.blobs_mut(), &mut tracker)?;
        self.results.replace(results);
        Ok(self.results.results())
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn progress(&self) -> &[FileProgress] {
        &self.progress
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn failed_count(&self) -> usize {
        self.progress
            .iter()
            .filter(|p| p.status == FileStatus::Failed)
            .count()
    }

    /// Save the result at `index` of the result list
    pub fn download_one(
        &self,
        index: usize,
        target: &mut dyn DownloadTarget,
    ) -> Option<DownloadOutcome> {
        self.results.download_at(index, target)
    }

    pub fn download_all(
        &self,
        target: &mut dyn DownloadTarget,
        delay: Duration,
    ) -> Vec<DownloadOutcome> {
        self.results.download_all(target, delay)
    }

    /// Machine-readable summary of the current selection
    pub fn report(&self) -> BatchReport {
        let mut results = self
            .results
            .results()
            .iter()
            .zip(self.results.download_names());
        let files = self
            .files
            .iter()
            .zip(&self.progress)
            .map(|(file, record)| {
                // Results are stored in selection order, one per completed file.
                let result = if record.status == FileStatus::Completed {
                    results.next()
                } else {
                    None
                };
                ReportEntry {
                    file_name: file.name().to_string(),
                    status: record.status,
                    progress: record.progress,
                    original_size: file.size(),
                    output_size: result.as_ref().and_then(|(r, _)| r.output_size),
                    download_name: result.map(|(_, name)| name),
                    saved_to: None,
                }
            })
            .collect();
        BatchReport {
            options: self.options().clone(),
            files,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub options: GifOptions,
    pub files: Vec<ReportEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub file_name: String,
    pub status: FileStatus,
    pub progress: u8,
    pub original_size: u64,
    pub output_size: Option<u64>,
    pub download_name: Option<String>,
    pub saved_to: Option<PathBuf>,
}

impl BatchReport {
    /// Attach where each completed file was saved; `outcomes` is in result order
    pub fn with_downloads(mut self, outcomes: &[DownloadOutcome]) -> Self {
        let mut outcomes = outcomes.iter();
        for entry in self
            .files
            .iter_mut()
            .filter(|e| e.status == FileStatus::Completed)
        {
            if let Some(DownloadOutcome::Saved(path)) = outcomes.next() {
                entry.saved_to = Some(path.clone());
            }
        }
        self
    }
}
