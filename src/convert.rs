//! Sequential batch conversion.
//!
//! Each file goes through two engine invocations: the palette stage samples the
//! video and reduces it to a palette image, the encode stage maps the sampled
//! frames onto that palette with ordered dithering. Files are converted one at
//! a time because a single engine cannot run two jobs at once. A failing file
//! is marked failed and the batch moves on.

use log::{debug, info, trace, warn};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::{Engine, EngineError, EngineListener};
use crate::filters::{encode_args, palette_args, INPUT_FILE, OUTPUT_FILE, PALETTE_FILE};
use crate::intake::{FileStatus, SelectedFile};
use crate::results::{BlobStore, ConversionResult, GIF_MIME};
use crate::GifOptions;

/// Receives per-file status and progress while a batch runs
pub trait ConversionObserver {
    fn on_status(&mut self, index: usize, status: FileStatus);
    /// Percentage for the file at `index`; never lower than a previous report
    /// for the same file in the same batch
    fn on_progress(&mut self, index: usize, percent: u8);
    fn on_log(&mut self, _line: &str) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {
    fn on_status(&mut self, _index: usize, _status: FileStatus) {}
    fn on_progress(&mut self, _index: usize, _percent: u8) {}
}

/// Engine invocation a file is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Palette,
    Encode,
}

impl Stage {
    // Percentage range covered by the stage. Only completion reaches 100.
    fn span(self) -> (u8, u8) {
        match self {
            Stage::Palette => (0, 50),
            Stage::Encode => (50, 99),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Palette => f.write_str("palette"),
            Stage::Encode => f.write_str("encode"),
        }
    }
}

/// Why a single file failed
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Forwards engine events for the whole batch, tagged with the current file.
struct BatchListener<'a> {
    observer: &'a mut dyn ConversionObserver,
    index: usize,
    stage: Stage,
    reported: u8,
}

impl BatchListener<'_> {
    fn start_file(&mut self, index: usize) {
        self.index = index;
        self.stage = Stage::Palette;
        self.reported = 0;
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.report(stage.span().0);
    }

    fn report(&mut self, percent: u8) {
        if percent > self.reported {
            self.reported = percent;
            self.observer.on_progress(self.index, percent);
        }
    }
}

impl EngineListener for BatchListener<'_> {
    fn on_log(&mut self, message: &str) {
        trace!("engine: {}", message);
        self.observer.on_log(message);
    }

    fn on_progress(&mut self, ratio: f64) {
        let (lo, hi) = self.stage.span();
        let percent = f64::from(lo) + ratio.clamp(0.0, 1.0) * f64::from(hi - lo);
        self.report(percent.round() as u8);
    }
}

/// Drives an engine through the two-stage conversion for a list of files
pub struct Converter<E> {
    engine: E,
    options: GifOptions,
}

impl<E: Engine> Converter<E> {
    pub fn new(engine: E, options: GifOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &GifOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: GifOptions) {
        self.options = options;
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn load(&mut self) -> Result<(), EngineError> {
        self.engine.load()
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_loaded()
    }

    /// Convert `files` in order, storing each output in `blobs`.
    ///
    /// Per-file failures are reported through `observer` as
    /// [`FileStatus::Failed`] and do not stop the batch; the returned list
    /// holds only the successful files, in input order. The only error is
    /// [`EngineError::NotLoaded`] for a non-empty batch on an unloaded engine.
    pub fn convert(
        &mut self,
        files: &[SelectedFile],
        blobs: &mut BlobStore,
        observer: &mut dyn ConversionObserver,
    ) -> Result<Vec<ConversionResult>, EngineError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        if !self.engine.is_loaded() {
            return Err(EngineError::NotLoaded);
        }
        info!("converting {} file(s)", files.len());

        let mut listener = BatchListener {
            observer,
            index: 0,
            stage: Stage::Palette,
            reported: 0,
        };
        let mut results = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            listener.start_file(index);
            listener.observer.on_status(index, FileStatus::Converting);

            match self.convert_one(file, &mut listener) {
                Ok(bytes) => {
                    let output_size = bytes.len() as u64;
                    let output_url = blobs.create(bytes, GIF_MIME);
                    info!(
                        "{} converted ({} -> {} bytes)",
                        file.name(),
                        file.size(),
                        output_size
                    );
                    results.push(ConversionResult {
                        file_name: file.name().to_string(),
                        output_url,
                        original_size: file.size(),
                        output_size: Some(output_size),
                    });
                    listener.observer.on_status(index, FileStatus::Completed);
                    listener.observer.on_progress(index, 100);
                }
                Err(err) => {
                    warn!("conversion failed for {}: {}", file.name(), err);
                    listener.observer.on_status(index, FileStatus::Failed);
                }
            }

            self.cleanup();
        }

        Ok(results)
    }

    fn convert_one(
        &mut self,
        file: &SelectedFile,
        listener: &mut BatchListener<'_>,
    ) -> Result<Vec<u8>, ConvertError> {
        let bytes = file.read_bytes().map_err(|source| ConvertError::Read {
            path: file.path().to_path_buf(),
            source,
        })?;
        self.engine.write_input(INPUT_FILE, &bytes)?;
        drop(bytes);

        listener.enter(Stage::Palette);
        self.engine
            .execute(&palette_args(&self.options), listener)
            .map_err(|source| ConvertError::Stage {
                stage: Stage::Palette,
                source,
            })?;

        listener.enter(Stage::Encode);
        self.engine
            .execute(&encode_args(&self.options), listener)
            .map_err(|source| ConvertError::Stage {
                stage: Stage::Encode,
                source,
            })?;

        Ok(self.engine.read_output(OUTPUT_FILE)?)
    }

    fn cleanup(&mut self) {
        for name in [INPUT_FILE, PALETTE_FILE, OUTPUT_FILE] {
            if let Err(err) = self.engine.delete_file(name) {
                debug!("cleanup of {} skipped: {}", name, err);
            }
        }
    }
}
