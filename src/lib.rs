//! # gifbatch - Video to GIF Batch Converter
//!
//! `gifbatch` converts video files into palette-optimized animated GIFs by
//! driving an external `ffmpeg` executable.
//!
//! ## Features
//!
//! - Two-pass conversion: palette generation, then palette-based encode with
//!   ordered (Bayer) dithering
//! - Sequential batch processing with per-file failure isolation
//! - Per-file progress and status reporting for UI integration
//! - Configurable quality presets
//! - In-memory result store with single and bulk saving
//!
//! ## Example
//!
//! ```no_run
//! use gifbatch::{collect_selection, FfmpegEngine, GifOptions, NoopObserver, Session};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = FfmpegEngine::new("ffmpeg");
//! let mut session = Session::new(engine, GifOptions::default());
//! session.load()?;
//!
//! let selection = collect_selection(&[PathBuf::from("clip.mp4")])?;
//! session.select_files(selection);
//!
//! let results = session.convert(&mut NoopObserver)?;
//! println!("{} GIF(s) ready", results.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! Conversion callbacks are delivered through [`ConversionObserver`]:
//!
//! ```no_run
//! use gifbatch::{ConversionObserver, FileStatus};
//!
//! struct Printer;
//!
//! impl ConversionObserver for Printer {
//!     fn on_status(&mut self, index: usize, status: FileStatus) {
//!         println!("file {}: {}", index, status);
//!     }
//!
//!     fn on_progress(&mut self, index: usize, percent: u8) {
//!         println!("file {}: {}%", index, percent);
//!     }
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub mod convert;
pub mod engine;
pub mod filters;
pub mod intake;
pub mod logbuf;
pub mod logging;
pub mod results;
pub mod session;
pub mod view;

pub use convert::{ConversionObserver, ConvertError, Converter, NoopObserver};
pub use engine::{Engine, EngineError, EngineListener, EngineState, FfmpegEngine};
pub use filters::{encode_args, palette_args, INPUT_FILE, OUTPUT_FILE, PALETTE_FILE};
pub use intake::{
    collect_selection, intake, media_type_for_path, FileProgress, FileStatus, Intake,
    InvalidTransition, SelectedFile,
};
pub use logbuf::LogBuffer;
pub use results::{
    download_file_name, unique_download_names, BlobStore, ConversionResult, DirectoryTarget,
    DownloadOutcome, DownloadTarget, OutputUrl, ResultStore, GIF_MIME,
};
pub use session::{BatchReport, ReportEntry, Session};

/// Quality settings for a GIF conversion
///
/// The defaults reproduce the classic two-pass recipe: 10 fps, 480 px wide,
/// a 256 color palette and Bayer dithering at scale 5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GifOptions {
    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Output width in pixels; height follows the aspect ratio
    #[serde(default = "default_width")]
    pub width: u32,
    /// Palette size passed to `palettegen`
    #[serde(default = "default_max_colors")]
    pub max_colors: u16,
    /// Bayer dither intensity passed to `paletteuse` (0-5)
    #[serde(default = "default_bayer_scale")]
    pub bayer_scale: u8,
}

fn default_fps() -> u32 {
    10
}
fn default_width() -> u32 {
    480
}
fn default_max_colors() -> u16 {
    256
}
fn default_bayer_scale() -> u8 {
    5
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            width: default_width(),
            max_colors: default_max_colors(),
            bayer_scale: default_bayer_scale(),
        }
    }
}

impl GifOptions {
    /// Create options with a specific frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Create options with a specific output width
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    /// Create options with a specific palette size
    pub fn with_max_colors(mut self, max_colors: u16) -> Self {
        self.max_colors = max_colors;
        self
    }

    /// Create options with a specific dither intensity
    pub fn with_bayer_scale(mut self, bayer_scale: u8) -> Self {
        self.bayer_scale = bayer_scale;
        self
    }

    /// Check that every value is inside the range ffmpeg accepts
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(anyhow!("fps must be greater than zero"));
        }
        if self.width == 0 {
            return Err(anyhow!("width must be greater than zero"));
        }
        if !(4..=256).contains(&self.max_colors) {
            return Err(anyhow!(
                "max_colors must be between 4 and 256, got {}",
                self.max_colors
            ));
        }
        if self.bayer_scale > 5 {
            return Err(anyhow!(
                "bayer_scale must be between 0 and 5, got {}",
                self.bayer_scale
            ));
        }
        Ok(())
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_download_delay_ms() -> u64 {
    100
}
fn default_log_retention() -> usize {
    1000
}
fn default_log_display() -> usize {
    10
}

/// Application configuration with presets and runtime tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub presets: HashMap<String, GifOptions>,
    pub default_preset: String,
    /// Engine executable name or path
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// Pause between consecutive saves when saving every result
    #[serde(default = "default_download_delay_ms")]
    pub download_delay_ms: u64,
    /// Maximum number of engine log lines kept in memory
    #[serde(default = "default_log_retention")]
    pub log_retention: usize,
    /// Number of most recent log lines shown
    #[serde(default = "default_log_display")]
    pub log_display: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut presets = HashMap::new();
        presets.insert("default".to_string(), GifOptions::default());
        presets.insert(
            "small".to_string(),
            GifOptions::default()
                .with_fps(8)
                .with_width(320)
                .with_max_colors(128),
        );
        presets.insert(
            "large".to_string(),
            GifOptions::default()
                .with_fps(15)
                .with_width(720)
                .with_bayer_scale(3),
        );
        Self {
            presets,
            default_preset: "default".to_string(),
            ffmpeg: default_ffmpeg(),
            download_delay_ms: default_download_delay_ms(),
            log_retention: default_log_retention(),
            log_display: default_log_display(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("parsing config toml {}", path.display()))?,
            _ => serde_json::from_str(&text)
                .with_context(|| format!("parsing config json {}", path.display()))?,
        };
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Validate every preset and the default preset reference
    pub fn validate(&self) -> Result<()> {
        if !self.presets.contains_key(&self.default_preset) {
            return Err(anyhow!(
                "default_preset '{}' does not name a preset",
                self.default_preset
            ));
        }
        for (name, preset) in &self.presets {
            preset
                .validate()
                .with_context(|| format!("preset '{}'", name))?;
        }
        if self.log_retention == 0 {
            return Err(anyhow!("log_retention must be greater than zero"));
        }
        Ok(())
    }

    /// Get a preset by name
    pub fn preset(&self, name: &str) -> Result<&GifOptions> {
        self.presets
            .get(name)
            .ok_or_else(|| anyhow!("Missing preset '{}' in config", name))
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}
