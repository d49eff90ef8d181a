//! File intake: selection filtering and per-file progress records.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// A user-chosen input file
///
/// Holds only a reference to the file on disk; bytes are read when the file's
/// turn comes in a conversion batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    size: u64,
    media_type: Option<String>,
    path: PathBuf,
}

impl SelectedFile {
    /// Describe a file with an explicit size and declared media type
    pub fn new(path: impl Into<PathBuf>, size: u64, media_type: Option<&str>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            name,
            size,
            media_type: media_type.map(str::to_string),
            path,
        }
    }

    /// Describe a file on disk, taking the size from its metadata and the
    /// media type from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).with_context(|| format!("reading {}", path.display()))?;
        if !meta.is_file() {
            return Err(anyhow!("{} is not a regular file", path.display()));
        }
        Ok(Self::new(path, meta.len(), media_type_for_path(path)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_video(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|t| t.starts_with("video/"))
    }

    pub(crate) fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Media type declared for a file extension, if known
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" | "qt" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "mpeg" | "mpg" => "video/mpeg",
        "3gp" => "video/3gpp",
        "ogv" => "video/ogg",
        "ts" => "video/mp2t",
        "gif" => "image/gif",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => return None,
    };
    Some(media_type)
}

/// Expand command-line paths into a selection.
///
/// Files are taken as given. Directories contribute their direct children in
/// name order.
pub fn collect_selection(paths: &[PathBuf]) -> Result<Vec<SelectedFile>> {
    let mut selection = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut children: Vec<PathBuf> = WalkDir::new(path)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            children.sort();
            for child in children {
                selection.push(SelectedFile::from_path(&child)?);
            }
        } else if path.exists() {
            selection.push(SelectedFile::from_path(path)?);
        } else {
            return Err(anyhow!("Input path does not exist: {}", path.display()));
        }
    }
    Ok(selection)
}

/// Conversion status of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Converting,
    Completed,
    Failed,
}

impl FileStatus {
    /// Whether `self -> next` is a legal transition
    pub fn can_become(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Converting)
                | (FileStatus::Converting, FileStatus::Completed)
                | (FileStatus::Converting, FileStatus::Failed)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Converting => "converting",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: FileStatus,
    pub to: FileStatus,
}

/// Progress record for one selected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProgress {
    pub file_name: String,
    /// Percentage, 0 to 100
    pub progress: u8,
    pub status: FileStatus,
}

impl FileProgress {
    pub fn pending(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            progress: 0,
            status: FileStatus::Pending,
        }
    }

    /// Raise the percentage; lower values are ignored. Returns whether the
    /// record changed.
    pub fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            true
        } else {
            false
        }
    }

    /// Apply a status change, rejecting anything outside
    /// `pending -> converting -> completed | failed`.
    pub fn transition(&mut self, next: FileStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_become(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == FileStatus::Completed {
            self.progress = 100;
        }
        Ok(())
    }
}

/// Outcome of filtering a selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intake {
    pub files: Vec<SelectedFile>,
    pub progress: Vec<FileProgress>,
}

/// Keep the video entries of a selection, in order, with a pending record each.
pub fn intake(selection: impl IntoIterator<Item = SelectedFile>) -> Intake {
    let mut out = Intake::default();
    for file in selection.into_iter().filter(SelectedFile::is_video) {
        out.progress.push(FileProgress::pending(file.name()));
        out.files.push(file);
    }
    out
}
