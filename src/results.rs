//! Completed conversions, their in-memory outputs, and saving them.

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command as ProcCommand;
use std::thread;
use std::time::Duration;

/// MIME type of every conversion output
pub const GIF_MIME: &str = "image/gif";

/// Opaque, revocable reference to a buffer in a [`BlobStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputUrl(u64);

impl fmt::Display for OutputUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:gifbatch/{}", self.0)
    }
}

#[derive(Debug)]
struct Blob {
    bytes: Vec<u8>,
    mime: String,
}

/// In-memory byte buffers addressed by [`OutputUrl`]
#[derive(Debug, Default)]
pub struct BlobStore {
    next_id: u64,
    blobs: HashMap<u64, Blob>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, bytes: Vec<u8>, mime: &str) -> OutputUrl {
        self.next_id += 1;
        let id = self.next_id;
        self.blobs.insert(
            id,
            Blob {
                bytes,
                mime: mime.to_string(),
            },
        );
        OutputUrl(id)
    }

    /// Bytes behind `url`, or `None` once revoked
    pub fn get(&self, url: OutputUrl) -> Option<&[u8]> {
        self.blobs.get(&url.0).map(|b| b.bytes.as_slice())
    }

    pub fn mime(&self, url: OutputUrl) -> Option<&str> {
        self.blobs.get(&url.0).map(|b| b.mime.as_str())
    }

    /// Release the buffer behind `url`. Returns false if it was already gone.
    pub fn revoke(&mut self, url: OutputUrl) -> bool {
        self.blobs.remove(&url.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// One successfully converted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub file_name: String,
    pub output_url: OutputUrl,
    pub original_size: u64,
    pub output_size: Option<u64>,
}

impl ConversionResult {
    /// Suggested file name for the saved GIF
    pub fn download_name(&self) -> String {
        download_file_name(&self.file_name)
    }
}

/// `clip.mp4` -> `clip.gif`. Everything from the first `.` on is dropped.
pub fn download_file_name(original: &str) -> String {
    let stem = original.split('.').next().unwrap_or_default();
    let stem = if stem.is_empty() { "output" } else { stem };
    format!("{}.gif", stem)
}

/// Download names for a batch, numbering repeats so no two collide:
/// `clip.mp4` and `clip.mov` become `clip.gif` and `clip (1).gif`.
pub fn unique_download_names<'a>(file_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    file_names
        .into_iter()
        .map(|file_name| {
            let base = download_file_name(file_name);
            let mut candidate = base.clone();
            let mut n = 1;
            while !taken.insert(candidate.clone()) {
                candidate = numbered_name(&base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

fn numbered_name(name: &str, n: usize) -> String {
    let stem = name.strip_suffix(".gif").unwrap_or(name);
    format!("{} ({}).gif", stem, n)
}

/// Where saved outputs go
pub trait DownloadTarget {
    /// Save `bytes` as `file_name`, returning where it landed
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf>;

    /// Show the output some other way when saving is not possible
    fn open_fallback(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    OpenedFallback,
    Failed,
}

/// Saves outputs into a directory; falls back to the system image viewer
pub struct DirectoryTarget {
    dir: PathBuf,
    viewer: Option<PathBuf>,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            viewer: None,
        }
    }

    /// Use a specific program for the fallback instead of the platform opener
    pub fn with_viewer(mut self, viewer: impl Into<PathBuf>) -> Self {
        self.viewer = Some(viewer.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadTarget for DirectoryTarget {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    fn open_fallback(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("gifbatch-")
            .suffix(&format!("-{}", file_name))
            .tempfile()?;
        file.write_all(bytes)?;
        // The viewer may outlive us, so the file is kept.
        let (_, path) = file.keep().map_err(|e| e.error)?;

        let mut cmd = match &self.viewer {
            Some(viewer) => ProcCommand::new(viewer),
            None => {
                let (program, leading) = platform_opener();
                let mut cmd = ProcCommand::new(program);
                cmd.args(leading);
                cmd
            }
        };
        let status = cmd.arg(&path).status()?;
        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("viewer exited with {}", status),
            ));
        }
        info!("opened {} in viewer", path.display());
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn platform_opener() -> (&'static str, &'static [&'static str]) {
    ("open", &[])
}

#[cfg(windows)]
fn platform_opener() -> (&'static str, &'static [&'static str]) {
    ("cmd", &["/C", "start", ""])
}

#[cfg(not(any(target_os = "macos", windows)))]
fn platform_opener() -> (&'static str, &'static [&'static str]) {
    ("xdg-open", &[])
}

/// Results of the most recent batch together with their output buffers
///
/// Replacing or clearing the results revokes the superseded buffers, and
/// dropping the store releases everything.
#[derive(Debug, Default)]
pub struct ResultStore {
    blobs: BlobStore,
    results: Vec<ConversionResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[ConversionResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn blobs_mut(&mut self) -> &mut BlobStore {
        &mut self.blobs
    }

    pub fn bytes(&self, result: &ConversionResult) -> Option<&[u8]> {
        self.blobs.get(result.output_url)
    }

    /// Install a new batch of results, releasing the previous one
    pub fn replace(&mut self, results: Vec<ConversionResult>) {
        self.revoke_all();
        self.results = results;
    }

    pub fn clear(&mut self) {
        self.revoke_all();
    }

    fn revoke_all(&mut self) {
        for result in self.results.drain(..) {
            if self.blobs.revoke(result.output_url) {
                debug!("released {} ({})", result.output_url, result.file_name);
            }
        }
    }

    /// Names the results are saved under, distinct within the batch
    pub fn download_names(&self) -> Vec<String> {
        unique_download_names(self.results.iter().map(|r| r.file_name.as_str()))
    }

    /// Save one result under its plain download name. Never fails: a failed
    /// save falls back to [`DownloadTarget::open_fallback`].
    pub fn download_one(
        &self,
        result: &ConversionResult,
        target: &mut dyn DownloadTarget,
    ) -> DownloadOutcome {
        self.save_as(result, &result.download_name(), target)
    }

    /// Save the result at `index` under the same name [`Self::download_all`]
    /// would use
    pub fn download_at(
        &self,
        index: usize,
        target: &mut dyn DownloadTarget,
    ) -> Option<DownloadOutcome> {
        let result = self.results.get(index)?;
        let name = self.download_names().into_iter().nth(index)?;
        Some(self.save_as(result, &name, target))
    }

    /// Save every result in order, pausing `delay` between consecutive saves.
    /// Results sharing a download name are numbered instead of overwriting
    /// each other.
    pub fn download_all(
        &self,
        target: &mut dyn DownloadTarget,
        delay: Duration,
    ) -> Vec<DownloadOutcome> {
        let mut outcomes = Vec::with_capacity(self.results.len());
        for (i, (result, name)) in self.results.iter().zip(self.download_names()).enumerate() {
            if i > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }
            outcomes.push(self.save_as(result, &name, target));
        }
        outcomes
    }

    fn save_as(
        &self,
        result: &ConversionResult,
        name: &str,
        target: &mut dyn DownloadTarget,
    ) -> DownloadOutcome {
        let Some(bytes) = self.blobs.get(result.output_url) else {
            warn!("{} for {} was already released", result.output_url, result.file_name);
            return DownloadOutcome::Failed;
        };
        match target.save(name, bytes) {
            Ok(path) => {
                info!("saved {}", path.display());
                DownloadOutcome::Saved(path)
            }
            Err(err) => {
                warn!("saving {} failed: {}; opening it instead", name, err);
                match target.open_fallback(name, bytes) {
                    Ok(()) => DownloadOutcome::OpenedFallback,
                    Err(err) => {
                        warn!("could not open {}: {}", name, err);
                        DownloadOutcome::Failed
                    }
                }
            }
        }
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        self.revoke_all();
    }
}
